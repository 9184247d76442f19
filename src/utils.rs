use std::time::Instant;

use crate::ext::DisplayExt;

/// Logs how long a scope took when dropped.
pub struct DropTimer {
    instant: Instant,
    scope_name: &'static str,
}

impl DropTimer {
    pub fn start(scope_name: &'static str) -> Self {
        Self {
            instant: Instant::now(),
            scope_name,
        }
    }
}

impl Drop for DropTimer {
    fn drop(&mut self) {
        tracing::info!(scope = %self.scope_name, elapsed = %self.instant.elapsed().to_string_ext(), "scope finished");
    }
}
