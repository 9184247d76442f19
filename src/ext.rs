//! Standard library extensions.

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use serde::Serialize;
use tokio::select;
use tokio::signal::unix::SignalKind;
use tokio::signal::unix::signal;
use tokio::task::JoinHandle;

use crate::GlobalState;
use crate::alias::JsonValue;
use crate::infra::tracing::info_task_spawn;

// -----------------------------------------------------------------------------
// Macros
// -----------------------------------------------------------------------------

/// Generates [`From`] implementation for a [newtype](https://doc.rust-lang.org/rust-by-example/generics/new_types.html) that delegates to the inner type [`From`].
#[macro_export]
macro_rules! gen_newtype_from {
    (self = $type:ty, other = $($source:ty),+) => {
        $(
            impl From<$source> for $type {
                fn from(value: $source) -> Self {
                    Self(value.into())
                }
            }
        )+
    };
}

// -----------------------------------------------------------------------------
// Display
// -----------------------------------------------------------------------------

/// Alternative to `Display` for types that do not implement it or whose implementation is not human friendly.
pub trait DisplayExt {
    fn to_string_ext(&self) -> String;
}

impl DisplayExt for Duration {
    fn to_string_ext(&self) -> String {
        humantime::Duration::from(*self).to_string()
    }
}

// -----------------------------------------------------------------------------
// Duration
// -----------------------------------------------------------------------------

/// Parses a duration specified in human format (`800ms`, `10s`, `5m`).
///
/// Plain integers are interpreted as milliseconds so `*_MS` variables keep working.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if let Ok(millis) = s.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }
    match humantime::parse_duration(s) {
        Ok(duration) => Ok(duration),
        Err(e) => Err(anyhow!("invalid duration \"{}\": {}", s, e)),
    }
}

// -----------------------------------------------------------------------------
// Serialization
// -----------------------------------------------------------------------------

/// Serializes any value to a JSON value, falling back to `null` if the serialization fails.
pub fn to_json_value<V: Serialize>(value: V) -> JsonValue {
    match serde_json::to_value(value) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(reason = ?e, "failed to serialize value to json");
            JsonValue::Null
        }
    }
}

/// Serializes any value to a JSON string, falling back to an empty object if the serialization fails.
pub fn to_json_string<V: Serialize>(value: &V) -> String {
    match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(reason = ?e, "failed to serialize value to json string");
            "{}".to_owned()
        }
    }
}

// -----------------------------------------------------------------------------
// Tokio
// -----------------------------------------------------------------------------

/// Reason why a task is sleeping.
#[derive(Clone, Copy, strum::Display)]
pub enum SleepReason {
    /// Poller is waiting for the next tick.
    #[strum(to_string = "poll-interval")]
    PollInterval,

    /// Task is waiting before retrying a failed operation.
    #[strum(to_string = "retry-backoff")]
    RetryBackoff,

    /// Checkpoint flush scheduler is waiting for the next flush.
    #[strum(to_string = "flush-interval")]
    FlushInterval,

    /// Listener is waiting before trying to attach again.
    #[strum(to_string = "listener-supervision")]
    ListenerSupervision,
}

/// Sleeps the current task and tracks why it is sleeping.
pub async fn traced_sleep(duration: Duration, reason: SleepReason) {
    tracing::debug!(duration = %duration.to_string_ext(), %reason, "sleeping");
    tokio::time::sleep(duration).await;
}

/// Spawns an async task in background and logs its name.
pub fn spawn_named<T>(name: &str, task: impl Future<Output = T> + Send + 'static) -> JoinHandle<T>
where
    T: Send + 'static,
{
    info_task_spawn(name);
    tokio::spawn(task)
}

/// Spawns a handler that listens to system signals and triggers application shutdown.
pub async fn spawn_signal_handler() -> anyhow::Result<()> {
    const TASK_NAME: &str = "signal-handler";

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::error!(reason = ?e, "failed to init SIGTERM watcher");
            return Err(anyhow!("failed to init SIGTERM watcher"));
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::error!(reason = ?e, "failed to init SIGINT watcher");
            return Err(anyhow!("failed to init SIGINT watcher"));
        }
    };

    spawn_named(TASK_NAME, async move {
        select! {
            _ = sigterm.recv() => {
                GlobalState::shutdown_from(TASK_NAME, "received SIGTERM");
            }
            _ = sigint.recv() => {
                GlobalState::shutdown_from(TASK_NAME, "received SIGINT");
            }
        }
    });

    Ok(())
}

// -----------------------------------------------------------------------------
// Standalone functions
// -----------------------------------------------------------------------------

/// `not(something)` instead of `!something`.
#[inline(always)]
pub fn not(value: bool) -> bool {
    !value
}
