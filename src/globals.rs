use std::fmt::Debug;
use std::sync::LazyLock;

use chrono::DateTime;
use chrono::Utc;
use sentry::ClientInitGuard;
use serde_json::json;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::alias::JsonValue;
use crate::config;
use crate::config::WithCommonConfig;
use crate::ext::spawn_signal_handler;
use crate::infra::build_info;
use crate::infra::tracing::warn_task_cancellation;

// -----------------------------------------------------------------------------
// Global services
// -----------------------------------------------------------------------------

pub struct GlobalServices<T>
where
    T: clap::Parser + WithCommonConfig + Debug,
{
    pub config: T,
    pub runtime: Runtime,
    _sentry_guard: Option<ClientInitGuard>,
}

impl<T> GlobalServices<T>
where
    T: clap::Parser + WithCommonConfig + Debug,
{
    #[allow(clippy::expect_used)]
    /// Executes global services initialization.
    pub fn init() -> Self
    where
        T: clap::Parser + WithCommonConfig + Debug,
    {
        GlobalState::setup_start_time();

        // env-var support
        config::load_dotenv_file();
        config::load_env_aliases();

        // parse configuration
        let config = T::parse();
        let common = config.common();

        // init tokio
        let tokio = common.init_tokio_runtime().expect("failed to init tokio runtime");

        // init tracing
        tokio.block_on(async {
            common.tracing.init(&common.sentry).expect("failed to init tracing");
        });
        tracing::info!(build = %build_info::as_json(), "starting application");
        tracing::info!(?config, "parsed configuration");

        // init observability services
        common.metrics.init().expect("failed to init metrics");

        // init sentry
        let sentry_guard = common
            .sentry
            .as_ref()
            .map(|sentry_config| sentry_config.init(common.env).expect("failed to init sentry"));

        // init signal handler
        tokio.block_on(spawn_signal_handler()).expect("failed to init signal handlers");

        Self {
            config,
            runtime: tokio,
            _sentry_guard: sentry_guard,
        }
    }
}

// -----------------------------------------------------------------------------
// Global state
// -----------------------------------------------------------------------------

pub static RELAYER_SHUTDOWN_SIGNAL: LazyLock<CancellationToken> = LazyLock::new(CancellationToken::new);

static START_TIME: LazyLock<DateTime<Utc>> = LazyLock::new(Utc::now);

pub struct GlobalState;

impl GlobalState {
    // -------------------------------------------------------------------------
    // Application Shutdown
    // -------------------------------------------------------------------------

    /// Shutdown the application.
    ///
    /// Returns the formatted reason for shutdown.
    pub fn shutdown_from(caller: &str, reason: &str) -> String {
        tracing::warn!(%caller, %reason, "application is shutting down");
        RELAYER_SHUTDOWN_SIGNAL.cancel();
        format!("{caller} {reason}")
    }

    /// Checks if the application is being shutdown.
    pub fn is_shutdown() -> bool {
        RELAYER_SHUTDOWN_SIGNAL.is_cancelled()
    }

    /// Checks if the application is being shutdown. Emits an warning with the task name in case it is.
    pub fn is_shutdown_warn(task_name: &str) -> bool {
        let shutdown = Self::is_shutdown();
        if shutdown {
            warn_task_cancellation(task_name);
        }
        shutdown
    }

    /// Waits until a shutdown is signalled.
    pub async fn wait_shutdown() {
        RELAYER_SHUTDOWN_SIGNAL.cancelled().await;
    }

    /// Waits until a shutdown is signalled. Emits an warning with the task name when it is.
    pub async fn wait_shutdown_warn(task_name: &str) {
        Self::wait_shutdown().await;
        warn_task_cancellation(task_name);
    }

    /// Creates a cancellation token that is cancelled when the application shuts down.
    ///
    /// Tasks can also be cancelled individually through the returned token.
    pub fn shutdown_child_token() -> CancellationToken {
        RELAYER_SHUTDOWN_SIGNAL.child_token()
    }

    // -------------------------------------------------------------------------
    // JSON State
    // -------------------------------------------------------------------------

    pub fn get_global_state_as_json() -> JsonValue {
        let start_time = *START_TIME;
        let elapsed_time = {
            let delta = start_time.signed_duration_since(Utc::now()).abs();
            let seconds = delta.num_seconds() % 60;
            let minutes = delta.num_minutes() % 60;
            let hours = delta.num_hours() % 24;
            let days = delta.num_days();
            format!("{days} days and {hours:02}:{minutes:02}:{seconds:02} elapsed")
        };

        json!({
            "is_shutdown": Self::is_shutdown(),
            "start_time": start_time.format("%d/%m/%Y %H:%M UTC").to_string(),
            "elapsed_time": elapsed_time,
        })
    }

    pub fn setup_start_time() {
        LazyLock::force(&START_TIME);
    }
}
