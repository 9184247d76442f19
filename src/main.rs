use hybrid_relayer::GlobalServices;
use hybrid_relayer::GlobalState;
use hybrid_relayer::config::RelayerConfig;
use hybrid_relayer::eth::relay::Relayer;
use hybrid_relayer::utils::DropTimer;

const TASK_NAME: &str = "hybrid-relayer";

fn main() -> anyhow::Result<()> {
    let global_services = GlobalServices::<RelayerConfig>::init();
    let result = global_services.runtime.block_on(run(global_services.config));
    tracing::info!(state = %GlobalState::get_global_state_as_json(), "relayer stopped");
    result
}

async fn run(config: RelayerConfig) -> anyhow::Result<()> {
    let _timer = DropTimer::start(TASK_NAME);
    tracing::info!(%TASK_NAME, "starting");

    let relayer = match Relayer::new(config.relay).await {
        Ok(relayer) => relayer,
        Err(e) => {
            let message = GlobalState::shutdown_from(TASK_NAME, "failed to create relayer");
            tracing::error!(reason = ?e, %message, "relayer initialization failed");
            return Err(e);
        }
    };

    relayer.run(GlobalState::shutdown_child_token()).await
}
