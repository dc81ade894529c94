use clap::Parser;
use crabby_forward::{
    access_log::AccessLog, proxy::listener::run_proxy_server, AppState, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crabby_forward=info,access=info".into()),
        )
        .init();

    let config = Config::parse();

    let (access_log, _writer) = AccessLog::spawn(config.log_path.clone());
    let state = AppState::new(
        config.credentials(),
        access_log,
        config.connect_timeout(),
        config.idle_timeout(),
    );

    let addr = config.listen_addr();
    tracing::info!(
        "Starting Proxy Server at: {} (access log: {})",
        addr,
        config.log_path.display()
    );

    run_proxy_server(state, addr).await
}
