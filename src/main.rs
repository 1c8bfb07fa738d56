use std::sync::Arc;

use anyhow::Context;
use services::CancelToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env when present (API keys for
    // remote providers are resolved from the environment).
    let _ = dotenvy::dotenv();

    services::telemetry::init("info");

    // Config lives next to the registry under ~/.llmc unless overridden.
    let config_path = std::env::var("LLMC_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| services::global_dir().join("config.toml"));
    let cfg = llmc_config::load_or_default(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let registry = refresh_daemon::Registry::default_location();
    let failures =
        refresh_daemon::FailureStore::open(&services::global_dir().join("rag-failures.db"))
            .context("opening failure store")?;

    let daemon = Arc::new(refresh_daemon::RefreshDaemon::new(cfg, registry, failures));

    let cancel = CancelToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_cancel.cancel();
        }
    });

    daemon.run(cancel).await;
    std::process::exit(services::exit::SUCCESS);
}
