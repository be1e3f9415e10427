use anyhow::Context;
use oauth_whoami::{AppConfig, init_tracing, run_api_server, shutdown_signal};
use std::{env, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = env::var("ENV_FILE").unwrap_or_else(|_| ".env".to_string());
    dotenvy::from_filename(&env_file)
        .with_context(|| format!("Error loading env file {env_file}"))?;

    init_tracing();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let shutdown = CancellationToken::new();

    let server = run_api_server(config, shutdown.clone()).context("failed to start API server")?;

    shutdown_signal(shutdown.clone()).await;
    info!("received shutdown signal, stopping services");
    shutdown.cancel();

    // give in-flight requests the opportunity to finish
    let _ = tokio::time::timeout(Duration::from_secs(2), server).await;

    Ok(())
}
