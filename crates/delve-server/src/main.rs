use anyhow::Context;
use delve_server::{init_tracing, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env locally; safe to ignore when not present.
    let _ = dotenvy::dotenv();
    init_tracing("info");

    let config = ServerConfig::from_env().context("invalid configuration")?;
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .inspect_err(|e| tracing::error!(address = %config.bind, error = %e, "failed to bind"))
        .with_context(|| format!("binding {}", config.bind))?;

    delve_server::run(listener, config).await.context("server stopped")
}
