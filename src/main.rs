use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use forte_gateway::config::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "forte", "RUST_LOG='{}'", rust_log);

    let config = GatewayConfig::from_env();
    forte_gateway::server::run(config).await
}
