use clap::Parser;
use relay_proxy::config::{Config, ProxyArgs};
use relay_proxy::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ProxyArgs::parse();
    let config = Config::load(args)?;

    server::run(config).await?;
    Ok(())
}
