use clap::Parser;
use mock_server::ServerConfig;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();
    let listener = TcpListener::bind(&config.address).await?;
    tracing::info!(address = %config.address, apis = config.apis.len(), "listening");
    mock_server::run_with_config(listener, config).await
}
