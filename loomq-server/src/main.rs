//! Loomq server binary
//!
//! A standalone coordination server exposing device status and queue state
//! over HTTP and WebSocket.

use loomq_server::{LoomqServer, ServerConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialize logging
  tracing_subscriber::registry()
    .with(fmt::layer())
    .with(
      EnvFilter::from_default_env()
        .add_directive("loomq_server=info".parse()?)
        .add_directive("loomq=info".parse()?),
    )
    .init();

  let config = ServerConfig::from_env()?;
  info!("Starting loomq-server on {}", config.addr);

  let server = build_server(&config).await?;
  server.run().await?;

  Ok(())
}

#[cfg(feature = "postgres")]
async fn build_server(config: &ServerConfig) -> anyhow::Result<LoomqServer> {
  let server = match &config.database_url {
    Some(url) => {
      info!("Using PostgresSQL store");
      LoomqServer::with_postgres(config.addr, url, config.engine.clone()).await?
    }
    None => {
      info!("Using in-memory store, state is lost on restart");
      LoomqServer::with_memory(config.addr, config.engine.clone())?
    }
  };
  Ok(server)
}

#[cfg(not(feature = "postgres"))]
async fn build_server(config: &ServerConfig) -> anyhow::Result<LoomqServer> {
  if config.database_url.is_some() {
    info!("DATABASE_URL is set but the postgres feature is disabled, using in-memory store");
  }
  Ok(LoomqServer::with_memory(config.addr, config.engine.clone())?)
}
