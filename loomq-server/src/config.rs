//! Server configuration
//!
//! The binary is configured through the environment so deployment tooling
//! does not need a config file: `LOOMQ_ADDR` picks the listen address and
//! `DATABASE_URL` switches on the PostgresSQL store when the `postgres`
//! feature is compiled in.

use crate::error::{Error, Result};
use loomq::EngineConfig;
use std::net::SocketAddr;

/// Environment variable naming the listen address
pub const ADDR_ENV: &str = "LOOMQ_ADDR";

/// Environment variable naming the PostgresSQL connection string
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Configuration for the loomq server binary
#[derive(Debug, Clone)]
pub struct ServerConfig {
  /// Listen address
  pub addr: SocketAddr,
  /// Engine tuning handed to the coordinator
  pub engine: EngineConfig,
  /// PostgresSQL connection string; the in-memory store is used when absent
  pub database_url: Option<String>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    ServerConfig {
      addr: SocketAddr::from(([127, 0, 0, 1], 8420)),
      engine: EngineConfig::default(),
      database_url: None,
    }
  }
}

impl ServerConfig {
  /// Create a configuration with default values
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the listen address
  pub fn addr(mut self, addr: SocketAddr) -> Self {
    self.addr = addr;
    self
  }

  /// Set the engine configuration
  pub fn engine(mut self, engine: EngineConfig) -> Self {
    self.engine = engine;
    self
  }

  /// Set the PostgresSQL connection string
  pub fn database_url<S: Into<String>>(mut self, url: S) -> Self {
    self.database_url = Some(url.into());
    self
  }

  /// Read the configuration from the environment
  pub fn from_env() -> Result<Self> {
    let mut config = Self::default();
    if let Ok(addr) = std::env::var(ADDR_ENV) {
      config.addr = addr
        .parse()
        .map_err(|e| Error::config(format!("Invalid {ADDR_ENV} '{addr}': {e}")))?;
    }
    if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
      config.database_url = Some(url);
    }
    Ok(config)
  }
}
