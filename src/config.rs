//! Environment-driven configuration.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    pub max_connections: u32,
}

impl Config {
    /// Reads configuration from the environment, loading `.env` first.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().context("PORT must be a number")?,
            Err(_) => 8084,
        };
        let max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw.parse().context("DATABASE_MAX_CONNECTIONS must be a number")?,
            Err(_) => 10,
        };
        Ok(Self {
            database_url,
            port,
            nats_url: std::env::var("NATS_URL").ok(),
            max_connections,
        })
    }
}
