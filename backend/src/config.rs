use anyhow::{Context, Result};
use std::env;

/// Runtime configuration, read once at startup. The device API key has
/// no built-in default: a deployment that forgets to set it must fail
/// loudly instead of serving a publicly known secret.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub device_api_key: String,
    pub bind_addr: String,
    pub cors_origin: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            device_api_key: env::var("LIWANAG_API_KEY")
                .context("LIWANAG_API_KEY must be set; refusing to start with no device key")?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8081".to_owned()),
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".to_owned()),
        })
    }
}
