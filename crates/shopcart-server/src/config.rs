use std::env;
use std::time::Duration;

use anyhow::Context;

const DEV_TOKEN_SECRET: &str = "change-me-to-a-random-32-char-string";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub sqlite_path: String,
    pub token_secret: String,
    pub cors_origin: String,
    pub db_pool_size: u32,
    pub store_timeout: Duration,
    pub rate_limit: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let token_secret = match env::var("TOKEN_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("TOKEN_SECRET not set, falling back to the development secret");
                DEV_TOKEN_SECRET.to_string()
            }
        };

        Ok(Self {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            sqlite_path: env::var("SQLITE_PATH")
                .unwrap_or_else(|_| "./data/shopcart.db".to_string()),
            token_secret,
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            db_pool_size: env::var("DB_POOL_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("DB_POOL_SIZE must be a positive integer")?,
            store_timeout: Duration::from_millis(
                env::var("STORE_TIMEOUT_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .context("STORE_TIMEOUT_MS must be a number of milliseconds")?,
            ),
            rate_limit: env::var("RATE_LIMIT")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        })
    }
}
