use anyhow::{Context, Result};
use std::env;

/// Process configuration, loaded once at startup and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub token_expiry_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            db_path: env::var("QUILL_DB_PATH").unwrap_or_else(|_| "quill.db".into()),
            host: env::var("QUILL_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("QUILL_PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()
                .context("QUILL_PORT must be a valid port number")?,
            jwt_secret: env::var("QUILL_JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".into()),
            jwt_issuer: env::var("QUILL_JWT_ISSUER").unwrap_or_else(|_| "quill".into()),
            jwt_audience: env::var("QUILL_JWT_AUDIENCE")
                .unwrap_or_else(|_| "quill-clients".into()),
            token_expiry_minutes: env::var("QUILL_TOKEN_EXPIRY_MINUTES")
                .unwrap_or_else(|_| "60".into())
                .parse()
                .context("QUILL_TOKEN_EXPIRY_MINUTES must be a number")?,
        })
    }
}
