// src/config.rs

use std::env;
use std::net::SocketAddr;

use dotenvy::dotenv;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub listen_addr: SocketAddr,
    pub log_dir: String,
    pub uploads_dir: String,
    /// When set, only moderators may move a post into or out of `archived`.
    pub archive_requires_moderator: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::InternalServerError("JWT_SECRET must be set".to_string()))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let listen_addr = env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::InternalServerError(format!("Invalid LISTEN_ADDR: {}", e)))?;

        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
        let uploads_dir = env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string());

        let archive_requires_moderator = match env::var("ARCHIVE_REQUIRES_MODERATOR") {
            Ok(value) => parse_flag(&value).ok_or_else(|| {
                AppError::InternalServerError(format!(
                    "Invalid ARCHIVE_REQUIRES_MODERATOR: {}",
                    value
                ))
            })?,
            Err(_) => false,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            listen_addr,
            log_dir,
            uploads_dir,
            archive_requires_moderator,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
