// src/config.rs

use std::{env, path::PathBuf, str::FromStr};

use dotenvy::dotenv;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://responses.db";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_SESSION_RETENTION_SECONDS: u64 = 3600;
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub port: u16,
    /// Directory receiving uploaded audio answers.
    pub upload_dir: PathBuf,
    /// Directory served for every path outside `/api`.
    pub static_dir: PathBuf,
    /// Optional JSON catalog replacing the built-in section list.
    pub catalog_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
    /// How long a finished session is kept after its total budget ran out.
    pub session_retention_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            rust_log,
            port: parse_or("PORT", DEFAULT_PORT),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            static_dir: env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public")),
            catalog_path: env::var("CATALOG_PATH").ok().map(PathBuf::from),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            session_retention_seconds: parse_or(
                "SESSION_RETENTION_SECONDS",
                DEFAULT_SESSION_RETENTION_SECONDS,
            ),
            sweep_interval_seconds: parse_or(
                "SWEEP_INTERVAL_SECONDS",
                DEFAULT_SWEEP_INTERVAL_SECONDS,
            ),
        }
    }
}

/// Reads `key` and parses it, keeping `default` when unset or malformed.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring malformed {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
