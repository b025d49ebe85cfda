//! Daemon configuration from environment variables
//!
//! Defaults first, `ANY_SYNC_*` environment overrides second; CLI flags win
//! over both in `main`.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
    /// Seconds between health ticks.
    pub health_check_interval: u64,
    /// Where to announce the bound port, if anywhere.
    pub port_file: Option<PathBuf>,
    /// Compatibility-mode data directory for Init requests without one.
    pub db_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self {
            host: "localhost".to_string(),
            port: 0,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            health_check_interval: 30,
            port_file: None,
            db_path: None,
        };

        if let Ok(host) = std::env::var("ANY_SYNC_HOST") {
            if !host.is_empty() {
                config.host = host;
            }
        }
        if let Ok(port) = std::env::var("ANY_SYNC_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Ok(level) = std::env::var("ANY_SYNC_LOG_LEVEL") {
            if !level.is_empty() {
                config.log_level = level;
            }
        }
        if let Ok(format) = std::env::var("ANY_SYNC_LOG_FORMAT") {
            if !format.is_empty() {
                config.log_format = format;
            }
        }
        if let Ok(interval) = std::env::var("ANY_SYNC_HEALTH_CHECK_INTERVAL") {
            if let Ok(interval) = interval.parse() {
                config.health_check_interval = interval;
            }
        }
        if let Ok(path) = std::env::var("ANY_SYNC_PORT_FILE") {
            if !path.is_empty() {
                config.port_file = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("ANY_SYNC_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        config
    }
}
