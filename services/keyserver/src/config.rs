//! Server configuration loading.
//!
//! YAML is the sole config source, per spec.md §6. Every field has a
//! sensible default so a minimal (or absent -- `main` falls back to
//! `ServerConfig::default()` if no `--config` path is given and the
//! default path does not exist) config still produces a runnable server.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ServerError;

pub const DEFAULT_PLAINTEXT_PORT: u16 = 8282;
pub const DEFAULT_TLS_PORT: u16 = 8283;
pub const DEFAULT_HEARTBEAT_SECS: u16 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: (String, u16),
    #[serde(default = "default_keydb")]
    pub keydb: PathBuf,
    #[serde(default)]
    pub reload: ReloadConfig,
    #[serde(default)]
    pub ssl: SslConfig,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReloadConfig {
    #[serde(default)]
    pub poll_mtime: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SslConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cert: Option<PathBuf>,
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default = "default_tls_endpoint")]
    pub endpoint: (String, u16),
}

impl Default for SslConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert: None,
            key: None,
            endpoint: default_tls_endpoint(),
        }
    }
}

fn default_endpoint() -> (String, u16) {
    ("0.0.0.0".to_owned(), DEFAULT_PLAINTEXT_PORT)
}

fn default_tls_endpoint() -> (String, u16) {
    ("0.0.0.0".to_owned(), DEFAULT_TLS_PORT)
}

fn default_keydb() -> PathBuf {
    PathBuf::from("/var/db/keyserver.db")
}

fn default_heartbeat_secs() -> u16 {
    DEFAULT_HEARTBEAT_SECS
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            keydb: default_keydb(),
            reload: ReloadConfig::default(),
            ssl: SslConfig::default(),
            heartbeat_secs: default_heartbeat_secs(),
            log_level: default_log_level(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<ServerConfig, ServerError> {
    let text = std::fs::read_to_string(path).map_err(|source| ServerError::ReadConfig {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ServerError::ParseConfig {
        path: path.display().to_string(),
        source,
    })
}
