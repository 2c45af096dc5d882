//! Configuration for the gateway server.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration. CLI flags (see `main.rs`) take precedence over
/// whatever is loaded here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Host this gateway answers to at the service level; empty disables
    /// virtual-host (`{bucket}.host`) addressing and accepts path-style only.
    #[serde(default)]
    pub service_host: String,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Flat filesystem backend: one directory per owner, one subdirectory
    /// per bucket.
    Dir { root: PathBuf },

    /// Ordered-KV metadata plus external blob-store backend.
    Distributed {
        blob_master: String,
        meta_dir: PathBuf,
    },
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Dir { root: PathBuf::from("./data") }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            service_host: String::new(),
            backend: BackendConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("S3GATE_LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.listen_addr = parsed;
            }
        }

        if let Ok(host) = std::env::var("S3GATE_SERVICE_HOST") {
            config.service_host = host;
        }

        if let Ok(master) = std::env::var("S3GATE_BLOB_MASTER") {
            let meta_dir = std::env::var("S3GATE_META_DIR").unwrap_or_else(|_| "./meta".to_string());
            config.backend = BackendConfig::Distributed {
                blob_master: master,
                meta_dir: PathBuf::from(meta_dir),
            };
        } else if let Ok(root) = std::env::var("S3GATE_ROOT") {
            config.backend = BackendConfig::Dir { root: PathBuf::from(root) };
        }

        if let Ok(level) = std::env::var("S3GATE_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Load from a configured file if present, otherwise from environment.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("S3GATE_CONFIG") {
            if let Ok(config) = Self::from_file(&path) {
                return config;
            }
        }

        for path in &["s3gate.toml", "/etc/s3gate/config.toml"] {
            if std::path::Path::new(path).exists() {
                if let Ok(config) = Self::from_file(path) {
                    return config;
                }
            }
        }

        Self::from_env()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),
}
