//! Configuration loader

use crate::config::GatehouseConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides (`GATEHOUSE_LISTEN`, ...)
pub const ENV_PREFIX: &str = "GATEHOUSE_";

/// Configuration loader for various formats
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<GatehouseConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext {
            "json" => Self::from_json(&content),
            "toml" => Self::from_toml(&content),
            _ => Err(Error::Config(format!("Unknown config format: {}", ext))),
        }
    }

    /// Parse JSON configuration
    pub fn from_json(content: &str) -> Result<GatehouseConfig> {
        serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid JSON: {}", e)))
    }

    /// Parse TOML configuration
    pub fn from_toml(content: &str) -> Result<GatehouseConfig> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Overlay `GATEHOUSE_*` variables from the process environment
    pub fn apply_env(config: &mut GatehouseConfig) -> Result<()> {
        Self::apply_env_from(config, |key| std::env::var(key).ok())
    }

    /// Overlay variables from an arbitrary lookup
    pub fn apply_env_from<F>(config: &mut GatehouseConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(listen) = var("LISTEN") {
            config.listen = listen;
        }
        if let Some(root) = var("ROOT") {
            config.root = PathBuf::from(root);
        }
        if let Some(realm) = var("REALM") {
            config.auth.realm = realm;
        }
        if let Some(username) = var("USERNAME") {
            config.auth.credential.username = username;
        }
        if let Some(password) = var("PASSWORD") {
            tracing::debug!("🔑 Password taken from {}PASSWORD", ENV_PREFIX);
            config.auth.credential.password = password;
        }
        if let Some(grace) = var("GRACE_SECS") {
            config.shutdown.grace_period_secs = grace.trim().parse().map_err(|e| {
                Error::Config(format!("Invalid {}GRACE_SECS '{}': {}", ENV_PREFIX, grace, e))
            })?;
        }

        Ok(())
    }
}
