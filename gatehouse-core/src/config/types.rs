//! Configuration type definitions
//!
//! These types represent the runtime configuration for Gatehouse.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default listen address (port 4444 on all interfaces)
pub const DEFAULT_LISTEN: &str = "0.0.0.0:4444";

/// Root configuration for Gatehouse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatehouseConfig {
    /// Listen address, `host:port` or `:port`
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Directory to serve
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Basic authentication settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// File serving options
    #[serde(default)]
    pub file_server: FileServerSettings,

    /// Shutdown behaviour
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl Default for GatehouseConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            root: default_root(),
            auth: AuthConfig::default(),
            file_server: FileServerSettings::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl GatehouseConfig {
    /// Resolve the listen address. `:4444` is shorthand for `0.0.0.0:4444`.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let listen = if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        };

        listen
            .parse()
            .map_err(|e| Error::Config(format!("Invalid listen address '{}': {}", self.listen, e)))
    }

    /// Check the configuration for errors that would only surface at runtime
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.auth.credential.username.contains(':') {
            return Err(Error::Config(
                "Username must not contain ':'".to_string(),
            ));
        }

        if self.auth.realm.chars().any(|c| c.is_control()) {
            return Err(Error::Config(
                "Realm must not contain control characters".to_string(),
            ));
        }

        match std::fs::metadata(&self.root) {
            Ok(m) if m.is_dir() => {}
            Ok(_) => {
                return Err(Error::Config(format!(
                    "Root '{}' is not a directory",
                    self.root.display()
                )));
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "Root '{}' is not accessible: {}",
                    self.root.display(),
                    e
                )));
            }
        }

        if self.file_server.index.iter().any(|i| i.is_empty() || i.contains('/')) {
            return Err(Error::Config(
                "Index file names must be plain file names".to_string(),
            ));
        }

        for pattern in &self.file_server.hidden {
            glob::Pattern::new(pattern).map_err(|e| {
                Error::Config(format!("Invalid hidden pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

/// Basic authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Realm sent in the `WWW-Authenticate` challenge
    #[serde(default)]
    pub realm: String,

    /// The single accepted credential pair
    #[serde(flatten)]
    pub credential: Credential,
}

/// A username/password pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Default for Credential {
    fn default() -> Self {
        Self::new("foo", "bar")
    }
}

// Never print the password
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// File server options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileServerSettings {
    /// Index files to look for in directories
    #[serde(default = "default_index")]
    pub index: Vec<String>,

    /// Render a listing for directories without an index file
    #[serde(default = "default_bool_true")]
    pub browse: bool,

    /// Compress responses when the client accepts it
    #[serde(default = "default_bool_true")]
    pub compress: bool,

    /// Largest file compressed on the fly; bigger files are streamed as-is
    #[serde(default = "default_compress_max_bytes")]
    pub compress_max_bytes: u64,

    /// Serve `.br` / `.zst` / `.gz` siblings when present
    #[serde(default = "default_bool_true")]
    pub precompressed: bool,

    /// Name patterns that are never served or listed
    #[serde(default = "default_hidden")]
    pub hidden: Vec<String>,
}

impl Default for FileServerSettings {
    fn default() -> Self {
        Self {
            index: default_index(),
            browse: true,
            compress: true,
            compress_max_bytes: default_compress_max_bytes(),
            precompressed: true,
            hidden: default_hidden(),
        }
    }
}

fn default_bool_true() -> bool {
    true
}

fn default_compress_max_bytes() -> u64 {
    8 * 1024 * 1024
}

fn default_index() -> Vec<String> {
    vec!["index.html".to_string(), "index.htm".to_string()]
}

fn default_hidden() -> Vec<String> {
    vec![".ht*".to_string(), "*~".to_string()]
}

/// Shutdown configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Seconds in-flight connections get to finish after an interrupt
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

fn default_grace_period() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatehouseConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 4444);
        assert_eq!(config.auth.realm, "");
        assert_eq!(config.auth.credential, Credential::new("foo", "bar"));
        assert!(config.file_server.browse);
    }

    #[test]
    fn test_listen_shorthand() {
        let config = GatehouseConfig {
            listen: ":8080".to_string(),
            ..Default::default()
        };
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:8080");

        let config = GatehouseConfig {
            listen: "not-an-address".to_string(),
            ..Default::default()
        };
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_credential_debug_redacts_password() {
        let debug = format!("{:?}", Credential::new("alice", "s3cret"));
        assert!(debug.contains("alice"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_validate_rejects_colon_in_username() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = GatehouseConfig {
            root: tmp.path().to_path_buf(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.auth.credential.username = "a:b".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let config = GatehouseConfig {
            root: tmp.path().join("nope"),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_file_root() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        let config = GatehouseConfig {
            root: file,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_hidden_pattern() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = GatehouseConfig {
            root: tmp.path().to_path_buf(),
            ..Default::default()
        };
        config.file_server.hidden.push("*.bak".to_string());
        assert!(config.validate().is_ok());

        config.file_server.hidden.push("[unclosed".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[unclosed"));
    }
}
