//! Error types for Gatehouse

use thiserror::Error;

/// Result type for Gatehouse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Gatehouse
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),
}
