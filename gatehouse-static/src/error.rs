//! Request-level errors

use http::StatusCode;
use std::io;
use thiserror::Error;

/// Why a request could not be served. Never fatal to the server.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Not Found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Range Not Satisfiable")]
    RangeNotSatisfiable { size: u64 },

    #[error("IO error: {0}")]
    Io(io::Error),
}

impl ServeError {
    /// HTTP status reported to the client
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::NotFound => StatusCode::NOT_FOUND,
            ServeError::Forbidden => StatusCode::FORBIDDEN,
            ServeError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ServeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<io::Error> for ServeError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => ServeError::NotFound,
            io::ErrorKind::PermissionDenied => ServeError::Forbidden,
            _ => ServeError::Io(e),
        }
    }
}
