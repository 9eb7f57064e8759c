//! Gatehouse Static File Server Module
//!
//! Static file serving with:
//! - Path resolution confined to a root directory
//! - MIME type detection
//! - Conditional and range requests
//! - Compression (gzip, brotli, zstd)
//! - Fancy directory indexes

mod compress;
mod error;
mod file_server;
pub mod listing;
mod mime;
pub mod path;

pub use error::ServeError;
pub use file_server::{FileBody, FileRequest, FileServer, FileServerConfig, ServedFile};
