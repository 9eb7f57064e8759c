//! Gatehouse Core Library
//!
//! This crate provides the shared pieces of the Gatehouse file server:
//! configuration types, the configuration loader and error handling.

pub mod config;
pub mod error;

pub use error::{Error, Result};

/// Gatehouse version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
