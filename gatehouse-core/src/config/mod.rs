//! Configuration for Gatehouse
//!
//! Layering order: defaults, config file, environment, command line.

mod loader;
mod types;

pub use loader::{ConfigLoader, ENV_PREFIX};
pub use types::*;
