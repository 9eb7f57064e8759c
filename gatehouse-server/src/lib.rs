//! Gatehouse HTTP front end
//!
//! Basic authentication in front of the static file server, a hyper
//! accept loop and the shutdown plumbing between signals and that loop.

pub mod auth;
mod handlers;
pub mod server;
pub mod shutdown;

pub use auth::{AuthOutcome, BasicAuth};
pub use handlers::{AppState, ResponseBody, handle_request};
pub use server::{Server, run_server};
pub use shutdown::{ShutdownHandle, ShutdownSignal};
