//! Gatehouse HTTP server

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_core::config::GatehouseConfig;
use gatehouse_core::{Error, Result};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;

use crate::handlers::{AppState, handle_request};
use crate::shutdown::ShutdownSignal;

/// Accept loop serving authenticated file requests
pub struct Server {
    state: Arc<AppState>,
    grace_period: Duration,
}

impl Server {
    /// Create a server from a validated configuration
    pub fn new(config: &GatehouseConfig) -> Self {
        Self::with_state(AppState::from_config(config), config.shutdown.grace_period())
    }

    pub fn with_state(state: AppState, grace_period: Duration) -> Self {
        Self {
            state: Arc::new(state),
            grace_period,
        }
    }

    /// Bind the listener
    pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Server(format!("Failed to bind {}: {}", addr, e)))
    }

    /// Serve connections until `shutdown` fires, then give in-flight
    /// connections up to the grace period to finish
    pub async fn serve(&self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<()> {
        let graceful = GracefulShutdown::new();

        match listener.local_addr() {
            Ok(addr) => tracing::info!("🚀 Gatehouse listening on http://{}", addr),
            Err(e) => tracing::warn!("Listening on unknown address: {}", e),
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!("Accept error: {}", e);
                            continue;
                        }
                    };

                    tracing::trace!("🔌 Connection from {}", peer);

                    let io = TokioIo::new(stream);
                    let state = self.state.clone();
                    let service = service_fn(move |req| {
                        let state = state.clone();
                        async move { Ok::<_, Infallible>(handle_request(&state, req).await) }
                    });

                    let conn = http1::Builder::new().serve_connection(io, service);
                    let conn = graceful.watch(conn);

                    tokio::spawn(async move {
                        if let Err(err) = conn.await {
                            tracing::debug!("Error serving connection from {}: {:?}", peer, err);
                        }
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!("🛑 Shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        // Closes the socket so new connections are refused right away
        drop(listener);

        if self.grace_period.is_zero() {
            tracing::info!("👋 Exiting without waiting for open connections");
            return Ok(());
        }

        tokio::select! {
            _ = graceful.shutdown() => {
                tracing::info!("✅ All connections closed");
            }
            _ = tokio::time::sleep(self.grace_period) => {
                tracing::warn!(
                    "⏱️ Grace period of {:?} elapsed with connections still open",
                    self.grace_period
                );
            }
        }

        Ok(())
    }
}

/// Bind to the configured address and serve until shutdown
pub async fn run_server(config: &GatehouseConfig, shutdown: ShutdownSignal) -> Result<()> {
    let addr = config.socket_addr()?;
    let listener = Server::bind(addr).await?;

    tracing::info!("📁 Serving {}", config.root.display());
    if config.auth.realm.is_empty() {
        tracing::info!("🔒 Basic auth enabled for user '{}'", config.auth.credential.username);
    } else {
        tracing::info!(
            "🔒 Basic auth enabled for user '{}' (realm \"{}\")",
            config.auth.credential.username,
            config.auth.realm
        );
    }

    Server::new(config).serve(listener, shutdown).await
}
