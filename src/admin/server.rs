//! Admin HTTP server - bind, serve, graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::handlers::router;
use crate::resilience::ResilienceService;

/// Admin server wrapping the resilience service.
#[derive(Debug)]
pub struct AdminServer {
    service: Arc<ResilienceService>,
    addr: SocketAddr,
    cancel: CancellationToken,
}

impl AdminServer {
    pub fn new(service: Arc<ResilienceService>, addr: SocketAddr) -> Self {
        Self {
            service,
            addr,
            cancel: CancellationToken::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    pub async fn serve_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        let local = listener.local_addr()?;
        tracing::info!("admin_server_listening: addr={}", local);

        let cancel = self.cancel.clone();
        axum::serve(listener, router(self.service.clone()))
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        tracing::info!("admin_server_stopped: addr={}", local);
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Token that stops the server when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
