//! TCP accept loop.
//!
//! Binds a listener, then accepts connections indefinitely, spawning one
//! session task per connection so a slow or blocked peer cannot stall the
//! others. Bind failure is the only fatal error; once serving, accept and
//! per-connection failures are logged and survived.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::registry::Registry;
use crate::session;

/// Default cap on concurrent connections; a hardening knob, not part of
/// the protocol.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Notice written to a connection refused at the capacity limit.
const SERVER_FULL: &str = "SYSTEM:Server is full. Try again later.\n";

/// Errors from starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The TCP listener could not bind to the requested address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was attempted.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Starts the server on the given address with a fresh registry and the
/// default connection limit, returning the bound address and a join handle.
///
/// This is the entry point used by both `main.rs` and test code; tests bind
/// to `127.0.0.1:0` for an OS-assigned port.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the listener cannot bind.
pub async fn start_server(addr: &str) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
    start_server_with_registry(addr, Arc::new(Registry::new()), DEFAULT_MAX_CONNECTIONS).await
}

/// Starts the server with a pre-built [`Registry`] and connection limit.
///
/// The registry is constructed once here at server start and shared with
/// every session; nothing is process-global, so embedding code and tests
/// can run isolated servers side by side.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the listener cannot bind.
pub async fn start_server_with_registry(
    addr: &str,
    registry: Arc<Registry>,
    max_connections: usize,
) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    let bound_addr = listener.local_addr().map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })?;

    let handle = tokio::spawn(accept_loop(listener, registry, max_connections));
    Ok((bound_addr, handle))
}

/// Accepts connections forever, spawning a session per socket.
async fn accept_loop(listener: TcpListener, registry: Arc<Registry>, max_connections: usize) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if registry.session_count().await >= max_connections {
                    tracing::warn!(peer = %peer, limit = max_connections, "refusing connection at capacity");
                    tokio::spawn(refuse_connection(stream));
                    continue;
                }
                tokio::spawn(session::handle_connection(stream, Arc::clone(&registry)));
            }
            Err(e) => {
                // Per-accept failures never bring the server down.
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
}

/// Tells a refused peer why before closing its socket.
async fn refuse_connection(mut stream: tokio::net::TcpStream) {
    let _ = stream.write_all(SERVER_FULL.as_bytes()).await;
    let _ = stream.shutdown().await;
}
