//! Shared TCP listener.
//!
//! # Responsibilities
//! - Bind the configured address from every worker process
//! - Let the kernel spread incoming connections across workers
//!
//! # Design Decisions
//! - `SO_REUSEADDR` + `SO_REUSEPORT` (unix) so N processes bind one port
//! - Bind failures are fatal to the worker; the supervisor replaces it

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket};

const BACKLOG: u32 = 1024;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// The configured address does not parse.
    Address(String),
    /// Failed to create, configure or bind the socket.
    Bind(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Address(addr) => write!(f, "Invalid bind address: {}", addr),
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) => Some(e),
            ListenerError::Address(_) => None,
        }
    }
}

/// Parse `host:port` into a socket address.
pub fn parse_address(address: &str) -> Result<SocketAddr, ListenerError> {
    address
        .parse()
        .map_err(|_| ListenerError::Address(address.to_string()))
}

/// Bind a listener that other processes may bind to the same address.
pub fn bind_shared(addr: SocketAddr) -> Result<TcpListener, ListenerError> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(ListenerError::Bind)?;

    socket.set_reuseaddr(true).map_err(ListenerError::Bind)?;
    #[cfg(unix)]
    socket.set_reuseport(true).map_err(ListenerError::Bind)?;

    socket.bind(addr).map_err(ListenerError::Bind)?;
    let listener = socket.listen(BACKLOG).map_err(ListenerError::Bind)?;

    if let Ok(local_addr) = listener.local_addr() {
        tracing::info!(address = %local_addr, "Listener bound");
    }
    Ok(listener)
}
