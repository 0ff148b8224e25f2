use super::error::Cause;
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Core trait for input endpoints (TCP port, Unix socket, in-memory mock)
#[async_trait]
pub trait Listener: Send + Sync {
    /// Connection type handed out by `accept`
    type Conn: Send + 'static;

    /// Wait for the next inbound connection.
    ///
    /// Implementations must return promptly once `close` has been called.
    async fn accept(&self) -> Result<Self::Conn, Cause>;

    /// Stop the listener. A second call may itself report an error.
    async fn close(&self) -> Result<(), Cause>;

    /// Get the address this listener is bound to
    fn address(&self) -> Address;
}

/// Shared handle to an externally owned listener
pub type SharedListener<C> = Arc<dyn Listener<Conn = C>>;

/// Where a listener accepts connections
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Tcp(SocketAddr),
    Unix(PathBuf),
    /// Free-form address for listeners without a socket (tests, in-process pipes)
    Named(String),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp(addr) => write!(f, "tcp://{}", addr),
            Address::Unix(path) => write!(f, "unix://{}", path.display()),
            Address::Named(name) => f.write_str(name),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Tcp(addr)
    }
}

/// Back-reference from an error to the listener it came from.
///
/// `index` is the listener's position inside its bundle: additional listeners
/// first, in the order given, then the main listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerRef {
    index: usize,
    address: Address,
}

impl ListenerRef {
    pub fn new(index: usize, address: Address) -> Self {
        Self { index, address }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl fmt::Display for ListenerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.address)
    }
}
