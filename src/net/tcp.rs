use super::{closed, closed_error, SocketSlot, Stream};
use crate::core::{Address, Cause, Listener};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info};

/// Socket options applied to every accepted TCP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpTuning {
    /// Disable Nagle's algorithm
    pub nodelay: bool,
    pub send_buffer_size: Option<usize>,
    pub recv_buffer_size: Option<usize>,
}

impl Default for TcpTuning {
    fn default() -> Self {
        Self {
            nodelay: true,
            send_buffer_size: None,
            recv_buffer_size: None,
        }
    }
}

impl TcpTuning {
    /// Best-effort: a socket that refuses an option is still served
    fn apply(&self, stream: &TcpStream) {
        if let Err(e) = stream.set_nodelay(self.nodelay) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        let socket_ref = socket2::SockRef::from(stream);
        if let Some(size) = self.send_buffer_size {
            if let Err(e) = socket_ref.set_send_buffer_size(size) {
                debug!("Failed to set send buffer size: {}", e);
            }
        }
        if let Some(size) = self.recv_buffer_size {
            if let Err(e) = socket_ref.set_recv_buffer_size(size) {
                debug!("Failed to set receive buffer size: {}", e);
            }
        }
    }
}

/// TCP listener with an explicit close
pub struct TcpAcceptor {
    slot: SocketSlot<TcpListener>,
    local_addr: SocketAddr,
    tuning: TcpTuning,
}

impl TcpAcceptor {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Self::from_listener(listener)
    }

    pub fn from_listener(listener: TcpListener) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "TCP listener bound");
        Ok(Self {
            slot: SocketSlot::new(listener),
            local_addr,
            tuning: TcpTuning::default(),
        })
    }

    pub fn with_tuning(mut self, tuning: TcpTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }
}

#[async_trait]
impl Listener for TcpAcceptor {
    type Conn = Stream;

    async fn accept(&self) -> Result<Stream, Cause> {
        let (socket, closing) = self.slot.acquire()?;

        tokio::select! {
            accepted = socket.accept() => {
                let (stream, peer) = accepted?;
                self.tuning.apply(&stream);
                debug!(address = %self.local_addr, peer = %peer, "Connection accepted");
                Ok(Stream::Tcp(stream))
            }
            _ = closed(closing) => Err(closed_error().into()),
        }
    }

    async fn close(&self) -> Result<(), Cause> {
        self.slot.close()?;
        info!(address = %self.local_addr, "TCP listener closed");
        Ok(())
    }

    fn address(&self) -> Address {
        Address::Tcp(self.local_addr)
    }
}
