use super::{closed, closed_error, SocketSlot, Stream};
use crate::core::{Address, Cause, Listener};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::net::UnixListener;
use tracing::{debug, info, warn};

/// Unix domain socket listener with an explicit close.
///
/// Closing removes the socket file. So does dropping an acceptor that was
/// never closed, otherwise the next bind on the same path fails.
pub struct UnixAcceptor {
    slot: SocketSlot<UnixListener>,
    path: PathBuf,
}

impl UnixAcceptor {
    pub fn bind(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let listener = UnixListener::bind(&path)?;
        info!(path = %path.display(), "Unix listener bound");
        Ok(Self {
            slot: SocketSlot::new(listener),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Listener for UnixAcceptor {
    type Conn = Stream;

    async fn accept(&self) -> Result<Stream, Cause> {
        let (socket, closing) = self.slot.acquire()?;

        tokio::select! {
            accepted = socket.accept() => {
                let (stream, _) = accepted?;
                debug!(path = %self.path.display(), "Connection accepted");
                Ok(Stream::Unix(stream))
            }
            _ = closed(closing) => Err(closed_error().into()),
        }
    }

    async fn close(&self) -> Result<(), Cause> {
        self.slot.close()?;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove socket file: {}", e),
        }
        info!(path = %self.path.display(), "Unix listener closed");
        Ok(())
    }

    fn address(&self) -> Address {
        Address::Unix(self.path.clone())
    }
}

impl Drop for UnixAcceptor {
    fn drop(&mut self) {
        if self.slot.is_closed() {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed socket file of dropped listener"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove socket file: {}", e),
        }
    }
}
