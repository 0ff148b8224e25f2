//! Socket listeners that plug into a bundle.
//!
//! Tokio's listeners have no `close`: the socket goes away when the value is
//! dropped, and a pending `accept` keeps it alive. [`SocketSlot`] adds the
//! missing half. `close` drops the slot's handle and wakes every pending
//! accept, which then fails with a permanent error.

pub mod stream;
pub mod tcp;
#[cfg(unix)]
pub mod unix;

pub use stream::Stream;
pub use tcp::{TcpAcceptor, TcpTuning};
#[cfg(unix)]
pub use unix::UnixAcceptor;

use crate::core::Cause;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Closable holder for a bound socket
pub(crate) struct SocketSlot<T> {
    socket: Mutex<Option<Arc<T>>>,
    closed: watch::Sender<bool>,
}

impl<T> SocketSlot<T> {
    pub(crate) fn new(socket: T) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            socket: Mutex::new(Some(Arc::new(socket))),
            closed,
        }
    }

    /// The socket plus a receiver that fires on close. Fails once closed.
    pub(crate) fn acquire(&self) -> io::Result<(Arc<T>, watch::Receiver<bool>)> {
        // Subscribe first so a close racing with us is still observed
        let closed = self.closed.subscribe();
        let socket = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(closed_error)?;
        Ok((socket, closed))
    }

    pub(crate) fn close(&self) -> Result<(), Cause> {
        let socket = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match socket {
            Some(_) => {
                self.closed.send_replace(true);
                Ok(())
            }
            None => Err(Cause::new("listener already closed")),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Resolves once the slot has been closed
pub(crate) async fn closed(mut closed: watch::Receiver<bool>) {
    // The sender lives as long as the slot, which outlives every acquire
    let _ = closed.wait_for(|closed| *closed).await;
}

pub(crate) fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "listener closed")
}
