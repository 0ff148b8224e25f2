use super::error::{Cause, Error, Op};
use super::listener::{ListenerRef, SharedListener};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// What a worker reports for one accept call
pub(crate) enum AcceptOutcome<C> {
    Connection(C),
    /// `Error::stopped` tells whether the worker has exited
    Failed(Error),
    /// The listener panicked; the payload is resumed by the consumer
    Panicked(Box<dyn Any + Send + 'static>),
}

/// Drives one listener's accept loop and forwards every result to the bundle
pub(crate) struct AcceptWorker<C> {
    listener: SharedListener<C>,
    origin: ListenerRef,
    results: mpsc::Sender<AcceptOutcome<C>>,
}

impl<C: Send + 'static> AcceptWorker<C> {
    pub(crate) fn new(
        listener: SharedListener<C>,
        origin: ListenerRef,
        results: mpsc::Sender<AcceptOutcome<C>>,
    ) -> Self {
        Self {
            listener,
            origin,
            results,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        debug!(listener = %self.origin, "Accept worker started");

        let result = AssertUnwindSafe(self.accept_loop()).catch_unwind().await;

        if let Err(payload) = result {
            error!(listener = %self.origin, "Listener panicked while accepting");
            // A closed queue means the bundle is gone and nobody is left to re-raise
            let _ = self.results.send(AcceptOutcome::Panicked(payload)).await;
        }
    }

    async fn accept_loop(&self) {
        loop {
            let outcome = match self.listener.accept().await {
                Ok(conn) => AcceptOutcome::Connection(conn),
                Err(cause) => AcceptOutcome::Failed(self.classify(cause)),
            };
            let stopped = matches!(&outcome, AcceptOutcome::Failed(err) if err.stopped());

            if self.results.send(outcome).await.is_err() {
                debug!(listener = %self.origin, "Bundle dropped, accept worker exiting");
                return;
            }
            if stopped {
                debug!(listener = %self.origin, "Accept worker stopped");
                return;
            }
        }
    }

    /// Another listener in the bundle may still be healthy, so the error starts
    /// out temporary. Only a cause that is positively temporary keeps the loop going.
    fn classify(&self, cause: Cause) -> Error {
        let keep_going = cause.temporary() == Some(true);
        let err = Error::wrapped(Op::Accept, cause, true).with_listener(self.origin.clone());

        if keep_going {
            debug!(listener = %self.origin, error = %err, "Temporary accept failure");
            err
        } else {
            warn!(listener = %self.origin, error = %err, "Listener stopped after accept failure");
            err.into_stopped()
        }
    }
}
