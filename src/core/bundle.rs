use super::error::{Cause, Error, Op};
use super::listener::{Address, Listener, ListenerRef, SharedListener};
use super::worker::{AcceptOutcome, AcceptWorker};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

struct Member<C> {
    listener: SharedListener<C>,
    origin: ListenerRef,
}

/// Several listeners behind one accept call.
///
/// The first `accept` spawns one worker task per listener. Each worker loops
/// on its own listener and pushes results into a queue shared by all of them;
/// `accept` hands out whatever arrives first. A listener whose accept fails
/// with a non-temporary cause stops, and once the last one has stopped the
/// bundle is exhausted for good.
pub struct Bundle<C> {
    address: Address,
    members: Vec<Member<C>>,
    /// Workers that have not stopped or panicked yet
    active: AtomicUsize,
    started: Once,
    sender: mpsc::Sender<AcceptOutcome<C>>,
    results: Mutex<mpsc::Receiver<AcceptOutcome<C>>>,
}

/// Bundle the given listeners into one.
///
/// `main` provides the bundle's address. Fails if `main` or any of `others`
/// is missing.
pub fn bundle<C, I>(main: Option<SharedListener<C>>, others: I) -> Result<Bundle<C>, Error>
where
    C: Send + 'static,
    I: IntoIterator<Item = Option<SharedListener<C>>>,
{
    let main = main.ok_or_else(|| Error::generic("main listener is missing"))?;
    let others = others
        .into_iter()
        .map(|listener| listener.ok_or_else(|| Error::generic("listener is missing")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Bundle::new(main, others))
}

impl<C: Send + 'static> Bundle<C> {
    /// Listener order inside the bundle is `others` followed by `main`.
    pub fn new(main: SharedListener<C>, others: Vec<SharedListener<C>>) -> Self {
        let address = main.address();
        let members: Vec<Member<C>> = others
            .into_iter()
            .chain(std::iter::once(main))
            .enumerate()
            .map(|(index, listener)| Member {
                origin: ListenerRef::new(index, listener.address()),
                listener,
            })
            .collect();

        let (sender, receiver) = mpsc::channel(members.len());

        Self {
            address,
            active: AtomicUsize::new(members.len()),
            members,
            started: Once::new(),
            sender,
            results: Mutex::new(receiver),
        }
    }

    fn start(&self) {
        info!(
            address = %self.address,
            listeners = self.members.len(),
            "Starting accept workers"
        );
        for member in &self.members {
            AcceptWorker::new(
                member.listener.clone(),
                member.origin.clone(),
                self.sender.clone(),
            )
            .spawn();
        }
    }

    /// Wait for the next connection from any listener.
    ///
    /// Errors with `temporary() == true` can be retried. A permanent error
    /// means no listener is left. If a listener panicked, the panic is resumed
    /// here.
    pub async fn accept(&self) -> Result<C, Error> {
        self.started.call_once(|| self.start());

        let mut results = self.results.lock().await;
        match results.recv().await {
            None => Err(Error::exhausted()),
            Some(AcceptOutcome::Connection(conn)) => Ok(conn),
            Some(AcceptOutcome::Failed(mut err)) => {
                if err.stopped() && self.retire() {
                    results.close();
                    err.make_permanent();
                    info!(address = %self.address, "All listeners stopped");
                }
                Err(err)
            }
            Some(AcceptOutcome::Panicked(payload)) => {
                if self.retire() {
                    results.close();
                    info!(address = %self.address, "All listeners stopped");
                }
                drop(results);
                std::panic::resume_unwind(payload)
            }
        }
    }

    /// Count one worker out. True for exactly one caller: the one that took
    /// the count to zero.
    fn retire(&self) -> bool {
        self.active.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Close every listener, even if some fail. Reports the first failure.
    ///
    /// Workers are not joined; they exit once their listener's pending accept
    /// returns.
    pub async fn close(&self) -> Result<(), Error> {
        let mut first_failure = None;

        for member in &self.members {
            match member.listener.close().await {
                Ok(()) => debug!(listener = %member.origin, "Listener closed"),
                Err(cause) => {
                    warn!(listener = %member.origin, error = %cause, "Failed to close listener");
                    if first_failure.is_none() {
                        first_failure = Some(
                            Error::wrapped(Op::Close, cause, false)
                                .with_listener(member.origin.clone())
                                .into_stopped(),
                        );
                    }
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Address of the main listener
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Number of bundled listeners
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Listeners that have not stopped yet
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// A bundle can itself be bundled.
#[async_trait]
impl<C: Send + 'static> Listener for Bundle<C> {
    type Conn = C;

    async fn accept(&self) -> Result<C, Cause> {
        Bundle::accept(self).await.map_err(Cause::from)
    }

    async fn close(&self) -> Result<(), Cause> {
        Bundle::close(self).await.map_err(Cause::from)
    }

    fn address(&self) -> Address {
        self.address.clone()
    }
}
