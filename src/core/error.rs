use super::listener::ListenerRef;
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::io;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Operation during which a wrapped error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Accept,
    Close,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Accept => f.write_str("accept"),
            Op::Close => f.write_str("close"),
        }
    }
}

/// Failure reported by an underlying listener.
///
/// A cause may or may not know whether it is temporary or a timeout. `None`
/// means the capability is absent, which classification treats as `false`.
#[derive(Debug)]
pub struct Cause {
    inner: BoxError,
    temporary: Option<bool>,
    timeout: Option<bool>,
}

impl Cause {
    /// Wrap an error that carries no classification.
    pub fn new<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            inner: err.into(),
            temporary: None,
            timeout: None,
        }
    }

    pub fn with_temporary(mut self, temporary: bool) -> Self {
        self.temporary = Some(temporary);
        self
    }

    pub fn with_timeout(mut self, timeout: bool) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether the failure is temporary, if the cause knows
    pub fn temporary(&self) -> Option<bool> {
        self.temporary
    }

    /// Whether the failure is a timeout, if the cause knows
    pub fn timeout(&self) -> Option<bool> {
        self.timeout
    }

    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    pub fn into_inner(self) -> BoxError {
        self.inner
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

// Transparent: a cause displays and chains exactly like the error it wraps.
impl StdError for Cause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

impl From<io::Error> for Cause {
    fn from(err: io::Error) -> Self {
        let kind = err.kind();
        let temporary = is_transient(kind) || is_resource_exhaustion(&err);
        Self {
            inner: Box::new(err),
            temporary: Some(temporary),
            timeout: Some(kind == io::ErrorKind::TimedOut),
        }
    }
}

/// Errors from a nested bundle keep their classification.
impl From<Error> for Cause {
    fn from(err: Error) -> Self {
        Self {
            temporary: Some(err.temporary()),
            timeout: Some(err.timeout()),
            inner: Box::new(err),
        }
    }
}

/// Accept failures that say nothing about the health of the socket itself
fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::TimedOut
            | io::ErrorKind::OutOfMemory
    )
}

/// Out of descriptors or buffers. These have no dedicated `ErrorKind`.
#[cfg(unix)]
fn is_resource_exhaustion(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}

#[cfg(not(unix))]
fn is_resource_exhaustion(_err: &io::Error) -> bool {
    false
}

#[derive(Debug)]
enum Kind {
    /// Not caused by an underlying error; never temporary, never a timeout
    Generic(Cow<'static, str>),
    Wrapped {
        op: Op,
        cause: Cause,
        temporary: bool,
    },
}

/// Error produced by a listener bundle.
///
/// Every failure exposes the same facets: whether it is temporary, whether it
/// was a timeout, whether listening on the originating listener stopped, and
/// which listener it came from (if any).
#[derive(Debug)]
pub struct Error {
    kind: Kind,
    listener: Option<ListenerRef>,
    stopped: bool,
}

impl Error {
    pub(crate) fn generic(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: Kind::Generic(message.into()),
            listener: None,
            stopped: false,
        }
    }

    pub(crate) fn wrapped(op: Op, cause: Cause, temporary: bool) -> Self {
        Self {
            kind: Kind::Wrapped {
                op,
                cause,
                temporary,
            },
            listener: None,
            stopped: false,
        }
    }

    /// Every listener in the bundle has stopped
    pub(crate) fn exhausted() -> Self {
        Self::generic("all listeners stopped").into_stopped()
    }

    pub(crate) fn with_listener(mut self, listener: ListenerRef) -> Self {
        self.listener = Some(listener);
        self
    }

    pub(crate) fn into_stopped(mut self) -> Self {
        self.stopped = true;
        self
    }

    /// Promote to a permanent failure. Generic errors already are.
    pub(crate) fn make_permanent(&mut self) {
        if let Kind::Wrapped { temporary, .. } = &mut self.kind {
            *temporary = false;
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether retrying `accept` may succeed
    pub fn temporary(&self) -> bool {
        match &self.kind {
            Kind::Generic(_) => false,
            Kind::Wrapped { temporary, .. } => *temporary,
        }
    }

    pub fn timeout(&self) -> bool {
        match &self.kind {
            Kind::Generic(_) => false,
            Kind::Wrapped { cause, .. } => cause.timeout().unwrap_or(false),
        }
    }

    /// Whether listening on [`Error::listener`] stopped because of this error
    pub fn stopped(&self) -> bool {
        self.stopped
    }

    /// The listener on which the error occurred, `None` if not listener-specific
    pub fn listener(&self) -> Option<&ListenerRef> {
        self.listener.as_ref()
    }

    pub fn op(&self) -> Option<Op> {
        match &self.kind {
            Kind::Generic(_) => None,
            Kind::Wrapped { op, .. } => Some(*op),
        }
    }

    pub fn cause(&self) -> Option<&Cause> {
        match &self.kind {
            Kind::Generic(_) => None,
            Kind::Wrapped { cause, .. } => Some(cause),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Generic(message) => f.write_str(message),
            Kind::Wrapped { op, cause, .. } => write!(f, "{}: {}", op, cause),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.kind {
            Kind::Generic(_) => None,
            Kind::Wrapped { cause, .. } => Some(cause),
        }
    }
}
