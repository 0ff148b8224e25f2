use crate::config::{Config, ConfigError, ListenerConfig};
use crate::core::{Address, Bundle, Error, Listener, SharedListener};
use crate::net::{Stream, TcpAcceptor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Echo server on top of a bundle of every configured listener
pub struct BundleServer {
    config: Arc<Config>,
    bundle: Arc<Bundle<Stream>>,
    shutting_down: AtomicBool,
}

impl BundleServer {
    /// Bind every configured listener and bundle them
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        config.validate()?;

        let main_name = config
            .main_listener()
            .ok_or(ServerError::NoListeners)?
            .to_string();

        let mut main = None;
        let mut others = Vec::new();
        for name in config.listener_names() {
            let listener = match bind_listener(name, &config.listeners[name]).await {
                Ok(listener) => listener,
                Err(e) => {
                    release_bound(main.into_iter().chain(others)).await;
                    return Err(e);
                }
            };
            if name == main_name {
                main = Some(listener);
            } else {
                others.push(listener);
            }
        }

        let main = main.ok_or_else(|| ServerError::UnknownMain(main_name.clone()))?;
        let bundle = Bundle::new(main, others);

        info!(
            "Bundled {} listeners, main '{}' at {}",
            bundle.len(),
            main_name,
            bundle.address()
        );

        Ok(Self {
            config: Arc::new(config),
            bundle: Arc::new(bundle),
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn address(&self) -> &Address {
        self.bundle.address()
    }

    pub fn bundle(&self) -> Arc<Bundle<Stream>> {
        Arc::clone(&self.bundle)
    }

    /// Serve connections until the bundle is exhausted.
    ///
    /// Returns `Ok` if the bundle ran out because of `shutdown`.
    pub async fn run(&self) -> Result<(), ServerError> {
        let greeting: Option<Arc<str>> = self.config.service.greeting.as_deref().map(Arc::from);

        loop {
            match self.bundle.accept().await {
                Ok(stream) => {
                    let peer = stream.peer_address();
                    debug!("New connection from: {:?}", peer);

                    let greeting = greeting.clone();
                    tokio::spawn(async move {
                        match handle_connection(stream, greeting).await {
                            Ok(bytes) => debug!("Connection from {:?} closed after {} bytes", peer, bytes),
                            Err(e) => error!("Connection error: {}", e),
                        }
                    });
                }
                Err(e) if e.temporary() => {
                    if self.shutting_down.load(Ordering::Acquire) {
                        debug!("Listener stopped during shutdown: {}", e);
                    } else {
                        warn!("Accept failed, retrying: {}", e);
                    }
                }
                Err(e) => {
                    if self.shutting_down.load(Ordering::Acquire) {
                        info!("Listener bundle closed");
                        return Ok(());
                    }
                    error!("Listener bundle exhausted: {}", e);
                    return Err(ServerError::Accept(e));
                }
            }
        }
    }

    /// Close every listener. A pending `run` returns once the bundle is exhausted.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        self.shutting_down.store(true, Ordering::Release);
        self.bundle.close().await.map_err(ServerError::Close)
    }
}

/// Close listeners bound before a later bind failed
async fn release_bound(bound: impl IntoIterator<Item = SharedListener<Stream>>) {
    for listener in bound {
        if let Err(e) = listener.close().await {
            warn!("Failed to release listener {}: {}", listener.address(), e);
        }
    }
}

async fn bind_listener(
    name: &str,
    config: &ListenerConfig,
) -> Result<SharedListener<Stream>, ServerError> {
    if let Some(bind) = &config.bind {
        info!("Listener '{}' binding to: {}", name, bind);
        let acceptor = TcpAcceptor::bind(bind.as_str())
            .await
            .map_err(|source| ServerError::BindFailed {
                name: name.to_string(),
                source,
            })?
            .with_tuning(config.tuning());
        return Ok(Arc::new(acceptor));
    }

    match &config.unix {
        Some(path) => bind_unix(name, path),
        None => Err(ConfigError::ValidationError(format!(
            "Listener '{}' needs either 'bind' or 'unix'",
            name
        ))
        .into()),
    }
}

#[cfg(unix)]
fn bind_unix(name: &str, path: &std::path::Path) -> Result<SharedListener<Stream>, ServerError> {
    info!("Listener '{}' binding to: {}", name, path.display());
    let acceptor =
        crate::net::UnixAcceptor::bind(path).map_err(|source| ServerError::BindFailed {
            name: name.to_string(),
            source,
        })?;
    Ok(Arc::new(acceptor))
}

#[cfg(not(unix))]
fn bind_unix(name: &str, _path: &std::path::Path) -> Result<SharedListener<Stream>, ServerError> {
    Err(ServerError::UnsupportedTransport(name.to_string()))
}

/// Write the greeting, then echo everything back until the client hangs up
async fn handle_connection(
    mut stream: Stream,
    greeting: Option<Arc<str>>,
) -> Result<u64, ServerError> {
    if let Some(greeting) = greeting {
        stream.write_all(greeting.as_bytes()).await?;
        stream.flush().await?;
    }

    let (mut reader, mut writer) = tokio::io::split(stream);
    let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
    writer.shutdown().await?;
    Ok(bytes)
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("No listeners configured")]
    NoListeners,
    #[error("Main listener '{0}' not found in configuration")]
    UnknownMain(String),
    #[error("Bind failed for listener '{name}': {source}")]
    BindFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unix sockets are not supported on this platform (listener '{0}')")]
    UnsupportedTransport(String),
    #[error("Accept failed: {0}")]
    Accept(#[source] Error),
    #[error("Close failed: {0}")]
    Close(#[source] Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
