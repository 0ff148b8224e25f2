use clap::Parser;
use listener_bundle::{config::Config, server::BundleServer};
use tracing::{error, info};
use tracing_appender::non_blocking;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[derive(Parser)]
#[command(name = "listener-bundle")]
#[command(about = "Serve several listening sockets through one accept loop")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/simple.yaml")]
    config: String,
}

fn init_logging() {
    let (non_blocking_writer, guard) = non_blocking(std::io::stderr());
    // Dropping the guard stops the writer thread
    let _ = LOG_GUARD.set(guard);

    let fmt = tracing_subscriber::fmt()
        .with_writer(non_blocking_writer)
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .compact();

    // RUST_LOG holds a single level name, not a filter directive
    let level = match std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let _ = fmt.with_max_level(level).try_init();
}

async fn run_with_config_path_and_shutdown(
    config_path: &str,
    shutdown: impl std::future::Future<Output = ()> + Send,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_yaml_file(config_path).await?;
    for name in config.listener_names() {
        let listener = &config.listeners[name];
        match (&listener.bind, &listener.unix) {
            (Some(bind), _) => info!("Listener '{}': tcp {}", name, bind),
            (None, Some(path)) => info!("Listener '{}': unix {}", name, path.display()),
            (None, None) => {}
        }
    }

    let server = BundleServer::bind(config).await?;
    let run = server.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
            return Ok(());
        }
        _ = shutdown => {
            info!("Shutdown signal received");
        }
    }

    if let Err(e) = server.shutdown().await {
        error!("Failed to close listeners: {}", e);
    }
    // Resolves once every listener's pending accept has failed
    run.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();
    info!("Starting listener bundle");
    run_with_config_path_and_shutdown(&args.config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    info!("Listener bundle stopped");
    Ok(())
}
