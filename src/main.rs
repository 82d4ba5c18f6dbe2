use anyhow::Result;
use tokio_util::sync::CancellationToken;

use awsx::commands::App;
use awsx::config::Config;
use awsx::prompt::Prompter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Using configuration directory {}", config.paths.internal_dir.display());

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let prompt = Prompter;
    let app = App::new(&config, &prompt, cancel);

    if let Err(e) = app.run().await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Cancel pending work on Ctrl+C or SIGTERM; a second Ctrl+C exits
async fn shutdown_signal(cancel: CancellationToken) {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, cancelling...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, cancelling...");
        },
    }
    cancel.cancel();

    if signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}
