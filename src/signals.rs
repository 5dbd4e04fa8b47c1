use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Resolve when the process is asked to stop
///
/// Handles SIGTERM and SIGINT on unix, Ctrl+C elsewhere. If a handler cannot
/// be installed the error is logged and that signal is ignored.
#[cfg(unix)]
pub async fn shutdown_signal() {
    let sigterm = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to setup SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    let sigint = async {
        match signal(SignalKind::interrupt()) {
            Ok(mut sigint) => {
                sigint.recv().await;
            }
            Err(e) => {
                error!("Failed to setup SIGINT handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = sigterm => info!("SIGTERM received, initiating graceful shutdown"),
        _ = sigint => info!("SIGINT received, initiating graceful shutdown"),
    }
}

/// Windows placeholder - only Ctrl+C is supported
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, initiating shutdown"),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
