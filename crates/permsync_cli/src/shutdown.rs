use tokio_util::sync::CancellationToken;

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C cancels `cancel`; in-flight requests are abandoned and
/// the scheduler returns. A second Ctrl+C exits immediately with status 130.
pub(crate) fn setup_shutdown_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            return;
        }

        tracing::warn!("Shutdown requested, stopping the scheduler (press Ctrl+C again to force quit)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Force quit");
            std::process::exit(130);
        }
    });
}
