//! Turning termination signals into a cancelled [`CancellationToken`].
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancel `shutdown` on the first SIGINT or SIGTERM.
///
/// The handlers are registered before this returns, so a signal received afterwards is never
/// missed. The returned task ends once `shutdown` has been cancelled, for whatever reason.
pub fn listen_for_signals(shutdown: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            sigterm.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => tracing::info!("Signal SIGINT received. Stopping consumer..."),
                Err(e) => {
                    tracing::warn!("Unable to listen for SIGINT: {}", e);
                    return;
                }
            },
            _ = terminate => tracing::info!("Signal SIGTERM received. Stopping consumer..."),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    }))
}
