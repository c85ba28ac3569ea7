use tokio_util::sync::CancellationToken;

/// Wait for SIGINT or SIGTERM (Ctrl-C only off Unix), then cancel `cancel`.
/// Returns early without cancelling if `cancel` fires first.
pub async fn wait_for_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        gr_info!(sys, signal = "SIGINT", "received signal, stopping");
                    }
                    _ = sigterm.recv() => {
                        gr_info!(sys, signal = "SIGTERM", "received signal, stopping");
                    }
                    _ = cancel.cancelled() => return,
                }
            }
            Err(e) => {
                gr_warn!(sys, error = %e, "cannot listen for SIGTERM; Ctrl-C only");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        gr_info!(sys, signal = "SIGINT", "received signal, stopping");
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                gr_info!(sys, "received shutdown signal, stopping");
            }
            _ = cancel.cancelled() => return,
        }
    }
    cancel.cancel();
}
