//! Signal handling and run draining on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Cancel the returned token on SIGINT or SIGTERM.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("Received SIGINT, shutting down"),
                        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Could not install SIGTERM handler");
                    let _ = ctrl_c.await;
                    info!("Received SIGINT, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("Received Ctrl+C, shutting down");
        }

        trigger.cancel();
    });

    token
}

/// Cancel every in-flight run and wait up to `timeout` for them to finish.
pub async fn drain_runs(state: &Arc<AppState>, timeout: Duration) {
    let signalled = state.cancel_all().await;
    if signalled == 0 {
        debug!("No runs to drain");
        return;
    }
    info!(count = signalled, "Cancelling in-flight runs");

    let drained = tokio::time::timeout(timeout, async {
        while state.active_runs().await > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    if drained.is_err() {
        let remaining = state.active_runs().await;
        warn!(remaining, "Shutdown timeout reached with runs still active");
    }
}
