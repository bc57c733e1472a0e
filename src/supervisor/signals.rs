use crate::error::Result;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info};

/// Cancellation channel flipped to `true` on the first SIGINT or SIGTERM
///
/// Later signals are logged and ignored so shutdown is never re-entered.
pub fn shutdown_signal() -> Result<watch::Receiver<bool>> {
    let (tx, rx) = watch::channel(false);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigint.recv() => "SIGINT",
                };

                if *tx.borrow() {
                    debug!("Received {} while shutting down, ignoring", name);
                } else {
                    info!("Received {}, shutting down", name);
                    let _ = tx.send(true);
                }
            }
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !*tx.borrow() {
                    info!("Received Ctrl-C, shutting down");
                    let _ = tx.send(true);
                }
            }
        });
    }

    Ok(rx)
}

/// Resolves once `cancel` is true. Never resolves if the sender is gone.
pub async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|&flag| flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Sleep for `duration` unless cancelled first; returns false on cancellation
pub async fn sleep_or_cancel(cancel: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *cancel.borrow() {
        return false;
    }

    tokio::select! {
        _ = sleep(duration) => true,
        _ = cancelled(cancel) => false,
    }
}
