use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Install handlers for SIGTERM, SIGINT, and SIGHUP.
///
/// SIGTERM and SIGINT cancel the given token instead of terminating the
/// process; subsystems monitor the token and drain gracefully. SIGHUP is
/// ignored.
pub fn install_signal_handlers(token: CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    token.cancel();
                    break;
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    token.cancel();
                    break;
                }
                _ = sighup.recv() => {
                    tracing::debug!("Ignoring SIGHUP");
                }
            }
        }
    });

    Ok(())
}
