//! OS signal handling.
//!
//! SIGINT/SIGTERM request shutdown. SIGHUP requests a config reload.

use crate::lifecycle::shutdown::Shutdown;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,
    Reload,
}

#[cfg(unix)]
async fn next_event() -> std::io::Result<SignalEvent> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| SignalEvent::Shutdown),
        _ = terminate.recv() => Ok(SignalEvent::Shutdown),
        _ = hangup.recv() => Ok(SignalEvent::Reload),
    }
}

#[cfg(not(unix))]
async fn next_event() -> std::io::Result<SignalEvent> {
    tokio::signal::ctrl_c().await.map(|_| SignalEvent::Shutdown)
}

/// Translate signals into shutdown triggers and reload requests until
/// shutdown happens.
pub async fn handle_signals(shutdown: &Shutdown, reload_tx: mpsc::UnboundedSender<()>) {
    loop {
        match next_event().await {
            Ok(SignalEvent::Shutdown) => {
                tracing::info!("Shutdown signal received");
                shutdown.trigger();
                return;
            }
            Ok(SignalEvent::Reload) => {
                tracing::info!("SIGHUP received, reloading configuration");
                let _ = reload_tx.send(());
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers, shutting down");
                shutdown.trigger();
                return;
            }
        }
    }
}
