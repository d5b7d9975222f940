//! Signal handling — SIGHUP reloads the driver registry, SIGTERM/SIGINT
//! shut the daemon down in an orderly way. Both are translated into
//! broadcast channels so any number of tasks can observe them.

use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tracing::info;

pub struct SignalChannels {
    pub reload: broadcast::Receiver<()>,
    pub shutdown: broadcast::Receiver<()>,
}

/// Spawn the signal-listening task and return receivers for callers that
/// need to react to reload/shutdown. The task runs for the life of the
/// process; it is not expected to exit before shutdown fires.
pub fn spawn() -> Result<SignalChannels> {
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let (reload_tx, reload_rx) = broadcast::channel(4);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    info!("received SIGHUP, reloading driver registry");
                    let _ = reload_tx.send(());
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    let _ = shutdown_tx.send(());
                    return;
                }
                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                    let _ = shutdown_tx.send(());
                    return;
                }
            }
        }
    });

    Ok(SignalChannels { reload: reload_rx, shutdown: shutdown_rx })
}
