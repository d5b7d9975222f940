//! The single event-loop task: multiplexes transport sockets, in-flight
//! driver calls, and the reload/shutdown signal channels.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lnp_drivers::driver::CallCompletion;
use lnp_drivers::registry::DriverRegistry;
use lnp_drivers::{MetricsRegistry, SipIdentity};
use sqlx::postgres::PgPoolOptions;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::resolver::{DispatchOutcome, ResolverCore};
use crate::transport::Transport;

pub struct EventLoopConfig {
    pub db_conn_string: String,
    pub db_connect_timeout: Duration,
}

pub async fn run(
    transport: Transport,
    resolver: Arc<ResolverCore>,
    registry: Arc<DriverRegistry>,
    sip_identity: Arc<SipIdentity>,
    metrics: MetricsRegistry,
    config: EventLoopConfig,
    mut reload_rx: broadcast::Receiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (dgram_tx, mut dgram_rx) = mpsc::channel(1024);
    let readers = transport.spawn_readers(dgram_tx);
    let mut calls: JoinSet<(u32, CallCompletion)> = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("event loop shutting down");
                break;
            }

            _ = reload_rx.recv() => {
                reload(&registry, &sip_identity, &metrics, &config).await;
            }

            Some(datagram) = dgram_rx.recv() => {
                match resolver.dispatch(&datagram.bytes, datagram.addr, datagram.socket.clone()) {
                    None => {}
                    Some(DispatchOutcome::Immediate { provisional, final_reply }) => {
                        send(&datagram.socket, &provisional, datagram.addr).await;
                        send(&datagram.socket, &final_reply, datagram.addr).await;
                    }
                    Some(DispatchOutcome::Pending { provisional, request_id, future }) => {
                        send(&datagram.socket, &provisional, datagram.addr).await;
                        calls.spawn(async move { (request_id, future.await) });
                    }
                }
            }

            Some(joined) = calls.join_next(), if !calls.is_empty() => {
                match joined {
                    Ok((request_id, completion)) => {
                        if let Some((socket, addr, reply)) = resolver.complete(request_id, completion) {
                            send(&socket, &reply, addr).await;
                        }
                    }
                    Err(e) => warn!(error = %e, "driver call task panicked"),
                }
            }
        }
    }

    for reader in readers {
        reader.abort();
    }
}

async fn send(socket: &UdpSocket, bytes: &[u8], addr: SocketAddr) {
    if let Err(e) = socket.send_to(bytes, addr).await {
        warn!(error = %e, peer = %addr, "failed to send reply");
    }
}

/// Open a short-lived connection, load the full driver set, and swap it in
/// on success. On any failure the previous registry is left untouched.
async fn reload(registry: &Arc<DriverRegistry>, sip_identity: &Arc<SipIdentity>, metrics: &MetricsRegistry, config: &EventLoopConfig) {
    let pool = match PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(config.db_connect_timeout)
        .connect(&config.db_conn_string)
        .await
    {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "reload: failed to connect to control database, keeping previous registry");
            return;
        }
    };

    match lnp_drivers::registry::load(&pool, sip_identity, metrics).await {
        Ok(new_registry) => {
            let count = new_registry.len();
            registry.swap(new_registry);
            info!(drivers = count, "driver registry reloaded");
        }
        Err(e) => {
            error!(error = %e, "reload: failed to build new driver registry, keeping previous");
        }
    }
}
