//! UDP transport — binds every configured listen endpoint and fans incoming
//! datagrams into a single channel the event loop polls alongside
//! everything else.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const RECV_BUF_SIZE: usize = 2048;

/// One received datagram, carrying the socket it arrived on so a reply can
/// be sent from the same local endpoint.
pub struct Datagram {
    pub socket: Arc<UdpSocket>,
    pub bytes: Vec<u8>,
    pub addr: SocketAddr,
}

pub struct Transport {
    sockets: Vec<Arc<UdpSocket>>,
}

impl Transport {
    /// Bind every endpoint in `endpoints`. Binding all of them is not
    /// required; at least one must succeed or startup fails.
    pub async fn bind(endpoints: &[String]) -> Result<Self> {
        let mut sockets = Vec::new();
        for endpoint in endpoints {
            match UdpSocket::bind(endpoint).await {
                Ok(socket) => {
                    info!(endpoint = %endpoint, "bound listen endpoint");
                    sockets.push(Arc::new(socket));
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "failed to bind listen endpoint");
                }
            }
        }
        if sockets.is_empty() {
            bail!("failed to bind any of the configured listen endpoints");
        }
        Ok(Self { sockets })
    }

    /// Spawn one reader task per bound socket, each forwarding datagrams
    /// into `sink`. The returned handles are the reader tasks themselves,
    /// joined by the caller on shutdown.
    pub fn spawn_readers(&self, sink: mpsc::Sender<Datagram>) -> Vec<JoinHandle<()>> {
        self.sockets
            .iter()
            .cloned()
            .map(|socket| {
                let sink = sink.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; RECV_BUF_SIZE];
                    loop {
                        match socket.recv_from(&mut buf).await {
                            Ok((len, addr)) => {
                                let datagram = Datagram {
                                    socket: socket.clone(),
                                    bytes: buf[..len].to_vec(),
                                    addr,
                                };
                                if sink.send(datagram).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "recv_from failed");
                            }
                        }
                    }
                })
            })
            .collect()
    }

    pub fn endpoint_count(&self) -> usize {
        self.sockets.len()
    }

    /// The locally bound address of each socket, in bind order. Useful
    /// when an endpoint was requested on an ephemeral port (`:0`) and the
    /// caller needs to learn which one the OS picked.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.sockets.iter().filter_map(|s| s.local_addr().ok()).collect()
    }
}
