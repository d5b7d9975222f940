//! Resolver core — glues transport, driver registry, and the async HTTP/SIP
//! completion path together. Owns the waiting-request map.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use lnp_core::{encode_error, encode_provisional, encode_success, ErrorCode, Request, RequestKind, ResolverError};
use lnp_drivers::{driver::CallCompletion, driver::StartResolve, CacheEntry, CacheWriterHandle, Driver, DriverMetricKey, DriverRegistry, MetricsRegistry};
use tokio::net::UdpSocket;
use tracing::warn;

use lnp_drivers::metrics;

/// An asynchronous driver's in-flight request: enough context to finish
/// the reply once the tracked future resolves.
struct WaitingRequest {
    kind: RequestKind,
    db_id: u8,
    payload: Vec<u8>,
    addr: SocketAddr,
    socket: Arc<UdpSocket>,
    driver: Arc<dyn Driver>,
    started_at: Instant,
}

/// What to do immediately after a datagram is decoded and dispatched.
pub enum DispatchOutcome {
    /// The driver answered synchronously (or dispatch failed before any
    /// driver ran); both replies are ready to send now.
    Immediate { provisional: Vec<u8>, final_reply: Vec<u8> },
    /// The driver submitted async work; the caller tracks `future` in its
    /// own `JoinSet` and calls `ResolverCore::complete` when it resolves.
    Pending {
        provisional: Vec<u8>,
        request_id: u32,
        future: lnp_drivers::driver::BoxFuture<'static, CallCompletion>,
    },
}

pub struct ResolverCore {
    registry: Arc<DriverRegistry>,
    metrics: MetricsRegistry,
    cache: CacheWriterHandle,
    waiting: DashMap<u32, WaitingRequest>,
}

impl ResolverCore {
    pub fn new(registry: Arc<DriverRegistry>, metrics: MetricsRegistry, cache: CacheWriterHandle) -> Self {
        Self {
            registry,
            metrics,
            cache,
            waiting: DashMap::new(),
        }
    }

    /// Decode and dispatch one datagram. Returns `None` only when the
    /// datagram was too malformed to recover even a request id (no
    /// provisional reply is possible, so nothing is sent).
    pub fn dispatch(&self, datagram: &[u8], addr: SocketAddr, socket: Arc<UdpSocket>) -> Option<DispatchOutcome> {
        match Request::decode(datagram) {
            Ok(request) => Some(self.dispatch_request(request, addr, socket)),
            Err(e) => {
                let id = e.request_id()?;
                let kind = e.kind().unwrap_or(RequestKind::Tagged);
                let provisional = encode_provisional(id);
                let final_reply = encode_error(id, kind, &e);
                Some(DispatchOutcome::Immediate { provisional, final_reply })
            }
        }
    }

    fn dispatch_request(&self, request: Request, addr: SocketAddr, socket: Arc<UdpSocket>) -> DispatchOutcome {
        let provisional = encode_provisional(request.id);
        let snapshot = self.registry.snapshot();

        let driver = match snapshot.get(request.db_id) {
            Some(d) => d,
            None => {
                let err = ResolverError::new(ErrorCode::GeneralResolvingError, "unknown database id")
                    .with_request_id(request.id)
                    .with_kind(request.kind);
                return DispatchOutcome::Immediate {
                    provisional,
                    final_reply: encode_error(request.id, request.kind, &err),
                };
            }
        };

        if driver.declared_type() != request.kind {
            let err = ResolverError::new(ErrorCode::GeneralResolvingError, "request type does not match driver")
                .with_request_id(request.id)
                .with_kind(request.kind);
            return DispatchOutcome::Immediate {
                provisional,
                final_reply: encode_error(request.id, request.kind, &err),
            };
        }

        let metric_key = DriverMetricKey { kind: driver.kind(), driver_id: driver.unique_id() };
        metrics::record_request(&self.metrics, metric_key);

        match driver.start_resolve(&request) {
            StartResolve::Resolved(Ok(result)) => {
                metrics::record_finished(&self.metrics, metric_key, 0);
                if request.kind == RequestKind::Tagged {
                    self.cache.try_enqueue(CacheEntry {
                        driver_id: driver.unique_id(),
                        query: String::from_utf8_lossy(&request.payload).into_owned(),
                        local_routing_number: result.local_routing_number.clone(),
                    });
                }
                DispatchOutcome::Immediate {
                    provisional,
                    final_reply: encode_success(request.id, request.kind, &result),
                }
            }
            StartResolve::Resolved(Err(e)) => {
                metrics::record_failure(&self.metrics, metric_key);
                DispatchOutcome::Immediate {
                    provisional,
                    final_reply: encode_error(request.id, request.kind, &e),
                }
            }
            StartResolve::Pending(future) => {
                self.waiting.insert(
                    request.id,
                    WaitingRequest {
                        kind: request.kind,
                        db_id: request.db_id,
                        payload: request.payload,
                        addr,
                        socket,
                        driver: driver.clone(),
                        started_at: Instant::now(),
                    },
                );
                DispatchOutcome::Pending { provisional, request_id: request.id, future }
            }
        }
    }

    /// Handle a tracked future's completion. Returns the socket to reply
    /// on, the client address, and the encoded reply bytes — or `None` if
    /// the waiting entry was already gone (e.g. duplicate completion).
    pub fn complete(&self, request_id: u32, completion: CallCompletion) -> Option<(Arc<UdpSocket>, SocketAddr, Vec<u8>)> {
        let (_, waiting) = match self.waiting.remove(&request_id) {
            Some(entry) => entry,
            None => {
                warn!(request_id, "completion for unknown request id, dropping");
                return None;
            }
        };

        let metric_key = DriverMetricKey { kind: waiting.driver.kind(), driver_id: waiting.driver.unique_id() };
        let elapsed_ms = waiting.started_at.elapsed().as_millis() as u64;

        let request = Request {
            id: request_id,
            db_id: waiting.db_id,
            kind: waiting.kind,
            payload: waiting.payload,
        };

        let result = if !completion.success {
            Err(ResolverError::new(ErrorCode::GeneralResolvingError, completion.body_or_error)
                .with_request_id(request_id)
                .with_kind(waiting.kind))
        } else {
            waiting.driver.parse(&completion.body_or_error, &request)
        };

        match &result {
            Ok(_) => metrics::record_finished(&self.metrics, metric_key, elapsed_ms),
            Err(_) => metrics::record_failure(&self.metrics, metric_key),
        }

        if let Ok(r) = &result {
            if waiting.kind == RequestKind::Tagged {
                self.cache.try_enqueue(CacheEntry {
                    driver_id: waiting.driver.unique_id(),
                    query: String::from_utf8_lossy(&request.payload).into_owned(),
                    local_routing_number: r.local_routing_number.clone(),
                });
            }
        }

        let reply = match result {
            Ok(r) => encode_success(request_id, waiting.kind, &r),
            Err(e) => encode_error(request_id, waiting.kind, &e),
        };

        Some((waiting.socket, waiting.addr, reply))
    }
}
