//! The driver contract: identify, describe, start a resolution, parse its result.
//!
//! A driver either resolves synchronously (CSV: a map lookup) or kicks off
//! an asynchronous call (SIP, every HTTP variant) whose completion is polled
//! by the event loop alongside the transport sockets.

use std::future::Future;
use std::pin::Pin;

use lnp_core::{Request, RequestKind, ResolvedResult, ResolverError};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What an async call handed back, before the driver has had a chance to
/// parse it. Mirrors the original completion-queue contract: a flat
/// success/body-or-error-text record, not yet driver-shaped.
#[derive(Debug, Clone)]
pub struct CallCompletion {
    pub success: bool,
    pub body_or_error: String,
}

/// The outcome of `Driver::start_resolve`.
pub enum StartResolve {
    /// The driver already has an answer (CSV) or already failed validating
    /// the request (e.g. declared-type mismatch caught earlier).
    Resolved(Result<ResolvedResult, ResolverError>),
    /// The driver submitted async work; the event loop tracks the future
    /// and, once it completes, calls `Driver::parse` on the body.
    Pending(BoxFuture<'static, CallCompletion>),
}

/// The closed set of driver kinds, used for metrics labelling and registry
/// construction. Not extensible at runtime — the registry is built from a
/// static table keyed by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    Sip,
    Thinq,
    Alcazar,
    CoureAnq,
    CnamHttp,
    Bulkvs,
    Csv,
}

impl DriverKind {
    pub fn name(self) -> &'static str {
        match self {
            DriverKind::Sip => "sip",
            DriverKind::Thinq => "thinq",
            DriverKind::Alcazar => "alcazar",
            DriverKind::CoureAnq => "coure_anq",
            DriverKind::CnamHttp => "cnam_http",
            DriverKind::Bulkvs => "bulkvs",
            DriverKind::Csv => "csv",
        }
    }

    pub fn declared_type(self) -> RequestKind {
        match self {
            DriverKind::CnamHttp => RequestKind::Cnam,
            _ => RequestKind::Tagged,
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "sip" => Some(DriverKind::Sip),
            "thinq" | "http-thinq" => Some(DriverKind::Thinq),
            "alcazar" | "http-alcazar" => Some(DriverKind::Alcazar),
            "coure_anq" | "coure-anq" | "http-coureanq" => Some(DriverKind::CoureAnq),
            "cnam_http" | "cnam" | "http-cnam" => Some(DriverKind::CnamHttp),
            "bulkvs" | "http-bulkvs" => Some(DriverKind::Bulkvs),
            "csv" => Some(DriverKind::Csv),
            _ => None,
        }
    }

    /// Legacy `o_driver_id` numbering, used when a row carries no
    /// `database_type` string (oldest flat-column shape).
    pub fn from_legacy_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(DriverKind::Sip),
            1 => Some(DriverKind::Thinq),
            2 => Some(DriverKind::Alcazar),
            3 => Some(DriverKind::CoureAnq),
            4 => Some(DriverKind::CnamHttp),
            5 => Some(DriverKind::Bulkvs),
            6 => Some(DriverKind::Csv),
            _ => None,
        }
    }
}

/// Uniform contract every driver implements.
pub trait Driver: Send + Sync {
    fn unique_id(&self) -> i32;
    fn label(&self) -> &str;
    fn kind(&self) -> DriverKind;

    fn declared_type(&self) -> RequestKind {
        self.kind().declared_type()
    }

    /// Begin resolving `request`. The request's declared type has already
    /// been checked against `declared_type()` by the caller.
    fn start_resolve(&self, request: &Request) -> StartResolve;

    /// Turn a completed async call's body into a result. Unused by drivers
    /// that only ever return `Resolved` from `start_resolve` (CSV).
    fn parse(&self, body: &str, request: &Request) -> Result<ResolvedResult, ResolverError>;
}
