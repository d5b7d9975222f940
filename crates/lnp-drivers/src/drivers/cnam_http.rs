//! CNAM HTTP driver — a caller-name lookup whose URL is built from a
//! per-driver template, substituted against the request's JSON payload.

use std::time::Duration;

use lnp_core::{ErrorCode, Request, ResolvedResult, ResolverError};

use crate::driver::{Driver, DriverKind, StartResolve};
use crate::http_engine::{HttpEngine, HttpRequest};

use super::url_template::UrlTemplate;

pub struct CnamHttpDriver {
    unique_id: i32,
    label: String,
    template: UrlTemplate,
    timeout: Duration,
    engine: HttpEngine,
}

impl CnamHttpDriver {
    pub fn new(unique_id: i32, label: impl Into<String>, url_template: &str, timeout: Duration) -> Result<Self, ResolverError> {
        Ok(Self {
            unique_id,
            label: label.into(),
            template: UrlTemplate::parse(url_template)?,
            timeout,
            engine: HttpEngine::new(),
        })
    }
}

impl Driver for CnamHttpDriver {
    fn unique_id(&self) -> i32 {
        self.unique_id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> DriverKind {
        DriverKind::CnamHttp
    }

    fn start_resolve(&self, request: &Request) -> StartResolve {
        let payload: serde_json::Value = match serde_json::from_slice(&request.payload) {
            Ok(v) => v,
            Err(e) => {
                return StartResolve::Resolved(Err(ResolverError::new(
                    ErrorCode::InvalidRequest,
                    format!("cnam payload is not valid JSON: {e}"),
                )))
            }
        };

        let url = match self.template.render(&payload) {
            Ok(u) => u,
            Err(e) => return StartResolve::Resolved(Err(e)),
        };

        let http_req = HttpRequest::get(url, self.timeout);
        let fut = self.engine.make_request(http_req);
        StartResolve::Pending(Box::pin(fut))
    }

    fn parse(&self, body: &str, _request: &Request) -> Result<ResolvedResult, ResolverError> {
        let upstream: serde_json::Value = serde_json::from_str(body).map_err(|e| {
            ResolverError::new(
                ErrorCode::DriverResolvingError,
                format!("cnam response is not valid JSON: {e}"),
            )
        })?;
        let wrapped = serde_json::json!({ "response": upstream }).to_string();
        Ok(ResolvedResult {
            local_routing_number: String::new(),
            local_routing_tag: String::new(),
            raw_data: wrapped,
        })
    }
}
