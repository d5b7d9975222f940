//! bulkvs HTTP driver — token-authenticated GET, `name` field as LRN.

use std::time::Duration;

use lnp_core::{ErrorCode, Request, ResolvedResult, ResolverError};

use crate::driver::{Driver, DriverKind, StartResolve};
use crate::http_engine::{HttpEngine, HttpRequest};

pub struct BulkvsDriver {
    unique_id: i32,
    label: String,
    base: String,
    token: String,
    timeout: Duration,
    engine: HttpEngine,
}

impl BulkvsDriver {
    pub fn new(unique_id: i32, label: impl Into<String>, base: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            unique_id,
            label: label.into(),
            base: base.into(),
            token: token.into(),
            timeout,
            engine: HttpEngine::new(),
        }
    }

    fn build_url(&self, number: &str) -> String {
        format!("{}/?id={}&did={}&format=json", self.base, self.token, number)
    }
}

impl Driver for BulkvsDriver {
    fn unique_id(&self) -> i32 {
        self.unique_id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Bulkvs
    }

    fn start_resolve(&self, request: &Request) -> StartResolve {
        let number = String::from_utf8_lossy(&request.payload).into_owned();
        let http_req = HttpRequest::get(self.build_url(&number), self.timeout);
        StartResolve::Pending(Box::pin(self.engine.make_request(http_req)))
    }

    fn parse(&self, body: &str, _request: &Request) -> Result<ResolvedResult, ResolverError> {
        let json: serde_json::Value = serde_json::from_str(body).map_err(|e| {
            ResolverError::new(ErrorCode::DriverResolvingError, format!("bulkvs response is not valid JSON: {e}"))
        })?;
        let name = json
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ResolverError::new(ErrorCode::DriverResolvingError, "bulkvs response missing 'name'"))?;

        Ok(ResolvedResult {
            local_routing_number: name.to_string(),
            local_routing_tag: String::new(),
            raw_data: body.to_string(),
        })
    }
}
