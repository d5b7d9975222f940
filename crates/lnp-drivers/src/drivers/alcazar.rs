//! Alcazar HTTP driver — unauthenticated GET, key passed as a query param.

use std::time::Duration;

use lnp_core::{ErrorCode, Request, ResolvedResult, ResolverError};

use crate::driver::{Driver, DriverKind, StartResolve};
use crate::http_engine::{HttpEngine, HttpRequest};

pub struct AlcazarDriver {
    unique_id: i32,
    label: String,
    host: String,
    port: Option<u16>,
    key: String,
    timeout: Duration,
    engine: HttpEngine,
}

impl AlcazarDriver {
    pub fn new(
        unique_id: i32,
        label: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            unique_id,
            label: label.into(),
            host: host.into(),
            port,
            key: key.into(),
            timeout,
            engine: HttpEngine::new(),
        }
    }

    fn build_url(&self, number: &str) -> String {
        let base = match self.port {
            Some(p) => format!("http://{}:{}", self.host, p),
            None => format!("http://{}", self.host),
        };
        format!("{base}/api/2.2/lrn?extended=true&output=json&key={}&tn={}", self.key, number)
    }
}

impl Driver for AlcazarDriver {
    fn unique_id(&self) -> i32 {
        self.unique_id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Alcazar
    }

    fn start_resolve(&self, request: &Request) -> StartResolve {
        let number = String::from_utf8_lossy(&request.payload).into_owned();
        let http_req = HttpRequest::get(self.build_url(&number), self.timeout);
        StartResolve::Pending(Box::pin(self.engine.make_request(http_req)))
    }

    fn parse(&self, body: &str, _request: &Request) -> Result<ResolvedResult, ResolverError> {
        let json: serde_json::Value = serde_json::from_str(body).map_err(|e| {
            ResolverError::new(ErrorCode::DriverResolvingError, format!("alcazar response is not valid JSON: {e}"))
        })?;
        let lrn = json
            .get("LRN")
            .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_u64().map(|n| n.to_string())))
            .ok_or_else(|| ResolverError::new(ErrorCode::DriverResolvingError, "alcazar response missing 'LRN'"))?;

        Ok(ResolvedResult {
            local_routing_number: lrn.trim_matches('"').to_string(),
            local_routing_tag: String::new(),
            raw_data: body.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_url() {
        let driver = AlcazarDriver::new(1, "a", "host", None, "k", Duration::from_secs(1));
        assert_eq!(driver.build_url("555"), "http://host/api/2.2/lrn?extended=true&output=json&key=k&tn=555");
    }

    #[test]
    fn parses_lrn() {
        let driver = AlcazarDriver::new(1, "a", "host", None, "k", Duration::from_secs(1));
        let req = Request { id: 1, db_id: 1, kind: lnp_core::RequestKind::Tagged, payload: b"555".to_vec() };
        let result = driver.parse(r#"{"LRN":"888"}"#, &req).unwrap();
        assert_eq!(result.local_routing_number, "888");
    }
}
