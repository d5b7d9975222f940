//! thinq HTTP driver — basic-auth GET against thinq's extended LRN lookup.

use std::time::Duration;

use lnp_core::{ErrorCode, Request, ResolvedResult, ResolverError};

use crate::driver::{Driver, DriverKind, StartResolve};
use crate::http_engine::{HttpEngine, HttpRequest};

pub struct ThinqDriver {
    unique_id: i32,
    label: String,
    host: String,
    port: Option<u16>,
    username: String,
    token: String,
    timeout: Duration,
    engine: HttpEngine,
}

impl ThinqDriver {
    pub fn new(
        unique_id: i32,
        label: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        username: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            unique_id,
            label: label.into(),
            host: host.into(),
            port,
            username: username.into(),
            token: token.into(),
            timeout,
            engine: HttpEngine::new(),
        }
    }

    fn build_url(&self, number: &str) -> String {
        match self.port {
            Some(p) => format!("https://{}:{}/lrn/extended/{}?format=json", self.host, p, number),
            None => format!("https://{}/lrn/extended/{}?format=json", self.host, number),
        }
    }
}

impl Driver for ThinqDriver {
    fn unique_id(&self) -> i32 {
        self.unique_id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Thinq
    }

    fn start_resolve(&self, request: &Request) -> StartResolve {
        let number = String::from_utf8_lossy(&request.payload).into_owned();
        let url = self.build_url(&number);
        let http_req = HttpRequest::get(url, self.timeout).with_basic_auth(&self.username, &self.token);
        StartResolve::Pending(Box::pin(self.engine.make_request(http_req)))
    }

    fn parse(&self, body: &str, _request: &Request) -> Result<ResolvedResult, ResolverError> {
        let json: serde_json::Value = serde_json::from_str(body).map_err(|e| {
            ResolverError::new(ErrorCode::DriverResolvingError, format!("thinq response is not valid JSON: {e}"))
        })?;
        let lrn = json
            .get("lrn")
            .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_u64().map(|n| n.to_string())))
            .ok_or_else(|| ResolverError::new(ErrorCode::DriverResolvingError, "thinq response missing 'lrn'"))?;

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
    fn builds_url_with_port() {
        let driver = ThinqDriver::new(1, "t", "host", Some(443), "u", "tok", Duration::from_secs(1));
        assert_eq!(driver.build_url("555"), "https://host:443/lrn/extended/555?format=json");
    }

    #[test]
    fn parses_lrn_and_keeps_raw_body() {
        let driver = ThinqDriver::new(1, "t", "host", None, "u", "tok", Duration::from_secs(1));
        let req = Request { id: 1, db_id: 1, kind: lnp_core::RequestKind::Tagged, payload: b"555".to_vec() };
        let result = driver.parse(r#"{"lrn":"777"}"#, &req).unwrap();
        assert_eq!(result.local_routing_number, "777");
        assert_eq!(result.raw_data, r#"{"lrn":"777"}"#);
    }

    #[test]
    fn missing_lrn_is_an_error() {
        let driver = ThinqDriver::new(1, "t", "host", None, "u", "tok", Duration::from_secs(1));
        let req = Request { id: 1, db_id: 1, kind: lnp_core::RequestKind::Tagged, payload: b"555".to_vec() };
        assert!(driver.parse(r#"{}"#, &req).is_err());
    }
}
