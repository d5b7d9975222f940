//! coure-anq HTTP driver — a GSM port-status lookup whose reply encodes a
//! porting verdict plus an operator code, translated to a tag via a
//! driver-local map.

use std::collections::HashMap;
use std::time::Duration;

use lnp_core::{ErrorCode, Request, ResolvedResult, ResolverError};

use crate::driver::{Driver, DriverKind, StartResolve};
use crate::http_engine::{HttpEngine, HttpRequest};

pub struct CoureAnqDriver {
    unique_id: i32,
    label: String,
    base_url: String,
    username: String,
    password: String,
    country_code: String,
    operator_map: HashMap<String, String>,
    timeout: Duration,
    engine: HttpEngine,
}

impl CoureAnqDriver {
    /// `operator_map` must carry a `"default"` entry, used when the
    /// upstream operator key has no specific mapping.
    pub fn new(
        unique_id: i32,
        label: impl Into<String>,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        country_code: impl Into<String>,
        operator_map: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, ResolverError> {
        if !operator_map.contains_key("default") {
            return Err(ResolverError::new(
                ErrorCode::GeneralResolvingError,
                "coure-anq operator map missing required 'default' entry",
            ));
        }
        Ok(Self {
            unique_id,
            label: label.into(),
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            country_code: country_code.into(),
            operator_map,
            timeout,
            engine: HttpEngine::new(),
        })
    }

    fn build_url(&self, number: &str) -> String {
        format!(
            "{}/api/json/LookUpNumber/GsmPortStatus?username={}&password={}&ServiceType=4&country={}&numbersToLookUp={}",
            self.base_url, self.username, self.password, self.country_code, number
        )
    }

    fn tag_for_operator(&self, operator: &str) -> String {
        self.operator_map
            .get(operator)
            .or_else(|| self.operator_map.get("default"))
            .cloned()
            .unwrap_or_default()
    }
}

impl Driver for CoureAnqDriver {
    fn unique_id(&self) -> i32 {
        self.unique_id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> DriverKind {
        DriverKind::CoureAnq
    }

    fn start_resolve(&self, request: &Request) -> StartResolve {
        let number = String::from_utf8_lossy(&request.payload).into_owned();
        let http_req = HttpRequest::get(self.build_url(&number), self.timeout);
        StartResolve::Pending(Box::pin(self.engine.make_request(http_req)))
    }

    fn parse(&self, body: &str, request: &Request) -> Result<ResolvedResult, ResolverError> {
        let json: serde_json::Value = serde_json::from_str(body).map_err(|e| {
            ResolverError::new(ErrorCode::DriverResolvingError, format!("coure-anq response is not valid JSON: {e}"))
        })?;

        let entry = json
            .get("Result")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .ok_or_else(|| ResolverError::new(ErrorCode::DriverResolvingError, "coure-anq response missing non-empty 'Result'"))?;

        let is_ported = entry
            .get("IsPorted")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ResolverError::new(ErrorCode::DriverResolvingError, "coure-anq entry missing 'IsPorted'"))?;

        match is_ported {
            1 => {
                let number = entry
                    .get("Number")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ResolverError::new(ErrorCode::DriverResolvingError, "coure-anq entry missing 'Number'"))?;
                let operator = entry.get("TheOperator").and_then(|v| v.as_str()).unwrap_or("");
                Ok(ResolvedResult {
                    local_routing_number: number.to_string(),
                    local_routing_tag: self.tag_for_operator(operator),
                    raw_data: body.to_string(),
                })
            }
            0 | 2 => Ok(ResolvedResult {
                local_routing_number: String::from_utf8_lossy(&request.payload).into_owned(),
                local_routing_tag: String::new(),
                raw_data: body.to_string(),
            }),
            other => Err(ResolverError::new(
                ErrorCode::DriverResolvingError,
                format!("coure-anq returned unexpected IsPorted value {other}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> CoureAnqDriver {
        let mut map = HashMap::new();
        map.insert("default".to_string(), "0".to_string());
        map.insert("42".to_string(), "tmobile".to_string());
        CoureAnqDriver::new(1, "c", "http://x", "u", "p", "1", map, Duration::from_secs(1)).unwrap()
    }

    fn req(payload: &str) -> Request {
        Request { id: 1, db_id: 1, kind: lnp_core::RequestKind::Tagged, payload: payload.as_bytes().to_vec() }
    }

    #[test]
    fn ported_maps_operator_to_tag() {
        let d = driver();
        let body = r#"{"Result":[{"IsPorted":1,"Number":"999","TheOperator":"42"}]}"#;
        let result = d.parse(body, &req("555")).unwrap();
        assert_eq!(result.local_routing_number, "999");
        assert_eq!(result.local_routing_tag, "tmobile");
    }

    #[test]
    fn unknown_operator_uses_default() {
        let d = driver();
        let body = r#"{"Result":[{"IsPorted":1,"Number":"999","TheOperator":"zz"}]}"#;
        let result = d.parse(body, &req("555")).unwrap();
        assert_eq!(result.local_routing_tag, "0");
    }

    #[test]
    fn not_ported_echoes_original_payload() {
        let d = driver();
        let body = r#"{"Result":[{"IsPorted":0}]}"#;
        let result = d.parse(body, &req("555")).unwrap();
        assert_eq!(result.local_routing_number, "555");
        assert_eq!(result.local_routing_tag, "");
    }

    #[test]
    fn invalid_value_or_missing_field_is_rejected() {
        let d = driver();
        let body = r#"{"Result":[{"IsPorted":9}]}"#;
        assert!(d.parse(body, &req("555")).is_err());
    }

    #[test]
    fn missing_default_entry_is_rejected_at_construction() {
        let map = HashMap::new();
        let err = CoureAnqDriver::new(1, "c", "http://x", "u", "p", "1", map, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::GeneralResolvingError);
    }
}
