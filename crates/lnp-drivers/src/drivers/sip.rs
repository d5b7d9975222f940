//! SIP driver — resolves by sending an INVITE and reading the Contact
//! header off a 301/302 response.
//!
//! Modelled as an ordinary async call dispatched through the same
//! "submit work, resume on completion" pipeline as the HTTP drivers: no
//! stack-wide mutex, no dedicated OS thread. Concurrent SIP resolutions
//! are just concurrent tasks on the shared event loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lnp_core::{ErrorCode, Request, ResolvedResult, ResolverError};
use tokio::net::UdpSocket;

use crate::driver::{Driver, DriverKind, StartResolve};

/// Process-global SIP identity, set once from the `[sip]` config section
/// and shared across every SIP driver instance.
#[derive(Debug, Clone)]
pub struct SipIdentity {
    pub from_name: String,
    pub from_uri: String,
    pub contact_user: String,
}

pub struct SipDriver {
    unique_id: i32,
    label: String,
    host: String,
    port: u16,
    timeout: Duration,
    identity: Arc<SipIdentity>,
}

impl SipDriver {
    pub fn new(unique_id: i32, label: impl Into<String>, host: impl Into<String>, port: u16, timeout: Duration, identity: Arc<SipIdentity>) -> Self {
        Self {
            unique_id,
            label: label.into(),
            host: host.into(),
            port: if port == 0 { 5060 } else { port },
            timeout,
            identity,
        }
    }
}

/// Build a minimal INVITE for `number` addressed to `host:port`.
fn build_invite(number: &str, host: &str, port: u16, identity: &SipIdentity, call_id: u32) -> String {
    format!(
        "INVITE sip:{number}@{host}:{port} SIP/2.0\r\n\
         From: \"{from_name}\" <{from_uri}>;tag={call_id}\r\n\
         To: <sip:{number}@{host}:{port}>\r\n\
         Contact: <sip:{contact_user}@{host}:{port}>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: 1 INVITE\r\n\
         Content-Length: 0\r\n\r\n",
        from_name = identity.from_name,
        from_uri = identity.from_uri,
        contact_user = identity.contact_user,
    )
}

/// Extract the Contact header's URI user-part from a SIP response.
fn extract_contact_user(response: &str) -> Option<String> {
    let line = response
        .lines()
        .find(|l| l.to_ascii_lowercase().starts_with("contact:"))?;
    let start = line.find("sip:")? + "sip:".len();
    let rest = &line[start..];
    let end = rest.find('@').unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

fn status_code(response: &str) -> Option<u32> {
    let first_line = response.lines().next()?;
    first_line.split_whitespace().nth(1)?.parse().ok()
}

/// Split a Contact user-part like `yeti-sip;rn=4681665911` into
/// `(local_routing_number, raw_user_part)`.
fn parse_user_part(user_part: &str) -> Result<(String, String), ResolverError> {
    if !user_part.contains(';') {
        return Ok((user_part.to_string(), user_part.to_string()));
    }
    for segment in user_part.split(';') {
        if let Some((key, value)) = segment.split_once('=') {
            if key == "rn" {
                return Ok((value.to_string(), user_part.to_string()));
            }
        }
    }
    Err(ResolverError::new(
        ErrorCode::DriverResolvingError,
        "sip contact user-part has no 'rn' parameter",
    ))
}

impl Driver for SipDriver {
    fn unique_id(&self) -> i32 {
        self.unique_id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Sip
    }

    fn start_resolve(&self, request: &Request) -> StartResolve {
        let number = String::from_utf8_lossy(&request.payload).into_owned();
        let host = self.host.clone();
        let port = self.port;
        let timeout = self.timeout;
        let identity = self.identity.clone();
        let call_id = request.id;

        let fut = async move {
            let outcome = tokio::time::timeout(timeout, send_invite(&number, &host, port, &identity, call_id)).await;
            match outcome {
                Ok(Ok(contact_user)) => crate::driver::CallCompletion {
                    success: true,
                    body_or_error: contact_user,
                },
                Ok(Err(e)) => crate::driver::CallCompletion {
                    success: false,
                    body_or_error: e,
                },
                Err(_) => crate::driver::CallCompletion {
                    success: false,
                    body_or_error: "sip transaction timed out".to_string(),
                },
            }
        };

        StartResolve::Pending(Box::pin(fut))
    }

    fn parse(&self, body: &str, _request: &Request) -> Result<ResolvedResult, ResolverError> {
        let (lrn, raw) = parse_user_part(body)?;
        Ok(ResolvedResult {
            local_routing_number: lrn,
            local_routing_tag: String::new(),
            raw_data: raw,
        })
    }
}

async fn send_invite(number: &str, host: &str, port: u16, identity: &SipIdentity, call_id: u32) -> Result<String, String> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|e| format!("failed to bind sip socket: {e}"))?;
    let target: SocketAddr = format!("{host}:{port}")
        .parse()
        .or_else(|_| resolve_first(host, port))
        .map_err(|e: String| e)?;

    let invite = build_invite(number, host, port, identity, call_id);
    socket
        .send_to(invite.as_bytes(), target)
        .await
        .map_err(|e| format!("failed to send INVITE: {e}"))?;

    let mut buf = vec![0u8; 2048];
    let (len, _) = socket.recv_from(&mut buf).await.map_err(|e| format!("failed to read sip response: {e}"))?;
    let response = String::from_utf8_lossy(&buf[..len]).into_owned();

    match status_code(&response) {
        Some(301) | Some(302) => {
            extract_contact_user(&response).ok_or_else(|| "sip response missing Contact header".to_string())
        }
        Some(code) => Err(format!("unexpected sip final response {code}")),
        None => Err("unparsable sip response".to_string()),
    }
}

fn resolve_first(host: &str, port: u16) -> Result<SocketAddr, String> {
    use std::net::ToSocketAddrs;
    (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("failed to resolve sip host {host}: {e}"))?
        .next()
        .ok_or_else(|| format!("no address found for sip host {host}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> SipIdentity {
        SipIdentity {
            from_name: "resolver".to_string(),
            from_uri: "sip:resolver@example.org".to_string(),
            contact_user: "resolver".to_string(),
        }
    }

    #[test]
    fn bare_user_part_is_used_as_lrn() {
        let (lrn, raw) = parse_user_part("4681665911").unwrap();
        assert_eq!(lrn, "4681665911");
        assert_eq!(raw, "4681665911");
    }

    #[test]
    fn tagged_user_part_extracts_rn() {
        let (lrn, raw) = parse_user_part("yeti-sip;rn=4681665911").unwrap();
        assert_eq!(lrn, "4681665911");
        assert_eq!(raw, "yeti-sip;rn=4681665911");
    }

    #[test]
    fn missing_rn_is_an_error() {
        assert!(parse_user_part("yeti-sip;transport=UDP").is_err());
    }

    #[test]
    fn extracts_contact_from_full_response() {
        let response = "SIP/2.0 302 Moved Temporarily\r\nContact: <sip:yeti-sip;rn=4681665911@h:5060;transport=UDP>\r\n\r\n";
        let user = extract_contact_user(response).unwrap();
        assert_eq!(user, "yeti-sip;rn=4681665911");
    }

    #[test]
    fn non_redirect_status_is_rejected() {
        assert_eq!(status_code("SIP/2.0 404 Not Found\r\n\r\n"), Some(404));
    }

    #[test]
    fn invite_carries_identity_fields() {
        let invite = build_invite("555", "host", 5060, &identity(), 42);
        assert!(invite.contains("resolver@example.org"));
        assert!(invite.contains("Call-ID: 42"));
    }
}
