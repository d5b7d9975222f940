//! LNP resolver wire format — request and reply PDUs.
//!
//! All integers are little-endian. A request is either `Tagged` (an LNP
//! lookup keyed by a bare phone number) or `Cnam` (a richer JSON-shaped
//! query). Both share a 6-byte prefix:
//!
//! ```text
//! req_id:u32 db_id:u8 type:u8
//! ```
//!
//! Tagged request:  `prefix number_len:u8 number:bytes[number_len]`
//! Cnam request:    `prefix payload_len:u32 payload:bytes[payload_len]`
//!
//! Tagged success reply: `req_id:u32 code:u8 data_len:u8 lrn_len:u8 lrn:bytes[lrn_len] tag:bytes[data_len-lrn_len]`
//! Tagged error reply:   `req_id:u32 code:u8 desc_len:u8 desc:bytes[desc_len]`
//! Cnam reply (success or error): `req_id:u32 body_len:u32 body:bytes[body_len]`
//!
//! A provisional reply is sent before resolution begins and is just the
//! 4-byte request id, so callers can tell "not received" from "in progress".

use crate::error::{ErrorCode, ResolverError};

const TAGGED_REQUEST_TYPE: u8 = 0;
const CNAM_REQUEST_TYPE: u8 = 1;

const COMMON_PREFIX_LEN: usize = 6;
const TAGGED_REQUEST_HDR_LEN: usize = 7;
const CNAM_REQUEST_HDR_LEN: usize = 10;
const TAGGED_ERROR_HDR_LEN: usize = 6;
const CNAM_REPLY_HDR_LEN: usize = 8;

/// The two request families the wire format carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Tagged,
    Cnam,
}

impl RequestKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            TAGGED_REQUEST_TYPE => Some(RequestKind::Tagged),
            CNAM_REQUEST_TYPE => Some(RequestKind::Cnam),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            RequestKind::Tagged => TAGGED_REQUEST_TYPE,
            RequestKind::Cnam => CNAM_REQUEST_TYPE,
        }
    }
}

/// A decoded request PDU.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: u32,
    pub db_id: u8,
    pub kind: RequestKind,
    pub payload: Vec<u8>,
}

impl Request {
    /// Decode a datagram into a request. On any malformed-length error the
    /// returned `ResolverError` carries a request id that is usable for the
    /// provisional reply whenever the first 4 bytes were present.
    pub fn decode(datagram: &[u8]) -> Result<Request, ResolverError> {
        if datagram.len() < COMMON_PREFIX_LEN {
            return Err(ResolverError::new(
                ErrorCode::InvalidRequest,
                "request too small",
            ));
        }

        let id = u32::from_le_bytes(datagram[0..4].try_into().unwrap());
        let db_id = datagram[4];
        let type_byte = datagram[5];

        let kind = match RequestKind::from_byte(type_byte) {
            Some(k) => k,
            None => {
                return Err(ResolverError::new(ErrorCode::InvalidRequest, "unknown request type")
                    .with_request_id(id));
            }
        };

        let (data_offset, data_len) = match kind {
            RequestKind::Tagged => {
                if datagram.len() < TAGGED_REQUEST_HDR_LEN {
                    return Err(ResolverError::new(ErrorCode::InvalidRequest, "request too small")
                        .with_request_id(id));
                }
                (TAGGED_REQUEST_HDR_LEN, datagram[6] as usize)
            }
            RequestKind::Cnam => {
                if datagram.len() < CNAM_REQUEST_HDR_LEN {
                    return Err(ResolverError::new(ErrorCode::InvalidRequest, "request too small")
                        .with_request_id(id));
                }
                let len = u32::from_le_bytes(datagram[6..10].try_into().unwrap()) as usize;
                (CNAM_REQUEST_HDR_LEN, len)
            }
        };

        if data_offset.saturating_add(data_len) > datagram.len() {
            return Err(ResolverError::new(ErrorCode::InvalidRequest, "malformed request")
                .with_request_id(id)
                .with_kind(kind));
        }

        Ok(Request {
            id,
            db_id,
            kind,
            payload: datagram[data_offset..data_offset + data_len].to_vec(),
        })
    }
}

/// A successfully resolved result, ready to be encoded into a reply.
#[derive(Debug, Clone, Default)]
pub struct ResolvedResult {
    pub local_routing_number: String,
    pub local_routing_tag: String,
    pub raw_data: String,
}

/// Encode the 4-byte provisional reply (just the echoed request id).
pub fn encode_provisional(request_id: u32) -> Vec<u8> {
    request_id.to_le_bytes().to_vec()
}

/// Encode a tagged lookup request: `prefix number_len:u8 number:bytes`.
pub fn encode_tagged_request(id: u32, db_id: u8, number: &str) -> Vec<u8> {
    let number = number.as_bytes();
    let mut out = Vec::with_capacity(TAGGED_REQUEST_HDR_LEN + number.len());
    out.extend_from_slice(&id.to_le_bytes());
    out.push(db_id);
    out.push(TAGGED_REQUEST_TYPE);
    out.push(number.len() as u8);
    out.extend_from_slice(number);
    out
}

/// Encode a cnam lookup request: `prefix payload_len:u32 payload:bytes`.
pub fn encode_cnam_request(id: u32, db_id: u8, payload: &str) -> Vec<u8> {
    let payload = payload.as_bytes();
    let mut out = Vec::with_capacity(CNAM_REQUEST_HDR_LEN + payload.len());
    out.extend_from_slice(&id.to_le_bytes());
    out.push(db_id);
    out.push(CNAM_REQUEST_TYPE);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// A decoded final reply, shaped per `kind`.
#[derive(Debug, Clone)]
pub enum Reply {
    TaggedSuccess { local_routing_number: String, local_routing_tag: String },
    TaggedError { code: u8, description: String },
    Cnam { body: String },
}

/// Decode a final (non-provisional) reply datagram. `kind` must match the
/// request that produced it, since tagged and cnam replies are not
/// self-describing on the wire.
pub fn decode_reply(datagram: &[u8], kind: RequestKind) -> Option<(u32, Reply)> {
    if datagram.len() < 4 {
        return None;
    }
    let id = u32::from_le_bytes(datagram[0..4].try_into().unwrap());

    match kind {
        RequestKind::Tagged => {
            if datagram.len() < TAGGED_ERROR_HDR_LEN {
                return None;
            }
            let code = datagram[4];
            if code == ErrorCode::NoError.as_byte() {
                if datagram.len() < TAGGED_REQUEST_HDR_LEN {
                    return None;
                }
                let data_len = datagram[5] as usize;
                let lrn_len = datagram[6] as usize;
                if lrn_len > data_len || TAGGED_REQUEST_HDR_LEN + data_len > datagram.len() {
                    return None;
                }
                let lrn = &datagram[TAGGED_REQUEST_HDR_LEN..TAGGED_REQUEST_HDR_LEN + lrn_len];
                let tag = &datagram[TAGGED_REQUEST_HDR_LEN + lrn_len..TAGGED_REQUEST_HDR_LEN + data_len];
                Some((
                    id,
                    Reply::TaggedSuccess {
                        local_routing_number: String::from_utf8_lossy(lrn).into_owned(),
                        local_routing_tag: String::from_utf8_lossy(tag).into_owned(),
                    },
                ))
            } else {
                let desc_len = datagram[5] as usize;
                if TAGGED_ERROR_HDR_LEN + desc_len > datagram.len() {
                    return None;
                }
                let desc = &datagram[TAGGED_ERROR_HDR_LEN..TAGGED_ERROR_HDR_LEN + desc_len];
                Some((id, Reply::TaggedError { code, description: String::from_utf8_lossy(desc).into_owned() }))
            }
        }
        RequestKind::Cnam => {
            if datagram.len() < CNAM_REPLY_HDR_LEN {
                return None;
            }
            let body_len = u32::from_le_bytes(datagram[4..8].try_into().unwrap()) as usize;
            if CNAM_REPLY_HDR_LEN + body_len > datagram.len() {
                return None;
            }
            let body = &datagram[CNAM_REPLY_HDR_LEN..CNAM_REPLY_HDR_LEN + body_len];
            Some((id, Reply::Cnam { body: String::from_utf8_lossy(body).into_owned() }))
        }
    }
}

/// Encode a final success reply matching the request's kind.
pub fn encode_success(request_id: u32, kind: RequestKind, result: &ResolvedResult) -> Vec<u8> {
    match kind {
        RequestKind::Tagged => encode_tagged_success(request_id, result),
        RequestKind::Cnam => encode_cnam_success(request_id, result),
    }
}

/// Encode a final error reply matching the request's kind.
pub fn encode_error(request_id: u32, kind: RequestKind, err: &ResolverError) -> Vec<u8> {
    match kind {
        RequestKind::Tagged => encode_tagged_error(request_id, err.code(), err.description()),
        RequestKind::Cnam => encode_cnam_error(request_id, err.code(), err.description()),
    }
}

fn encode_tagged_success(request_id: u32, result: &ResolvedResult) -> Vec<u8> {
    let lrn = result.local_routing_number.as_bytes();
    let tag = result.local_routing_tag.as_bytes();
    let data_len = lrn.len() + tag.len();

    let mut out = Vec::with_capacity(TAGGED_REQUEST_HDR_LEN - 1 + data_len);
    out.extend_from_slice(&request_id.to_le_bytes());
    out.push(ErrorCode::NoError.as_byte());
    out.push(data_len as u8);
    out.push(lrn.len() as u8);
    out.extend_from_slice(lrn);
    out.extend_from_slice(tag);
    out
}

fn encode_tagged_error(request_id: u32, code: ErrorCode, description: &str) -> Vec<u8> {
    let desc = description.as_bytes();
    let mut out = Vec::with_capacity(TAGGED_ERROR_HDR_LEN + desc.len());
    out.extend_from_slice(&request_id.to_le_bytes());
    out.push(code.as_byte());
    out.push(desc.len() as u8);
    out.extend_from_slice(desc);
    out
}

fn encode_cnam_success(request_id: u32, result: &ResolvedResult) -> Vec<u8> {
    encode_cnam_body(request_id, result.raw_data.as_bytes())
}

fn encode_cnam_error(request_id: u32, code: ErrorCode, description: &str) -> Vec<u8> {
    let body = serde_json::json!({
        "error": { "code": code.as_byte(), "reason": description }
    })
    .to_string();
    encode_cnam_body(request_id, body.as_bytes())
}

fn encode_cnam_body(request_id: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(CNAM_REPLY_HDR_LEN + body.len());
    out.extend_from_slice(&request_id.to_le_bytes());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged_request(id: u32, db_id: u8, number: &str) -> Vec<u8> {
        encode_tagged_request(id, db_id, number)
    }

    fn cnam_request(id: u32, db_id: u8, payload: &str) -> Vec<u8> {
        encode_cnam_request(id, db_id, payload)
    }

    #[test]
    fn decodes_tagged_request() {
        let raw = tagged_request(3, 7, "555");
        let req = Request::decode(&raw).unwrap();
        assert_eq!(req.id, 3);
        assert_eq!(req.db_id, 7);
        assert_eq!(req.kind, RequestKind::Tagged);
        assert_eq!(req.payload, b"555");
    }

    #[test]
    fn decodes_cnam_request() {
        let raw = cnam_request(9, 2, r#"{"num":"42"}"#);
        let req = Request::decode(&raw).unwrap();
        assert_eq!(req.id, 9);
        assert_eq!(req.kind, RequestKind::Cnam);
        assert_eq!(req.payload, br#"{"num":"42"}"#);
    }

    #[test]
    fn scenario_unknown_db_id() {
        let mut raw = vec![1, 0, 0, 0, 0xFF, 0, 3];
        raw.extend_from_slice(b"123");
        let req = Request::decode(&raw).unwrap();
        assert_eq!(req.db_id, 0xFF);

        let provisional = encode_provisional(req.id);
        assert_eq!(provisional, vec![1, 0, 0, 0]);

        let err = ResolverError::new(ErrorCode::GeneralResolvingError, "unknown database id");
        let reply = encode_error(req.id, req.kind, &err);
        let mut expected = vec![1, 0, 0, 0, 0x15, 0x13];
        expected.extend_from_slice(b"unknown database id");
        assert_eq!(reply, expected);
    }

    #[test]
    fn scenario_malformed_tagged_request() {
        let raw: [u8; 9] = [0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x05, 0x41, 0x42];
        let err = Request::decode(&raw).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert_eq!(err.request_id(), Some(2));

        let reply = encode_error(2, RequestKind::Tagged, &err);
        let mut expected = vec![0x02, 0x00, 0x00, 0x00, 0x0B, 0x11];
        expected.extend_from_slice(b"malformed request");
        assert_eq!(reply, expected);
    }

    #[test]
    fn scenario_csv_hit() {
        let raw = tagged_request(3, 7, "555");
        let req = Request::decode(&raw).unwrap();
        let result = ResolvedResult {
            local_routing_number: "777".into(),
            local_routing_tag: "tag1".into(),
            raw_data: String::new(),
        };
        let reply = encode_success(req.id, req.kind, &result);
        let mut expected = vec![0x03, 0x00, 0x00, 0x00, 0x00, 0x07, 0x03];
        expected.extend_from_slice(b"777");
        expected.extend_from_slice(b"tag1");
        assert_eq!(reply, expected);
    }

    #[test]
    fn scenario_csv_miss() {
        let raw = tagged_request(3, 7, "999");
        let req = Request::decode(&raw).unwrap();
        let result = ResolvedResult {
            local_routing_number: "999".into(),
            local_routing_tag: String::new(),
            raw_data: String::new(),
        };
        let reply = encode_success(req.id, req.kind, &result);
        let mut expected = vec![0x03, 0x00, 0x00, 0x00, 0x00, 0x03, 0x03];
        expected.extend_from_slice(b"999");
        assert_eq!(reply, expected);
    }

    #[test]
    fn scenario_cnam_success() {
        let result = ResolvedResult {
            raw_data: r#"{"response":{"x":1}}"#.into(),
            ..Default::default()
        };
        let reply = encode_success(5, RequestKind::Cnam, &result);
        assert_eq!(&reply[0..4], &5u32.to_le_bytes());
        let body_len = u32::from_le_bytes(reply[4..8].try_into().unwrap()) as usize;
        assert_eq!(body_len, result.raw_data.len());
        assert_eq!(&reply[8..], result.raw_data.as_bytes());
    }

    #[test]
    fn unknown_request_type_forces_tagged_error_shape() {
        let raw = [9u8, 0, 0, 0, 1, 0xAB];
        let err = Request::decode(&raw).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert_eq!(err.request_id(), Some(9));
    }

    #[test]
    fn decodes_tagged_success_reply() {
        let result = ResolvedResult {
            local_routing_number: "777".into(),
            local_routing_tag: "tag1".into(),
            raw_data: String::new(),
        };
        let reply = encode_success(3, RequestKind::Tagged, &result);
        let (id, decoded) = decode_reply(&reply, RequestKind::Tagged).unwrap();
        assert_eq!(id, 3);
        match decoded {
            Reply::TaggedSuccess { local_routing_number, local_routing_tag } => {
                assert_eq!(local_routing_number, "777");
                assert_eq!(local_routing_tag, "tag1");
            }
            other => panic!("expected tagged success, got {other:?}"),
        }
    }

    #[test]
    fn decodes_tagged_error_reply() {
        let err = ResolverError::new(ErrorCode::GeneralResolvingError, "unknown database id");
        let reply = encode_error(1, RequestKind::Tagged, &err);
        let (id, decoded) = decode_reply(&reply, RequestKind::Tagged).unwrap();
        assert_eq!(id, 1);
        match decoded {
            Reply::TaggedError { code, description } => {
                assert_eq!(code, ErrorCode::GeneralResolvingError.as_byte());
                assert_eq!(description, "unknown database id");
            }
            other => panic!("expected tagged error, got {other:?}"),
        }
    }

    #[test]
    fn decodes_cnam_reply() {
        let result = ResolvedResult {
            raw_data: r#"{"response":{"x":1}}"#.into(),
            ..Default::default()
        };
        let reply = encode_success(5, RequestKind::Cnam, &result);
        let (id, decoded) = decode_reply(&reply, RequestKind::Cnam).unwrap();
        assert_eq!(id, 5);
        match decoded {
            Reply::Cnam { body } => assert_eq!(body, r#"{"response":{"x":1}}"#),
            other => panic!("expected cnam reply, got {other:?}"),
        }
    }

    proptest::proptest! {
        #[test]
        fn tagged_roundtrip(id: u32, db_id: u8, number in "[a-zA-Z0-9]{0,200}") {
            let raw = tagged_request(id, db_id, &number);
            let req = Request::decode(&raw).unwrap();
            proptest::prop_assert_eq!(req.id, id);
            proptest::prop_assert_eq!(req.db_id, db_id);
            proptest::prop_assert_eq!(req.payload, number.as_bytes().to_vec());
        }

        #[test]
        fn cnam_roundtrip(id: u32, db_id: u8, payload in "[a-zA-Z0-9{}\":, ]{0,200}") {
            let raw = cnam_request(id, db_id, &payload);
            let req = Request::decode(&raw).unwrap();
            proptest::prop_assert_eq!(req.id, id);
            proptest::prop_assert_eq!(req.payload, payload.as_bytes().to_vec());
        }

        #[test]
        fn tagged_success_invariant(lrn in "[0-9]{0,20}", tag in "[a-zA-Z0-9]{0,20}") {
            let result = ResolvedResult {
                local_routing_number: lrn.clone(),
                local_routing_tag: tag.clone(),
                raw_data: String::new(),
            };
            let reply = encode_success(1, RequestKind::Tagged, &result);
            let data_len = reply[5] as usize;
            let lrn_len = reply[6] as usize;
            proptest::prop_assert!(lrn_len <= data_len);
            proptest::prop_assert_eq!(data_len, lrn.len() + tag.len());
        }
    }
}
