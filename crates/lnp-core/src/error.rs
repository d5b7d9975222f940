//! The resolver's error taxonomy.
//!
//! `code` is stable on the wire — it is the `code` byte in tagged replies
//! and the `error.code` field in cnam error bodies. Never renumber these.

use crate::wire::RequestKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NoError = 0,
    GeneralError = 1,
    InvalidRequest = 11,
    GeneralResolvingError = 21,
    DriverResolvingError = 22,
}

impl ErrorCode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A resolver-level failure, carrying enough context to shape the reply
/// even when the request's kind is not yet known (decode-time failures).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code:?}: {description}")]
pub struct ResolverError {
    code: ErrorCode,
    description: String,
    request_id: Option<u32>,
    kind: Option<RequestKind>,
}

impl ResolverError {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            request_id: None,
            kind: None,
        }
    }

    pub fn with_request_id(mut self, id: u32) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn request_id(&self) -> Option<u32> {
        self.request_id
    }

    pub fn kind(&self) -> Option<RequestKind> {
        self.kind
    }
}
