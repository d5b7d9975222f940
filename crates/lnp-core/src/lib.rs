pub mod config;
pub mod error;
pub mod wire;

pub use config::{ConfigError, DaemonConfig, DbConfig, MetricsConfig, ResolverConfig, SipConfig};
pub use error::{ErrorCode, ResolverError};
pub use wire::{
    decode_reply, encode_cnam_request, encode_error, encode_provisional, encode_success,
    encode_tagged_request, Reply, Request, RequestKind, ResolvedResult,
};
