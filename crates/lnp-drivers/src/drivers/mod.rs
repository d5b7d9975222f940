pub mod alcazar;
pub mod bulkvs;
pub mod cnam_http;
pub mod coure_anq;
pub mod csv;
pub mod sip;
pub mod thinq;
mod url_template;

pub use alcazar::AlcazarDriver;
pub use bulkvs::BulkvsDriver;
pub use cnam_http::CnamHttpDriver;
pub use coure_anq::CoureAnqDriver;
pub use csv::CsvDriver;
pub use sip::{SipDriver, SipIdentity};
pub use thinq::ThinqDriver;
