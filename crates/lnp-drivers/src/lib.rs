pub mod cache;
pub mod driver;
pub mod drivers;
pub mod http_engine;
pub mod metrics;
pub mod registry;

pub use cache::{CacheEntry, CacheWriterHandle};
pub use driver::{CallCompletion, Driver, DriverKind, StartResolve};
pub use drivers::{AlcazarDriver, BulkvsDriver, CnamHttpDriver, CoureAnqDriver, CsvDriver, SipDriver, SipIdentity, ThinqDriver};
pub use http_engine::{AuthKind, HttpEngine, HttpRequest};
pub use metrics::{DriverCounters, DriverMetricKey, MetricsRegistry};
pub use registry::{DriverRegistry, Registry};
