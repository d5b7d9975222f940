//! Driver registry — loads the configured driver set from the control
//! database and holds it behind an atomically-swapped pointer so dispatch
//! never blocks behind a lock, not even during reload.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use lnp_core::{ErrorCode, ResolverError};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::warn;

use crate::driver::{Driver, DriverKind};
use crate::drivers::{AlcazarDriver, BulkvsDriver, CnamHttpDriver, CoureAnqDriver, CsvDriver, SipDriver, SipIdentity};
use crate::drivers::thinq::ThinqDriver;
use crate::metrics::{self, DriverMetricKey, MetricsRegistry};

const DEFAULT_TIMEOUT_MS: u64 = 4000;

/// The three historical shapes a `load_lnp_databases()` row can present its
/// driver configuration in, autodetected from the first row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigShape {
    /// Column `parameters` carries a JSON blob.
    Json,
    /// Flat columns, newer generation (marked by presence of `o_alkazar_key`).
    AlcazarFlat,
    /// Flat columns, oldest generation (marked by presence of `o_thinq_token`).
    ThinqFlat,
}

fn detect_shape(row: &PgRow) -> ConfigShape {
    if row.try_get::<String, _>("parameters").is_ok() {
        ConfigShape::Json
    } else if row.try_get::<String, _>("o_alkazar_key").is_ok() {
        ConfigShape::AlcazarFlat
    } else {
        ConfigShape::ThinqFlat
    }
}

/// Normalized view of one row's configuration, regardless of which shape
/// it arrived in.
#[derive(Debug, Clone, Default)]
struct RowSpec {
    unique_id: i32,
    db_id: u8,
    label: String,
    kind: Option<DriverKind>,
    timeout_ms: u64,
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    key: Option<String>,
    base_url: Option<String>,
    country_code: Option<String>,
    url_template: Option<String>,
    file_path: Option<String>,
    operator_map: Option<serde_json::Value>,
}

fn get_opt_str(row: &PgRow, col: &str) -> Option<String> {
    row.try_get::<String, _>(col).ok()
}

fn get_opt_i32(row: &PgRow, col: &str) -> Option<i32> {
    row.try_get::<i32, _>(col).ok()
}

fn extract_spec(row: &PgRow, shape: ConfigShape) -> Result<RowSpec, ResolverError> {
    let unique_id: i32 = row.try_get("unique_id").map_err(|e| {
        ResolverError::new(ErrorCode::GeneralResolvingError, format!("driver row missing 'unique_id': {e}"))
    })?;
    let label: String = get_opt_str(row, "label").unwrap_or_else(|| format!("driver-{unique_id}"));
    let db_id: u8 = row
        .try_get::<i32, _>("db_id")
        .ok()
        .and_then(|v| u8::try_from(v).ok())
        .unwrap_or(unique_id as u8);

    let kind = get_opt_str(row, "database_type")
        .as_deref()
        .and_then(DriverKind::from_name)
        .or_else(|| get_opt_i32(row, "o_driver_id").and_then(DriverKind::from_legacy_id));

    let timeout_ms = row.try_get::<i32, _>("timeout").ok().map(|v| v as u64).unwrap_or(DEFAULT_TIMEOUT_MS);

    let mut spec = RowSpec {
        unique_id,
        db_id,
        label,
        kind,
        timeout_ms,
        ..Default::default()
    };

    match shape {
        ConfigShape::Json => {
            let raw: String = row.try_get("parameters").map_err(|e| {
                ResolverError::new(ErrorCode::GeneralResolvingError, format!("driver row missing 'parameters': {e}"))
            })?;
            let json: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
                ResolverError::new(ErrorCode::GeneralResolvingError, format!("driver row 'parameters' is not valid JSON: {e}"))
            })?;
            spec.host = json.get("host").and_then(|v| v.as_str()).map(str::to_string);
            spec.port = json.get("port").and_then(|v| v.as_u64()).map(|v| v as u16);
            spec.username = json.get("username").and_then(|v| v.as_str()).map(str::to_string);
            spec.password = json.get("password").and_then(|v| v.as_str()).map(str::to_string);
            spec.token = json.get("token").and_then(|v| v.as_str()).map(str::to_string);
            spec.key = json.get("key").and_then(|v| v.as_str()).map(str::to_string);
            spec.base_url = json.get("base_url").and_then(|v| v.as_str()).map(str::to_string);
            spec.country_code = json.get("country_code").and_then(|v| v.as_str()).map(str::to_string);
            spec.url_template = json.get("url_template").and_then(|v| v.as_str()).map(str::to_string);
            spec.file_path = json.get("file_path").and_then(|v| v.as_str()).map(str::to_string);
            spec.operator_map = json.get("operator_map").cloned();
        }
        ConfigShape::AlcazarFlat | ConfigShape::ThinqFlat => {
            spec.host = get_opt_str(row, "host");
            spec.port = row.try_get::<i32, _>("port").ok().map(|v| v as u16);
            spec.username = get_opt_str(row, "username").or_else(|| get_opt_str(row, "o_thinq_username"));
            spec.password = get_opt_str(row, "password");
            spec.token = get_opt_str(row, "o_thinq_token").or_else(|| get_opt_str(row, "token"));
            spec.key = get_opt_str(row, "o_alkazar_key").or_else(|| get_opt_str(row, "key"));
            spec.base_url = get_opt_str(row, "base_url");
            spec.country_code = get_opt_str(row, "country_code");
            spec.url_template = get_opt_str(row, "url_template");
            spec.file_path = get_opt_str(row, "file_path");
            spec.operator_map = get_opt_str(row, "operator_map")
                .and_then(|raw| serde_json::from_str(&raw).ok());

            if matches!(shape, ConfigShape::ThinqFlat) && matches!(spec.kind, Some(DriverKind::Alcazar)) {
                return Err(ResolverError::new(
                    ErrorCode::GeneralResolvingError,
                    format!("driver {unique_id}: alcazar requires richer configuration than the legacy flat shape provides"),
                ));
            }
        }
    }

    Ok(spec)
}

fn operator_map_from(spec: &RowSpec) -> HashMap<String, String> {
    spec.operator_map
        .as_ref()
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn build_driver(spec: &RowSpec, sip_identity: &Arc<SipIdentity>) -> Result<Arc<dyn Driver>, ResolverError> {
    let kind = spec
        .kind
        .ok_or_else(|| ResolverError::new(ErrorCode::GeneralResolvingError, format!("driver {}: unrecognized kind", spec.unique_id)))?;
    let timeout = Duration::from_millis(spec.timeout_ms);
    let missing = |field: &str| ResolverError::new(ErrorCode::GeneralResolvingError, format!("driver {}: missing '{field}'", spec.unique_id));

    let driver: Arc<dyn Driver> = match kind {
        DriverKind::Sip => Arc::new(SipDriver::new(
            spec.unique_id,
            &spec.label,
            spec.host.clone().ok_or_else(|| missing("host"))?,
            spec.port.unwrap_or(0),
            timeout,
            sip_identity.clone(),
        )),
        DriverKind::Thinq => Arc::new(ThinqDriver::new(
            spec.unique_id,
            &spec.label,
            spec.host.clone().ok_or_else(|| missing("host"))?,
            spec.port,
            spec.username.clone().ok_or_else(|| missing("username"))?,
            spec.token.clone().ok_or_else(|| missing("token"))?,
            timeout,
        )),
        DriverKind::Alcazar => Arc::new(AlcazarDriver::new(
            spec.unique_id,
            &spec.label,
            spec.host.clone().ok_or_else(|| missing("host"))?,
            spec.port,
            spec.key.clone().ok_or_else(|| missing("key"))?,
            timeout,
        )),
        DriverKind::CoureAnq => Arc::new(CoureAnqDriver::new(
            spec.unique_id,
            &spec.label,
            spec.base_url.clone().ok_or_else(|| missing("base_url"))?,
            spec.username.clone().ok_or_else(|| missing("username"))?,
            spec.password.clone().ok_or_else(|| missing("password"))?,
            spec.country_code.clone().ok_or_else(|| missing("country_code"))?,
            operator_map_from(spec),
            timeout,
        )?),
        DriverKind::CnamHttp => Arc::new(CnamHttpDriver::new(
            spec.unique_id,
            &spec.label,
            spec.url_template.as_deref().ok_or_else(|| missing("url_template"))?,
            timeout,
        )?),
        DriverKind::Bulkvs => Arc::new(BulkvsDriver::new(
            spec.unique_id,
            &spec.label,
            spec.base_url.clone().ok_or_else(|| missing("base_url"))?,
            spec.token.clone().ok_or_else(|| missing("token"))?,
            timeout,
        )),
        DriverKind::Csv => Arc::new(CsvDriver::load(
            spec.unique_id,
            &spec.label,
            spec.file_path.as_deref().ok_or_else(|| missing("file_path"))?,
        )?),
    };
    Ok(driver)
}

/// The live mapping `db_id -> driver`.
#[derive(Default)]
pub struct Registry {
    drivers: HashMap<u8, Arc<dyn Driver>>,
}

impl Registry {
    /// Build a registry directly from an already-constructed driver map,
    /// bypassing `load()`. Used for embedding and for tests that don't
    /// want to stand up a control database.
    pub fn from_drivers(drivers: HashMap<u8, Arc<dyn Driver>>) -> Self {
        Self { drivers }
    }

    pub fn get(&self, db_id: u8) -> Option<Arc<dyn Driver>> {
        self.drivers.get(&db_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }
}

/// Load every row, skipping rows with an unrecognized kind (logged as a
/// warning) and aborting the whole reload on any other row-level error.
pub async fn load(pool: &PgPool, sip_identity: &Arc<SipIdentity>, metrics: &MetricsRegistry) -> Result<Registry, ResolverError> {
    let rows = sqlx::query("SELECT * FROM load_lnp_databases()")
        .fetch_all(pool)
        .await
        .map_err(|e| ResolverError::new(ErrorCode::GeneralResolvingError, format!("failed to call load_lnp_databases(): {e}")))?;

    let mut shape: Option<ConfigShape> = None;
    let mut drivers = HashMap::new();

    for row in &rows {
        let shape = *shape.get_or_insert_with(|| detect_shape(row));
        let spec = extract_spec(row, shape)?;

        if spec.kind.is_none() {
            warn!(unique_id = spec.unique_id, "skipping driver row with unrecognized kind");
            continue;
        }

        let driver = build_driver(&spec, sip_identity)?;
        metrics::register(metrics, DriverMetricKey { kind: spec.kind.unwrap(), driver_id: spec.unique_id });
        drivers.insert(spec.db_id, driver);
    }

    Ok(Registry { drivers })
}

/// Holds the live registry behind an atomic pointer. Reads never block a
/// concurrent swap and a swap never blocks a concurrent read.
pub struct DriverRegistry {
    current: ArcSwap<Registry>,
}

impl DriverRegistry {
    pub fn empty() -> Self {
        Self { current: ArcSwap::from_pointee(Registry::default()) }
    }

    pub fn snapshot(&self) -> Arc<Registry> {
        self.current.load_full()
    }

    pub fn swap(&self, registry: Registry) {
        self.current.store(Arc::new(registry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_has_no_drivers() {
        let registry = DriverRegistry::empty();
        assert_eq!(registry.snapshot().len(), 0);
    }

    #[test]
    fn swap_replaces_the_whole_map_atomically() {
        let registry = DriverRegistry::empty();
        let mut drivers = HashMap::new();
        drivers.insert(7u8, Arc::new(CsvDriverStub) as Arc<dyn Driver>);
        registry.swap(Registry { drivers });
        assert_eq!(registry.snapshot().len(), 1);
        assert!(registry.snapshot().get(7).is_some());
        assert!(registry.snapshot().get(9).is_none());
    }

    struct CsvDriverStub;
    impl Driver for CsvDriverStub {
        fn unique_id(&self) -> i32 {
            1
        }
        fn label(&self) -> &str {
            "stub"
        }
        fn kind(&self) -> DriverKind {
            DriverKind::Csv
        }
        fn start_resolve(&self, _request: &lnp_core::Request) -> crate::driver::StartResolve {
            crate::driver::StartResolve::Resolved(Ok(lnp_core::ResolvedResult::default()))
        }
        fn parse(&self, _body: &str, _request: &lnp_core::Request) -> Result<lnp_core::ResolvedResult, ResolverError> {
            unreachable!()
        }
    }
}
