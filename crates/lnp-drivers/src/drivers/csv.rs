//! CSV driver — an in-memory `number -> (tag, lrn)` map, built once at
//! construction from a flat file on disk. Lookups are pure and synchronous.

use std::collections::HashMap;
use std::fs;

use lnp_core::{ErrorCode, Request, ResolvedResult, ResolverError};

use crate::driver::{Driver, DriverKind, StartResolve};

#[derive(Debug, Clone)]
struct Row {
    tag: String,
    lrn: String,
}

pub struct CsvDriver {
    unique_id: i32,
    label: String,
    table: HashMap<String, Row>,
}

impl CsvDriver {
    /// Read `path` line by line, splitting each on `,` into
    /// `number,tag,lrn`. Empty lines are skipped. A line with fewer than
    /// two non-empty fields is rejected; first occurrence of a number wins.
    pub fn load(unique_id: i32, label: impl Into<String>, path: &str) -> Result<Self, ResolverError> {
        let label = label.into();
        let text = fs::read_to_string(path).map_err(|e| {
            ResolverError::new(
                ErrorCode::GeneralResolvingError,
                format!("csv driver {label}: failed to read {path}: {e}"),
            )
        })?;

        let mut table = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.splitn(3, ',');
            let number = fields.next().unwrap_or("");
            let tag = fields.next().unwrap_or("");
            let lrn = fields.next().unwrap_or("");

            if number.is_empty() {
                return Err(ResolverError::new(
                    ErrorCode::GeneralResolvingError,
                    format!("csv driver {label}: line {} missing number field", lineno + 1),
                ));
            }
            // Either tag or lrn may be empty, but not both.
            if tag.is_empty() && lrn.is_empty() {
                return Err(ResolverError::new(
                    ErrorCode::GeneralResolvingError,
                    format!("csv driver {label}: line {} missing tag and lrn", lineno + 1),
                ));
            }

            table.entry(number.to_string()).or_insert(Row {
                tag: tag.to_string(),
                lrn: lrn.to_string(),
            });
        }

        Ok(Self { unique_id, label, table })
    }
}

impl Driver for CsvDriver {
    fn unique_id(&self) -> i32 {
        self.unique_id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Csv
    }

    fn start_resolve(&self, request: &Request) -> StartResolve {
        let number = String::from_utf8_lossy(&request.payload).into_owned();
        let result = match self.table.get(&number) {
            Some(row) => ResolvedResult {
                local_routing_number: row.lrn.clone(),
                local_routing_tag: row.tag.clone(),
                raw_data: String::new(),
            },
            None => ResolvedResult {
                local_routing_number: number,
                local_routing_tag: String::new(),
                raw_data: String::new(),
            },
        };
        StartResolve::Resolved(Ok(result))
    }

    fn parse(&self, _body: &str, _request: &Request) -> Result<ResolvedResult, ResolverError> {
        unreachable!("csv driver never returns StartResolve::Pending")
    }
}
