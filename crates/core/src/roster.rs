//! Student-information roster access and normalization.
//!
//! The sections query runs through sqlx `Any` (SQLite or PostgreSQL) and emits
//! JSON text, e.g. built with `json_group_array`/`json_agg`, in which joined
//! child rows arrive as lists of single-key objects:
//! `[{"SECTIONPER": [{"PEOPLE_CODE_ID": "P1"}, {"PEOPLE_CODE_ID": "P1"}]}]`.
//! [`normalize_rows`] reduces those to plain value lists before the rows are
//! turned into [`Section`]s.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use tracing::{debug, info};

use crate::error::{Result, RollcallError};
use crate::models::section::Section;

/// Source of record for sections and person identities.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Raw, not yet normalized section rows.
    async fn fetch_section_rows(&self) -> Result<Vec<Value>>;

    /// Principal name for a person id, or `None` when the source has no row.
    async fn principal_name(&self, person_id: &str) -> Result<Option<String>>;
}

/// Keys holding lists of structured records rather than joined id rows.
const RECORD_LISTS: &[&str] = &["term"];

/// Collapse lists of single-key objects into lists of their distinct values.
///
/// Values keep first-seen order. An empty list, or a row that is not an
/// object, is malformed input. Record lists such as `term` are kept as they
/// are, even when a record carries a single key.
pub fn normalize_rows(rows: Vec<Value>) -> Result<Vec<Value>> {
    rows.into_iter()
        .enumerate()
        .map(|(idx, row)| normalize_row(idx, row))
        .collect()
}

fn normalize_row(idx: usize, mut row: Value) -> Result<Value> {
    let obj = row.as_object_mut().ok_or_else(|| {
        RollcallError::MalformedRoster(format!("row {idx} is not an object"))
    })?;

    for (key, value) in obj.iter_mut() {
        if RECORD_LISTS.contains(&key.as_str()) {
            continue;
        }
        let Value::Array(items) = &mut *value else {
            continue;
        };
        let first = items.first().ok_or_else(|| {
            RollcallError::MalformedRoster(format!("row {idx}: empty list for {key}"))
        })?;
        if !matches!(first, Value::Object(o) if o.len() == 1) {
            continue;
        }

        let mut seen = HashSet::new();
        let mut flattened = Vec::with_capacity(items.len());
        for item in items.iter() {
            let inner = match item {
                Value::Object(o) if o.len() == 1 => o.values().next().cloned(),
                _ => None,
            }
            .ok_or_else(|| {
                RollcallError::MalformedRoster(format!(
                    "row {idx}: mixed entries in {key}: {item}"
                ))
            })?;
            if seen.insert(inner.to_string()) {
                flattened.push(inner);
            }
        }
        *value = Value::Array(flattened);
    }

    Ok(row)
}

/// Normalize raw rows into sections, rejecting duplicate class codes.
pub fn load_sections(rows: Vec<Value>) -> Result<Vec<Section>> {
    let sections = normalize_rows(rows)?
        .into_iter()
        .map(Section::from_row)
        .collect::<Result<Vec<_>>>()?;

    check_unique_class_codes(&sections)?;

    info!(count = sections.len(), "loaded sections from roster");
    Ok(sections)
}

/// Class codes join sections to directory classes, so each may appear once.
pub fn check_unique_class_codes(sections: &[Section]) -> Result<()> {
    let mut codes = HashSet::new();
    for section in sections {
        if !codes.insert(section.class_code.as_str()) {
            return Err(RollcallError::MalformedRoster(format!(
                "duplicate classCode {}",
                section.class_code
            )));
        }
    }
    Ok(())
}

/// Roster source that runs operator-supplied SQL through sqlx.
///
/// The sections query may return its JSON document split across many rows;
/// the first column of every row is concatenated before parsing. The principal
/// name query takes the person id as its only bind parameter.
pub struct SqlRosterSource {
    pool: AnyPool,
    sections_sql: String,
    principal_name_sql: String,
}

impl SqlRosterSource {
    /// Connect to the roster database and load both query files.
    pub async fn connect(
        database_url: &str,
        sections_query: &Path,
        principal_name_query: &Path,
    ) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        let sections_sql = std::fs::read_to_string(sections_query)?;
        let principal_name_sql = std::fs::read_to_string(principal_name_query)?;
        Ok(Self::with_pool(pool, sections_sql, principal_name_sql))
    }

    /// Build from an existing pool and query text.
    pub fn with_pool(pool: AnyPool, sections_sql: String, principal_name_sql: String) -> Self {
        Self {
            pool,
            sections_sql,
            principal_name_sql,
        }
    }
}

#[async_trait]
impl RosterSource for SqlRosterSource {
    async fn fetch_section_rows(&self) -> Result<Vec<Value>> {
        info!("querying roster sections");
        let rows = sqlx::query(&self.sections_sql)
            .fetch_all(&self.pool)
            .await?;

        let mut document = String::new();
        for row in &rows {
            let chunk: String = row.try_get(0)?;
            document.push_str(&chunk);
        }
        if document.trim().is_empty() {
            return Ok(Vec::new());
        }

        let value: Value = serde_json::from_str(&document)
            .map_err(|e| RollcallError::MalformedRoster(format!("sections query output: {e}")))?;
        match value {
            Value::Array(rows) => Ok(rows),
            other => Err(RollcallError::MalformedRoster(format!(
                "sections query returned {}, expected a JSON array",
                json_kind(&other)
            ))),
        }
    }

    async fn principal_name(&self, person_id: &str) -> Result<Option<String>> {
        let row = sqlx::query(&self.principal_name_sql)
            .bind(person_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let name = match row {
            Some(row) => row.try_get::<Option<String>, _>(0)?,
            None => None,
        };
        debug!(person_id, principal_name = ?name, "roster principal name lookup");
        Ok(name)
    }
}

/// Stand-in used when no roster database is configured and sections come
/// from the snapshot. Only people already in the identity cache can be
/// resolved; any roster lookup is a configuration error.
#[derive(Debug, Default)]
pub struct OfflineRoster;

#[async_trait]
impl RosterSource for OfflineRoster {
    async fn fetch_section_rows(&self) -> Result<Vec<Value>> {
        Err(RollcallError::Config(
            "no roster database configured to query sections".into(),
        ))
    }

    async fn principal_name(&self, person_id: &str) -> Result<Option<String>> {
        Err(RollcallError::Config(format!(
            "no roster database configured to look up {person_id}"
        )))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
