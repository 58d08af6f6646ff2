//! In-memory record tables.
//!
//! Every table has a declared column set plus an integer primary key `id`
//! assigned from a per-table sequence. The store is `Clone` so a transaction
//! can stage its operations on a copy and commit by replacing the original.
//!
//! A column declared `col->api` holds the id of a record in `api`. Such
//! columns are rendered as `{"id": ..}`, with the referenced record under
//! `"data"` when the request expands the column.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};

pub type JsonObject = Map<String, Value>;

pub const ID_COLUMN: &str = "id";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown record api: {0}")]
    UnknownApi(String),
    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl StoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::UnknownApi(_) | StoreError::RecordNotFound(_) => StatusCode::NOT_FOUND,
            StoreError::UnknownColumn(_)
            | StoreError::InvalidRecord(_)
            | StoreError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// A record API declaration: `name:col1,col2->other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSpec {
    pub name: String,
    pub columns: BTreeSet<String>,
    /// Foreign-key column -> referenced api.
    pub references: BTreeMap<String, String>,
}

impl FromStr for ApiSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, columns) = s.split_once(':').unwrap_or((s, ""));
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("record api needs a name: {s:?}"));
        }
        let mut spec = Self {
            name: name.to_string(),
            columns: BTreeSet::new(),
            references: BTreeMap::new(),
        };
        for entry in columns.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let column = match entry.split_once("->") {
                Some((column, target)) => {
                    let (column, target) = (column.trim(), target.trim());
                    if column.is_empty() || target.is_empty() {
                        return Err(format!("malformed reference {entry:?} in {name:?}"));
                    }
                    spec.references.insert(column.to_string(), target.to_string());
                    column
                }
                None => entry,
            };
            if column == ID_COLUMN {
                return Err(format!("column {ID_COLUMN:?} is implicit in {name:?}"));
            }
            spec.columns.insert(column.to_string());
        }
        Ok(spec)
    }
}

impl fmt::Display for ApiSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| match self.references.get(c) {
                Some(target) => format!("{c}->{target}"),
                None => c.clone(),
            })
            .collect();
        write!(f, "{}:{}", self.name, columns.join(","))
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    columns: BTreeSet<String>,
    references: BTreeMap<String, String>,
    next_id: i64,
    rows: BTreeMap<i64, JsonObject>,
}

impl Table {
    fn new(api: &ApiSpec) -> Self {
        Self {
            columns: api.columns.clone(),
            references: api.references.clone(),
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }

    /// Every expanded column must be a declared foreign key.
    pub fn check_expand(&self, expand: &[String]) -> Result<(), StoreError> {
        match expand.iter().find(|c| !self.references.contains_key(c.as_str())) {
            Some(column) if !self.has_column(column) => {
                Err(StoreError::UnknownColumn(column.clone()))
            }
            Some(column) => Err(StoreError::InvalidQuery(format!(
                "{column} is not a foreign key"
            ))),
            None => Ok(()),
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        column == ID_COLUMN || self.columns.contains(column)
    }

    /// Rows in primary-key order.
    pub fn rows(&self) -> impl Iterator<Item = &JsonObject> {
        self.rows.values()
    }

    fn check_payload(&self, value: &JsonObject) -> Result<(), StoreError> {
        if value.contains_key(ID_COLUMN) {
            return Err(StoreError::InvalidRecord(format!(
                "{ID_COLUMN:?} is assigned by the server"
            )));
        }
        match value.keys().find(|k| !self.columns.contains(k.as_str())) {
            Some(unknown) => Err(StoreError::UnknownColumn(unknown.clone())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Store {
    tables: BTreeMap<String, Table>,
}

impl Store {
    pub fn new(apis: &[ApiSpec]) -> Self {
        let tables = apis
            .iter()
            .map(|api| (api.name.clone(), Table::new(api)))
            .collect();
        Self { tables }
    }

    pub fn table(&self, api: &str) -> Result<&Table, StoreError> {
        self.tables
            .get(api)
            .ok_or_else(|| StoreError::UnknownApi(api.to_string()))
    }

    fn table_mut(&mut self, api: &str) -> Result<&mut Table, StoreError> {
        self.tables
            .get_mut(api)
            .ok_or_else(|| StoreError::UnknownApi(api.to_string()))
    }

    pub fn create(&mut self, api: &str, mut value: JsonObject) -> Result<i64, StoreError> {
        let table = self.table_mut(api)?;
        table.check_payload(&value)?;
        let id = table.next_id;
        table.next_id += 1;
        value.insert(ID_COLUMN.to_string(), Value::from(id));
        table.rows.insert(id, value);
        Ok(id)
    }

    pub fn read(&self, api: &str, id: &str) -> Result<&JsonObject, StoreError> {
        let table = self.table(api)?;
        let key = parse_id(id)?;
        table.rows.get(&key).ok_or_else(|| not_found(id))
    }

    /// Merge `value` into the stored record; absent fields keep their value.
    pub fn update(&mut self, api: &str, id: &str, value: JsonObject) -> Result<(), StoreError> {
        let table = self.table_mut(api)?;
        table.check_payload(&value)?;
        let key = parse_id(id)?;
        let row = table.rows.get_mut(&key).ok_or_else(|| not_found(id))?;
        row.extend(value);
        Ok(())
    }

    pub fn delete(&mut self, api: &str, id: &str) -> Result<(), StoreError> {
        let table = self.table_mut(api)?;
        let key = parse_id(id)?;
        table.rows.remove(&key).map(|_| ()).ok_or_else(|| not_found(id))
    }

    /// Response form of a `table` row. Callers check `expand` with
    /// `Table::check_expand` first. A dangling reference has no `"data"`.
    pub fn render(&self, table: &Table, mut row: JsonObject, expand: &[String]) -> JsonObject {
        for (column, target) in &table.references {
            let Some(value) = row.get(column).filter(|v| !v.is_null()).cloned() else {
                continue;
            };
            let mut reference = JsonObject::new();
            if expand.iter().any(|e| e == column) {
                let data = self
                    .tables
                    .get(target)
                    .zip(reference_key(&value))
                    .and_then(|(target, key)| target.rows.get(&key));
                if let Some(data) = data {
                    reference.insert("data".to_string(), Value::Object(data.clone()));
                }
            }
            reference.insert(ID_COLUMN.to_string(), value);
            row.insert(column.clone(), Value::Object(reference));
        }
        row
    }
}

/// Stored references may be written as numbers or numeric strings.
fn reference_key(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn not_found(id: &str) -> StoreError {
    StoreError::RecordNotFound(id.to_string())
}

/// Ids that are not integers cannot name a record.
fn parse_id(id: &str) -> Result<i64, StoreError> {
    id.parse().map_err(|_| not_found(id))
}
