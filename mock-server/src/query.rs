//! List query parsing and evaluation.
//!
//! Filters arrive as nested form keys such as `filter[$or][1][rank][$gte]`.
//! Keys at one level combine with AND; a `$and`/`$or` segment opens a group
//! whose positional children are themselves AND-combined key sets.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::store::{JsonObject, StoreError, Table, ID_COLUMN};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    Re,
}

impl Op {
    fn parse(token: &str) -> Result<Self, StoreError> {
        Ok(match token {
            "$eq" => Op::Eq,
            "$ne" => Op::Ne,
            "$lt" => Op::Lt,
            "$lte" => Op::Lte,
            "$gt" => Op::Gt,
            "$gte" => Op::Gte,
            "$like" => Op::Like,
            "$re" => Op::Re,
            other => return Err(StoreError::InvalidQuery(format!("unknown operator {other}"))),
        })
    }
}

#[derive(Debug)]
struct Compare {
    column: String,
    op: Op,
    value: String,
    pattern: Option<Regex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    All,
    Any,
}

#[derive(Debug)]
enum Node {
    Compare(Compare),
    Group {
        kind: GroupKind,
        children: BTreeMap<usize, Conjunction>,
    },
}

/// Nodes that must all match.
#[derive(Debug, Default)]
struct Conjunction {
    nodes: Vec<Node>,
}

impl Conjunction {
    fn insert(&mut self, segments: &[&str], value: String) -> Result<(), StoreError> {
        match segments {
            [combinator @ ("$and" | "$or"), index, rest @ ..] => {
                let kind = if *combinator == "$and" {
                    GroupKind::All
                } else {
                    GroupKind::Any
                };
                let index: usize = index.parse().map_err(|_| {
                    StoreError::InvalidQuery(format!("bad group index {index:?}"))
                })?;
                let position = self
                    .nodes
                    .iter()
                    .position(|n| matches!(n, Node::Group { kind: k, .. } if *k == kind));
                let position = match position {
                    Some(position) => position,
                    None => {
                        self.nodes.push(Node::Group {
                            kind,
                            children: BTreeMap::new(),
                        });
                        self.nodes.len() - 1
                    }
                };
                match &mut self.nodes[position] {
                    Node::Group { children, .. } => {
                        children.entry(index).or_default().insert(rest, value)
                    }
                    Node::Compare(_) => Err(StoreError::InvalidQuery("malformed group".into())),
                }
            }
            [column] => self.push_compare(column, Op::Eq, value),
            [column, op] => self.push_compare(column, Op::parse(op)?, value),
            _ => Err(StoreError::InvalidQuery(format!(
                "malformed filter key {}",
                segments.join("/")
            ))),
        }
    }

    fn push_compare(&mut self, column: &str, op: Op, value: String) -> Result<(), StoreError> {
        let pattern = match op {
            Op::Like => Some(like_to_regex(&value)?),
            Op::Re => Some(
                Regex::new(&value).map_err(|e| StoreError::InvalidQuery(e.to_string()))?,
            ),
            _ => None,
        };
        self.nodes.push(Node::Compare(Compare {
            column: column.to_string(),
            op,
            value,
            pattern,
        }));
        Ok(())
    }

    fn validate(&self, table: &Table) -> Result<(), StoreError> {
        for node in &self.nodes {
            match node {
                Node::Compare(c) if !table.has_column(&c.column) => {
                    return Err(StoreError::UnknownColumn(c.column.clone()));
                }
                Node::Compare(_) => {}
                Node::Group { children, .. } => {
                    for child in children.values() {
                        child.validate(table)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn matches(&self, row: &JsonObject) -> bool {
        self.nodes.iter().all(|node| match node {
            Node::Compare(c) => c.matches(row),
            Node::Group {
                kind: GroupKind::All,
                children,
            } => children.values().all(|c| c.matches(row)),
            Node::Group {
                kind: GroupKind::Any,
                children,
            } => children.values().any(|c| c.matches(row)),
        })
    }
}

impl Compare {
    fn matches(&self, row: &JsonObject) -> bool {
        let field = match row.get(&self.column) {
            None | Some(Value::Null) => return false,
            Some(field) => field,
        };
        if let Some(pattern) = &self.pattern {
            return pattern.is_match(&text_of(field));
        }
        let ordering = match field {
            Value::Number(n) => match (n.as_f64(), self.value.parse::<f64>()) {
                (Some(a), Ok(b)) => a.partial_cmp(&b),
                _ => None,
            },
            Value::Bool(b) => match self.value.as_str() {
                "true" | "1" => Some(b.cmp(&true)),
                "false" | "0" => Some(b.cmp(&false)),
                _ => None,
            },
            other => Some(text_of(other).as_str().cmp(self.value.as_str())),
        };
        let Some(ordering) = ordering else {
            return false;
        };
        match self.op {
            Op::Eq => ordering == Ordering::Equal,
            Op::Ne => ordering != Ordering::Equal,
            Op::Lt => ordering == Ordering::Less,
            Op::Lte => ordering != Ordering::Greater,
            Op::Gt => ordering == Ordering::Greater,
            Op::Gte => ordering != Ordering::Less,
            Op::Like | Op::Re => false,
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SQL `LIKE`: `%` matches any run, `_` any single character.
fn like_to_regex(pattern: &str) -> Result<Regex, StoreError> {
    let mut source = String::from("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| StoreError::InvalidQuery(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderBy {
    column: String,
    descending: bool,
}

/// A parsed list request.
#[derive(Debug, Default)]
pub struct ListQuery {
    filter: Conjunction,
    order: Vec<OrderBy>,
    cursor: Option<String>,
    offset: usize,
    limit: Option<usize>,
    count: bool,
    expand: Vec<String>,
}

/// Response page, mirroring the client's strict decode.
#[derive(Debug, Serialize)]
pub struct ListPage {
    pub records: Vec<JsonObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
}

impl ListQuery {
    pub fn parse(raw: Option<&str>) -> Result<Self, StoreError> {
        let mut query = ListQuery::default();
        let Some(raw) = raw else {
            return Ok(query);
        };
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let value = value.into_owned();
            match key.as_ref() {
                "order" => {
                    for entry in value.split(',').filter(|e| !e.is_empty()) {
                        query.order.push(parse_order(entry));
                    }
                }
                "cursor" => query.cursor = Some(value),
                "offset" => query.offset = parse_number("offset", &value)?,
                "limit" => {
                    let limit = parse_number("limit", &value)?;
                    if limit == 0 {
                        return Err(StoreError::InvalidQuery("limit must be positive".into()));
                    }
                    query.limit = Some(limit.min(MAX_LIMIT));
                }
                "count" => query.count = value == "true" || value == "1",
                "expand" => query.expand.extend(split_expand(&value)),
                key => match key.strip_prefix("filter") {
                    Some(path) => {
                        let segments = split_segments(path)?;
                        query.filter.insert(&segments, value)?;
                    }
                    None => {
                        return Err(StoreError::InvalidQuery(format!("unknown parameter {key}")))
                    }
                },
            }
        }
        Ok(query)
    }

    /// Foreign-key columns to inline in each record.
    pub fn expand(&self) -> &[String] {
        &self.expand
    }

    /// Evaluate against `table`. Unknown columns fail before any row is read.
    /// Records come back as stored; see `Store::render` for expansion.
    pub fn execute(&self, table: &Table) -> Result<ListPage, StoreError> {
        self.filter.validate(table)?;
        if let Some(unknown) = self.order.iter().find(|o| !table.has_column(&o.column)) {
            return Err(StoreError::UnknownColumn(unknown.column.clone()));
        }
        table.check_expand(&self.expand)?;

        let mut rows: Vec<&JsonObject> = table.rows().filter(|r| self.filter.matches(r)).collect();
        rows.sort_by(|a, b| self.compare_rows(a, b));
        let total = rows.len();

        let start = match &self.cursor {
            Some(cursor) => {
                let position = rows
                    .iter()
                    .position(|r| {
                        r.get(ID_COLUMN).map(text_of).as_deref() == Some(cursor.as_str())
                    })
                    .ok_or_else(|| StoreError::InvalidQuery(format!("invalid cursor {cursor}")))?;
                position + 1
            }
            None => 0,
        };

        let records: Vec<JsonObject> = rows
            .into_iter()
            .skip(start.saturating_add(self.offset))
            .take(self.limit.unwrap_or(DEFAULT_LIMIT))
            .cloned()
            .collect();
        let cursor = records
            .last()
            .and_then(|r| r.get(ID_COLUMN))
            .map(text_of);

        Ok(ListPage {
            records,
            cursor,
            total_count: self.count.then_some(total),
        })
    }

    /// Order entries in turn, then `id` in the direction of the last entry,
    /// so that flipping a single entry reverses the whole listing.
    fn compare_rows(&self, a: &JsonObject, b: &JsonObject) -> Ordering {
        for order in &self.order {
            let ordering = compare_values(a.get(&order.column), b.get(&order.column));
            let ordering = if order.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        let by_id = compare_values(a.get(ID_COLUMN), b.get(ID_COLUMN));
        match self.order.last() {
            Some(last) if last.descending => by_id.reverse(),
            _ => by_id,
        }
    }
}

/// Query of a single-record read: only `expand` is accepted.
pub fn parse_read_query(raw: Option<&str>) -> Result<Vec<String>, StoreError> {
    let mut expand = Vec::new();
    for (key, value) in url::form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
        match key.as_ref() {
            "expand" => expand.extend(split_expand(&value)),
            key => return Err(StoreError::InvalidQuery(format!("unknown parameter {key}"))),
        }
    }
    Ok(expand)
}

fn split_expand(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn parse_order(entry: &str) -> OrderBy {
    match entry.strip_prefix('-') {
        Some(column) => OrderBy {
            column: column.to_string(),
            descending: true,
        },
        None => OrderBy {
            column: entry.trim_start_matches('+').to_string(),
            descending: false,
        },
    }
}

fn parse_number(name: &str, value: &str) -> Result<usize, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::InvalidQuery(format!("{name} must be a non-negative integer")))
}

/// `[a][$b]` -> `["a", "$b"]`.
fn split_segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let malformed = || StoreError::InvalidQuery(format!("malformed filter key filter{path}"));
    let mut segments = Vec::new();
    let mut rest = path;
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[').ok_or_else(malformed)?;
        let end = inner.find(']').ok_or_else(malformed)?;
        segments.push(&inner[..end]);
        rest = &inner[end + 1..];
    }
    if segments.is_empty() {
        return Err(malformed());
    }
    Ok(segments)
}

/// Null and missing sort first, then booleans, numbers and strings.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
