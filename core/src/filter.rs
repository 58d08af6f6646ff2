//! Filter expressions for record listing.
//!
//! A filter is either a single column comparison or an `And`/`Or` group of
//! nested filters. Filters render to nested query keys:
//!
//! ```text
//! filter[text]=a                       Equal (operator omitted)
//! filter[rank][$gte]=10                any other operator
//! filter[$or][0][text][$like]=a%       children of a group, by position
//! ```
//!
//! Column names are not validated here; the backend rejects unknown columns.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Comparison operator of a column filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    #[default]
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Like,
    Regexp,
}

impl CompareOp {
    /// Query token for this operator. `None` for `Equal`, which is implied by
    /// a bare `filter[column]` key.
    pub fn query_token(self) -> Option<&'static str> {
        match self {
            CompareOp::Equal => None,
            CompareOp::NotEqual => Some("$ne"),
            CompareOp::Less => Some("$lt"),
            CompareOp::LessEqual => Some("$lte"),
            CompareOp::Greater => Some("$gt"),
            CompareOp::GreaterEqual => Some("$gte"),
            CompareOp::Like => Some("$like"),
            CompareOp::Regexp => Some("$re"),
        }
    }
}

/// A predicate over record columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Column {
        column: String,
        #[serde(default)]
        op: CompareOp,
        value: String,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// `column == value`.
    pub fn column(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::compare(column, CompareOp::Equal, value)
    }

    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<String>) -> Self {
        Filter::Column {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn and(children: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(children.into_iter().collect())
    }

    fn render(&self, path: &str, out: &mut Vec<(String, String)>) -> Result<(), ApiError> {
        match self {
            Filter::Column { column, op, value } => {
                if column.is_empty() {
                    return Err(ApiError::InvalidArgument(
                        "filter column must not be empty".to_string(),
                    ));
                }
                let key = match op.query_token() {
                    Some(token) => format!("{path}[{column}][{token}]"),
                    None => format!("{path}[{column}]"),
                };
                out.push((key, value.clone()));
                Ok(())
            }
            Filter::And(children) => render_group(path, "$and", children, out),
            Filter::Or(children) => render_group(path, "$or", children, out),
        }
    }
}

fn render_group(
    path: &str,
    combinator: &str,
    children: &[Filter],
    out: &mut Vec<(String, String)>,
) -> Result<(), ApiError> {
    if children.is_empty() {
        return Err(ApiError::InvalidArgument(format!(
            "{combinator} filter needs at least one child"
        )));
    }
    for (index, child) in children.iter().enumerate() {
        child.render(&format!("{path}[{combinator}][{index}]"), out)?;
    }
    Ok(())
}

/// Render top-level filters as `(key, value)` query pairs.
///
/// Several top-level filters are combined with an implicit `$and` so that
/// sibling groups never share a key prefix.
pub fn filter_query_pairs(filters: &[Filter]) -> Result<Vec<(String, String)>, ApiError> {
    let mut out = Vec::new();
    match filters {
        [] => {}
        [single] => single.render("filter", &mut out)?,
        many => render_group("filter", "$and", many, &mut out)?,
    }
    Ok(out)
}
