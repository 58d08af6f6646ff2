//! Listing contract: filters, ordering, pagination and counting combined into
//! one query, plus the strictly decoded page that comes back.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::filter::{filter_query_pairs, Filter};

/// Window into a listing.
///
/// `cursor` is opaque continuation state issued by the server; it is only
/// ever echoed back, never derived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub cursor: Option<String>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl Pagination {
    pub fn limit(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn after(cursor: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor.into()),
            ..Self::default()
        }
    }
}

/// Arguments of a list call.
///
/// `order` entries are `+column` (ascending) or `-column` (descending).
/// `count` asks the server for the size of the filtered set, which is costly;
/// leave it off unless the total is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListArguments {
    pub filters: Vec<Filter>,
    pub order: Vec<String>,
    pub pagination: Pagination,
    pub count: bool,
    pub expand: Vec<String>,
}

impl ListArguments {
    /// Encode as an `application/x-www-form-urlencoded` query string, without
    /// the leading `?`. Empty arguments yield an empty string.
    pub fn to_query_string(&self) -> Result<String, ApiError> {
        let mut pairs = filter_query_pairs(&self.filters)?;

        for entry in &self.order {
            validate_order(entry)?;
            pairs.push(("order".to_string(), entry.clone()));
        }

        let Pagination {
            cursor,
            offset,
            limit,
        } = &self.pagination;
        if let Some(cursor) = cursor {
            pairs.push(("cursor".to_string(), cursor.clone()));
        }
        if let Some(offset) = offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(limit) = limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }

        if self.count {
            pairs.push(("count".to_string(), "true".to_string()));
        }
        if !self.expand.is_empty() {
            pairs.push(("expand".to_string(), self.expand.join(",")));
        }

        Ok(url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish())
    }
}

fn validate_order(entry: &str) -> Result<(), ApiError> {
    match entry.strip_prefix(['+', '-']) {
        Some(column) if !column.is_empty() => Ok(()),
        Some(_) => Err(ApiError::InvalidArgument(format!(
            "order entry {entry:?} names no column"
        ))),
        None => Err(ApiError::InvalidArgument(format!(
            "order entry {entry:?} must start with '+' or '-'"
        ))),
    }
}

/// One page of a listing.
///
/// `cursor` is present when more records may follow; `total_count` only when
/// `count` was requested. Unknown fields fail the decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListResponse<T> {
    pub records: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::CompareOp;

    #[test]
    fn empty_arguments_produce_empty_query() {
        assert_eq!(ListArguments::default().to_query_string().unwrap(), "");
    }

    #[test]
    fn full_query_encodes_every_part_in_order() {
        let args = ListArguments {
            filters: vec![Filter::compare("text", CompareOp::Like, "%")],
            order: vec!["+text".to_string(), "-id".to_string()],
            pagination: Pagination {
                cursor: Some("abc".to_string()),
                offset: Some(5),
                limit: Some(10),
            },
            count: true,
            expand: vec!["author".to_string(), "post".to_string()],
        };
        assert_eq!(
            args.to_query_string().unwrap(),
            "filter%5Btext%5D%5B%24like%5D=%25&order=%2Btext&order=-id\
             &cursor=abc&offset=5&limit=10&count=true&expand=author%2Cpost"
        );
    }

    #[test]
    fn count_is_only_sent_when_requested() {
        let args = ListArguments {
            pagination: Pagination::limit(1),
            ..ListArguments::default()
        };
        assert_eq!(args.to_query_string().unwrap(), "limit=1");
    }

    #[test]
    fn order_without_prefix_is_rejected() {
        let args = ListArguments {
            order: vec!["text".to_string()],
            ..ListArguments::default()
        };
        assert!(matches!(
            args.to_query_string().unwrap_err(),
            ApiError::InvalidArgument(_)
        ));

        let bare = ListArguments {
            order: vec!["-".to_string()],
            ..ListArguments::default()
        };
        assert!(bare.to_query_string().is_err());
    }

    #[test]
    fn response_decodes_optional_fields() {
        let page: ListResponse<serde_json::Value> =
            serde_json::from_str(r#"{"records":[{"id":1}],"cursor":"1","total_count":3}"#)
                .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.cursor.as_deref(), Some("1"));
        assert_eq!(page.total_count, Some(3));

        let bare: ListResponse<serde_json::Value> =
            serde_json::from_str(r#"{"records":[]}"#).unwrap();
        assert!(bare.records.is_empty());
        assert!(bare.cursor.is_none());
        assert!(bare.total_count.is_none());
    }

    #[test]
    fn response_rejects_unknown_fields() {
        let result: Result<ListResponse<serde_json::Value>, _> =
            serde_json::from_str(r#"{"records":[],"next":"x"}"#);
        assert!(result.is_err());
    }
}
