//! Typed facade over one named record API.
//!
//! Each `build_*`/`parse_*` pair maps to one HTTP call. Create, update and
//! delete can also be expressed as transaction operations; both routes
//! convert typed records through [`record_value`], so a facade body and the
//! `value` of the equivalent operation are the same JSON.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::client::{check_status, encode_segment, Client};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::list::{ListArguments, ListResponse};
use crate::types::{IdsResponse, JsonObject, RecordId};

/// Convert a typed record into the schema-flexible payload sent on the wire.
///
/// Fails with `InvalidArgument` when the record does not serialize to a JSON
/// object.
pub fn record_value<T: Serialize>(record: &T) -> Result<JsonObject, ApiError> {
    match serde_json::to_value(record).map_err(ApiError::serialization)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(ApiError::InvalidArgument(format!(
            "record must serialize to a JSON object, got {other}"
        ))),
    }
}

/// Record API `name` with records of type `T`.
///
/// Use `serde_json::Value` (or [`JsonObject`]) for `T` when the schema is not
/// known statically.
#[derive(Debug, Clone)]
pub struct RecordApi<T> {
    client: Client,
    name: String,
    _record: PhantomData<fn() -> T>,
}

impl<T> RecordApi<T> {
    pub(crate) fn new(client: Client, name: String) -> Self {
        Self {
            client,
            name,
            _record: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn collection_path(&self) -> String {
        format!("/api/records/v1/{}", encode_segment(&self.name))
    }

    fn record_path(&self, id: &RecordId) -> String {
        format!("{}/{}", self.collection_path(), encode_segment(id.as_str()))
    }

    pub fn build_read(&self, id: &RecordId) -> HttpRequest {
        self.client
            .request(HttpMethod::Get, &self.record_path(id), None)
    }

    /// Read with foreign records in `expand` inlined.
    pub fn build_read_expanded(&self, id: &RecordId, expand: &[&str]) -> HttpRequest {
        if expand.is_empty() {
            return self.build_read(id);
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("expand", &expand.join(","))
            .finish();
        let path = format!("{}?{query}", self.record_path(id));
        self.client.request(HttpMethod::Get, &path, None)
    }

    pub fn build_delete(&self, id: &RecordId) -> HttpRequest {
        self.client
            .request(HttpMethod::Delete, &self.record_path(id), None)
    }

    pub fn build_list(&self, args: &ListArguments) -> Result<HttpRequest, ApiError> {
        let query = args.to_query_string()?;
        let path = if query.is_empty() {
            self.collection_path()
        } else {
            format!("{}?{query}", self.collection_path())
        };
        debug!(api = %self.name, %query, "building list request");
        Ok(self.client.request(HttpMethod::Get, &path, None))
    }

    pub fn parse_create(&self, response: HttpResponse) -> Result<RecordId, ApiError> {
        let mut ids = self.parse_create_bulk(response)?;
        match (ids.pop(), ids.is_empty()) {
            (Some(id), true) => Ok(id),
            _ => Err(ApiError::ProtocolViolation(format!(
                "create on {} must return exactly one id",
                self.name
            ))),
        }
    }

    pub fn parse_create_bulk(&self, response: HttpResponse) -> Result<Vec<RecordId>, ApiError> {
        check_status(&response, 200)?;
        let parsed: IdsResponse =
            serde_json::from_str(&response.body).map_err(ApiError::deserialization)?;
        Ok(parsed.ids)
    }

    pub fn parse_update(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, 200)
    }

    pub fn parse_delete(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, 200)
    }
}

impl<T: Serialize> RecordApi<T> {
    pub fn build_create(&self, record: &T) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(&record_value(record)?).map_err(ApiError::serialization)?;
        Ok(self
            .client
            .request(HttpMethod::Post, &self.collection_path(), Some(body)))
    }

    /// Create several records in one call. Ids come back in input order.
    pub fn build_create_bulk(&self, records: &[T]) -> Result<HttpRequest, ApiError> {
        let values = records
            .iter()
            .map(record_value)
            .collect::<Result<Vec<_>, _>>()?;
        let body = serde_json::to_string(&values).map_err(ApiError::serialization)?;
        Ok(self
            .client
            .request(HttpMethod::Post, &self.collection_path(), Some(body)))
    }

    /// Partial update: only the fields present in `record` are changed.
    pub fn build_update(&self, id: &RecordId, record: &T) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(&record_value(record)?).map_err(ApiError::serialization)?;
        Ok(self
            .client
            .request(HttpMethod::Patch, &self.record_path(id), Some(body)))
    }
}

impl<T: DeserializeOwned> RecordApi<T> {
    /// A missing record is `NotFound`, never a default value.
    pub fn parse_read(&self, response: HttpResponse) -> Result<T, ApiError> {
        check_status(&response, 200)?;
        serde_json::from_str(&response.body).map_err(ApiError::deserialization)
    }

    pub fn parse_list(&self, response: HttpResponse) -> Result<ListResponse<T>, ApiError> {
        check_status(&response, 200)?;
        serde_json::from_str(&response.body).map_err(ApiError::deserialization)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::filter::{CompareOp, Filter};
    use crate::list::Pagination;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct SimpleStrict {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        text_not_null: String,
    }

    fn strict(text: &str) -> SimpleStrict {
        SimpleStrict {
            id: None,
            text_not_null: text.to_string(),
        }
    }

    fn api() -> RecordApi<SimpleStrict> {
        Client::new("http://localhost:4000").records("simple_strict_table")
    }

    #[test]
    fn build_create_produces_json_post() {
        let req = api().build_create(&strict("a")).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:4000/api/records/v1/simple_strict_table");
        assert_eq!(req.body.as_deref(), Some(r#"{"text_not_null":"a"}"#));
    }

    #[test]
    fn facade_body_matches_batch_value() {
        let record = strict("same");
        let facade = api().build_create(&record).unwrap();

        let mut batch = Client::new("http://localhost:4000").transaction();
        batch
            .api("simple_strict_table")
            .create(record_value(&record).unwrap());
        let op = serde_json::to_value(&batch.operations()[0]).unwrap();

        let facade_body: serde_json::Value =
            serde_json::from_str(facade.body.as_deref().unwrap()).unwrap();
        assert_eq!(op["Create"]["value"], facade_body);
        assert_eq!(
            serde_json::to_string(&op["Create"]["value"]).unwrap(),
            facade.body.unwrap()
        );
    }

    #[test]
    fn non_object_record_is_rejected() {
        let err = record_value(&"just a string").unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }

    #[test]
    fn build_read_escapes_id() {
        let req = api().build_read(&RecordId::from("a/b"));
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.path,
            "http://localhost:4000/api/records/v1/simple_strict_table/a%2Fb"
        );
        assert!(req.body.is_none());
    }

    #[test]
    fn build_read_expanded_appends_query() {
        let req = api().build_read_expanded(&RecordId::from(1), &["author", "post"]);
        assert_eq!(
            req.path,
            "http://localhost:4000/api/records/v1/simple_strict_table/1?expand=author%2Cpost"
        );
        let id = RecordId::from(1);
        assert_eq!(api().build_read_expanded(&id, &[]), api().build_read(&id));
    }

    #[test]
    fn build_update_is_patch() {
        let req = api().build_update(&RecordId::from(3), &strict("b")).unwrap();
        assert_eq!(req.method, HttpMethod::Patch);
        assert!(req.path.ends_with("/simple_strict_table/3"));
    }

    #[test]
    fn build_delete_has_no_body() {
        let req = api().build_delete(&RecordId::from(3));
        assert_eq!(req.method, HttpMethod::Delete);
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn build_create_bulk_sends_array() {
        let req = api().build_create_bulk(&[strict("x"), strict("y")]).unwrap();
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!([{"text_not_null": "x"}, {"text_not_null": "y"}]));
    }

    #[test]
    fn build_list_without_arguments_has_no_query() {
        let req = api().build_list(&ListArguments::default()).unwrap();
        assert_eq!(req.path, "http://localhost:4000/api/records/v1/simple_strict_table");
    }

    #[test]
    fn build_list_appends_query() {
        let args = ListArguments {
            filters: vec![Filter::column("text_not_null", "a")],
            pagination: Pagination::limit(2),
            ..ListArguments::default()
        };
        let req = api().build_list(&args).unwrap();
        assert_eq!(
            req.path,
            "http://localhost:4000/api/records/v1/simple_strict_table?filter%5Btext_not_null%5D=a&limit=2"
        );
    }

    #[test]
    fn build_list_rejects_bad_order_before_building() {
        let args = ListArguments {
            filters: vec![Filter::compare("text_not_null", CompareOp::Like, "%")],
            order: vec!["text_not_null".to_string()],
            ..ListArguments::default()
        };
        assert!(matches!(
            api().build_list(&args).unwrap_err(),
            ApiError::InvalidArgument(_)
        ));
    }

    #[test]
    fn parse_create_returns_single_id() {
        let id = api()
            .parse_create(HttpResponse::new(200, r#"{"ids":["5"]}"#))
            .unwrap();
        assert_eq!(id, RecordId::from(5));
    }

    #[test]
    fn parse_create_rejects_wrong_id_count() {
        let err = api()
            .parse_create(HttpResponse::new(200, r#"{"ids":["5","6"]}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::ProtocolViolation(_)));
    }

    #[test]
    fn parse_read_not_found() {
        let err = api().parse_read(HttpResponse::new(404, "")).unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[test]
    fn parse_read_success() {
        let record = api()
            .parse_read(HttpResponse::new(200, r#"{"id":1,"text_not_null":"a"}"#))
            .unwrap();
        assert_eq!(record.id, Some(1));
        assert_eq!(record.text_not_null, "a");
    }

    #[test]
    fn parse_list_empty_is_not_an_error() {
        let page = api()
            .parse_list(HttpResponse::new(200, r#"{"records":[]}"#))
            .unwrap();
        assert!(page.records.is_empty());
        assert!(page.cursor.is_none());
        assert!(page.total_count.is_none());
    }

    #[test]
    fn parse_list_unknown_api_is_not_found() {
        let err = api().parse_list(HttpResponse::new(404, "")).unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[test]
    fn parse_list_bad_json() {
        let err = api()
            .parse_list(HttpResponse::new(200, "not json"))
            .unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }

    #[test]
    fn parse_update_and_delete_success() {
        assert!(api().parse_update(HttpResponse::new(200, "")).is_ok());
        assert!(api().parse_delete(HttpResponse::new(200, "")).is_ok());
        assert!(matches!(
            api().parse_delete(HttpResponse::new(404, "")).unwrap_err(),
            ApiError::NotFound
        ));
    }
}
