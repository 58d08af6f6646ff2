use axum::{
    http::{self, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mock_server::{app, IdsResponse, Tokens};
use serde_json::{json, Value};
use tower::ServiceExt;

const TABLE: &str = "/api/records/v1/simple_strict_table";
const EXECUTE: &str = "/api/transactions/v1/execute";

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<String> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .unwrap(),
        None => builder.body(String::new()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<String>) -> axum::response::Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn login(app: &Router) -> Tokens {
    let resp = send(
        app,
        request(
            "POST",
            "/api/auth/v1/login",
            None,
            Some(json!({"email": "admin@localhost", "password": "secret"})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await
}

async fn create(app: &Router, token: &str, text: &str) -> String {
    let resp = send(
        app,
        request("POST", TABLE, Some(token), Some(json!({"text_not_null": text}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ids: IdsResponse = body_json(resp).await;
    assert_eq!(ids.ids.len(), 1);
    ids.ids[0].clone()
}

async fn list(app: &Router, token: &str, query: &str) -> Value {
    let resp = send(app, request("GET", &format!("{TABLE}?{query}"), Some(token), None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await
}

fn texts(page: &Value) -> Vec<String> {
    page["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["text_not_null"].as_str().unwrap().to_string())
        .collect()
}

// --- health and auth ---

#[tokio::test]
async fn healthcheck_is_public() {
    let app = app();
    let resp = send(&app, request("GET", "/api/healthcheck", None, None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(&body_bytes(resp).await[..], b"OK");
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let app = app();
    let resp = send(
        &app,
        request(
            "POST",
            "/api/auth/v1/login",
            None,
            Some(json!({"email": "admin@localhost", "password": "nope"})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn records_require_a_token() {
    let app = app();
    let resp = send(&app, request("GET", TABLE, None, None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = send(&app, request("GET", TABLE, Some("forged"), None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let app = app();
    let tokens = login(&app).await;
    let resp = send(
        &app,
        request(
            "POST",
            "/api/auth/v1/logout",
            None,
            Some(json!({"refresh_token": tokens.refresh_token})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&app, request("GET", TABLE, Some(&tokens.auth_token), None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_by_bearer_token() {
    let app = app();
    let tokens = login(&app).await;
    let resp = send(
        &app,
        request("GET", "/api/auth/v1/logout", Some(&tokens.auth_token), None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&app, request("GET", TABLE, Some(&tokens.auth_token), None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- records ---

#[tokio::test]
async fn record_lifecycle() {
    let app = app();
    let token = login(&app).await.auth_token;
    let id = create(&app, &token, "first").await;

    let resp = send(&app, request("GET", &format!("{TABLE}/{id}"), Some(&token), None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let record: Value = body_json(resp).await;
    assert_eq!(record["text_not_null"], "first");
    assert_eq!(record["id"].to_string(), id);

    let resp = send(
        &app,
        request(
            "PATCH",
            &format!("{TABLE}/{id}"),
            Some(&token),
            Some(json!({"text_null": "extra"})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&app, request("GET", &format!("{TABLE}/{id}"), Some(&token), None)).await;
    let record: Value = body_json(resp).await;
    assert_eq!(record["text_not_null"], "first");
    assert_eq!(record["text_null"], "extra");

    let resp = send(&app, request("DELETE", &format!("{TABLE}/{id}"), Some(&token), None)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&app, request("GET", &format!("{TABLE}/{id}"), Some(&token), None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = send(&app, request("DELETE", &format!("{TABLE}/{id}"), Some(&token), None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_create_returns_ids_in_order() {
    let app = app();
    let token = login(&app).await.auth_token;
    let resp = send(
        &app,
        request(
            "POST",
            TABLE,
            Some(&token),
            Some(json!([{"text_not_null": "x"}, {"text_not_null": "y"}])),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ids: IdsResponse = body_json(resp).await;
    assert_eq!(ids.ids, ["1", "2"]);
}

#[tokio::test]
async fn bulk_create_is_atomic() {
    let app = app();
    let token = login(&app).await.auth_token;
    let resp = send(
        &app,
        request(
            "POST",
            TABLE,
            Some(&token),
            Some(json!([{"text_not_null": "x"}, {"bogus": "y"}])),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(list(&app, &token, "").await["records"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_api_and_column() {
    let app = app();
    let token = login(&app).await.auth_token;
    let resp = send(&app, request("GET", "/api/records/v1/missing", Some(&token), None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = send(
        &app,
        request("POST", TABLE, Some(&token), Some(json!({"nope": 1}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body_bytes(resp).await).contains("nope"));
}

// --- list ---

#[tokio::test]
async fn list_filters_orders_and_counts() {
    let app = app();
    let token = login(&app).await.auth_token;
    for text in ["a", "b"] {
        create(&app, &token, text).await;
    }

    let page = list(&app, &token, "filter%5Btext_not_null%5D=a").await;
    assert_eq!(texts(&page), ["a"]);

    let like_all = "filter%5Btext_not_null%5D%5B%24like%5D=%25";
    let asc = list(&app, &token, &format!("{like_all}&order=%2Btext_not_null")).await;
    let desc = list(&app, &token, &format!("{like_all}&order=-text_not_null")).await;
    assert_eq!(texts(&asc), ["a", "b"]);
    assert_eq!(texts(&desc), ["b", "a"]);

    let counted = list(&app, &token, "limit=1&count=true").await;
    assert_eq!(texts(&counted).len(), 1);
    assert_eq!(counted["total_count"], 2);

    let uncounted = list(&app, &token, "limit=1").await;
    assert!(uncounted.get("total_count").is_none());
}

#[tokio::test]
async fn list_cursor_exhausts_without_error() {
    let app = app();
    let token = login(&app).await.auth_token;
    for text in ["a", "b", "c"] {
        create(&app, &token, text).await;
    }

    let first = list(&app, &token, "limit=2").await;
    assert_eq!(texts(&first), ["a", "b"]);
    let cursor = first["cursor"].as_str().unwrap().to_string();

    let second = list(&app, &token, &format!("limit=2&cursor={cursor}")).await;
    assert_eq!(texts(&second), ["c"]);
    let cursor = second["cursor"].as_str().unwrap().to_string();

    let done = list(&app, &token, &format!("limit=2&cursor={cursor}")).await;
    assert!(texts(&done).is_empty());
    assert!(done.get("cursor").is_none());
}

#[tokio::test]
async fn list_rejects_unknown_order_column() {
    let app = app();
    let token = login(&app).await.auth_token;
    let uri = format!("{TABLE}?order=-nope");
    let resp = send(&app, request("GET", &uri, Some(&token), None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- foreign records ---

/// Two users, one post and two comments on it, one per user.
async fn seed_comments(app: &Router, token: &str) {
    for (api, value) in [
        ("user", json!({"name": "FirstUser"})),
        ("user", json!({"name": "SecondUser"})),
        ("post", json!({"title": "first post"})),
        ("comment", json!({"body": "first comment", "author": "1", "post": "1"})),
        ("comment", json!({"body": "second comment", "author": "2", "post": "1"})),
    ] {
        let uri = format!("/api/records/v1/{api}");
        let resp = send(app, request("POST", &uri, Some(token), Some(value))).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn read_expands_requested_foreign_records() {
    let app = app();
    let token = login(&app).await.auth_token;
    seed_comments(&app, &token).await;

    let uri = "/api/records/v1/comment/1";
    let resp = send(&app, request("GET", uri, Some(&token), None)).await;
    let comment: Value = body_json(resp).await;
    assert_eq!(comment["body"], "first comment");
    assert_eq!(comment["author"], json!({"id": "1"}));
    assert_eq!(comment["post"], json!({"id": "1"}));

    let uri = "/api/records/v1/comment/1?expand=post";
    let resp = send(&app, request("GET", uri, Some(&token), None)).await;
    let comment: Value = body_json(resp).await;
    assert!(comment["author"].get("data").is_none());
    assert_eq!(comment["post"]["data"]["title"], "first post");

    for uri in [
        "/api/records/v1/comment/1?expand=body",
        "/api/records/v1/comment/1?expand=nope",
        "/api/records/v1/comment/1?limit=1",
    ] {
        let resp = send(&app, request("GET", uri, Some(&token), None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn list_expands_with_order_limit_and_offset() {
    let app = app();
    let token = login(&app).await.auth_token;
    seed_comments(&app, &token).await;

    let uri = "/api/records/v1/comment?expand=author%2Cpost&order=-id&limit=1&count=true";
    let resp = send(&app, request("GET", uri, Some(&token), None)).await;
    let page: Value = body_json(resp).await;
    assert_eq!(page["total_count"], 2);
    let records = page["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], 2);
    assert_eq!(records[0]["author"]["data"]["name"], "SecondUser");
    assert_eq!(records[0]["post"]["data"]["title"], "first post");

    let uri = "/api/records/v1/comment?expand=author%2Cpost&order=-id&limit=2";
    let resp = send(&app, request("GET", uri, Some(&token), None)).await;
    let both: Value = body_json(resp).await;
    let uri = "/api/records/v1/comment?expand=author%2Cpost&order=-id&limit=1&offset=1";
    let resp = send(&app, request("GET", uri, Some(&token), None)).await;
    let offset: Value = body_json(resp).await;
    assert_eq!(both["records"][1]["id"], 1);
    assert_eq!(offset["records"][0], both["records"][1]);
}

#[tokio::test]
async fn list_with_cursor_and_huge_offset_is_empty() {
    let app = app();
    let token = login(&app).await.auth_token;
    let id = create(&app, &token, "a").await;
    let page = list(&app, &token, &format!("cursor={id}&offset=18446744073709551615")).await;
    assert!(texts(&page).is_empty());
}

// --- transactions ---

#[tokio::test]
async fn transaction_returns_create_ids_in_order() {
    let app = app();
    let token = login(&app).await.auth_token;
    let existing = create(&app, &token, "old").await;

    let body = json!({"operations": [
        {"Create": {"api_name": "simple_strict_table", "value": {"text_not_null": "t1"}}},
        {"Update": {
            "api_name": "simple_strict_table",
            "id": existing,
            "value": {"text_not_null": "new"},
        }},
        {"Create": {"api_name": "comment", "value": {"body": "hi"}}},
        {"Create": {"api_name": "simple_strict_table", "value": {"text_not_null": "t2"}}},
    ]});
    let resp = send(&app, request("POST", EXECUTE, Some(&token), Some(body))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ids: IdsResponse = body_json(resp).await;
    assert_eq!(ids.ids, ["2", "1", "3"]);

    let page = list(&app, &token, "order=%2Bid").await;
    assert_eq!(texts(&page), ["new", "t1", "t2"]);
}

#[tokio::test]
async fn failed_transaction_changes_nothing() {
    let app = app();
    let token = login(&app).await.auth_token;
    let existing = create(&app, &token, "keep").await;

    let body = json!({"operations": [
        {"Create": {"api_name": "simple_strict_table", "value": {"text_not_null": "ghost"}}},
        {"Delete": {"api_name": "simple_strict_table", "id": existing}},
        {"Delete": {"api_name": "simple_strict_table", "id": "999"}},
    ]});
    let resp = send(&app, request("POST", EXECUTE, Some(&token), Some(body))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let page = list(&app, &token, "").await;
    assert_eq!(texts(&page), ["keep"]);
}

#[tokio::test]
async fn empty_transaction_succeeds() {
    let app = app();
    let token = login(&app).await.auth_token;
    let resp = send(
        &app,
        request(
            "POST",
            "/api/transactions/v1/execute",
            Some(&token),
            Some(json!({"operations": []})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ids: IdsResponse = body_json(resp).await;
    assert!(ids.ids.is_empty());
}

#[tokio::test]
async fn transaction_rejects_legacy_encoding() {
    let app = app();
    let token = login(&app).await.auth_token;
    let body = json!({"operations": [
        {"Delete": {"api_name": "simple_strict_table", "record_id": "1"}},
    ]});
    let resp = send(&app, request("POST", EXECUTE, Some(&token), Some(body))).await;
    assert!(resp.status().is_client_error());
}
