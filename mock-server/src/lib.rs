pub mod query;
pub mod store;

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::query::{parse_read_query, ListPage, ListQuery};
use crate::store::{ApiSpec, JsonObject, Store, StoreError};

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:3000";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@localhost";
pub const DEFAULT_ADMIN_PASSWORD: &str = "secret";

fn default_apis() -> Vec<ApiSpec> {
    [
        "simple_strict_table:text_null,text_default,text_not_null",
        "comment:body,author->user,post->post",
        "user:name",
        "post:title",
    ]
    .iter()
    .filter_map(|spec| spec.parse().ok())
    .collect()
}

/// Server settings, from flags or the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "mock-server", about = "In-memory record API backend for client tests")]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[arg(long, env = "ADDRESS", default_value = DEFAULT_ADDRESS)]
    pub address: String,

    #[arg(long, env = "ADMIN_EMAIL", default_value = DEFAULT_ADMIN_EMAIL)]
    pub admin_email: String,

    #[arg(long, env = "ADMIN_PASSWORD", default_value = DEFAULT_ADMIN_PASSWORD)]
    pub admin_password: String,

    /// Record API as `name:col1,col2->other_api`. Repeatable.
    #[arg(
        long = "api",
        env = "RECORD_APIS",
        value_delimiter = ';',
        default_values_t = default_apis()
    )]
    pub apis: Vec<ApiSpec>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            apis: default_apis(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    pub auth_token: String,
    pub refresh_token: String,
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdsResponse {
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOperation {
    pub api_name: String,
    pub value: JsonObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateOperation {
    pub api_name: String,
    pub id: String,
    pub value: JsonObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteOperation {
    pub api_name: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    Create(CreateOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionRequest {
    pub operations: Vec<Operation>,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::Store(err) => err.into_response(),
            ServerError::Unauthorized(_) => {
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
            ServerError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
        }
    }
}

/// auth token -> refresh token of live sessions.
type Sessions = HashMap<String, String>;

#[derive(Clone)]
pub struct AppState {
    store: Arc<RwLock<Store>>,
    sessions: Arc<RwLock<Sessions>>,
    admin: Arc<(String, String)>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::new(&config.apis))),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            admin: Arc::new((config.admin_email.clone(), config.admin_password.clone())),
        }
    }

    async fn authorize(&self, headers: &HeaderMap) -> Result<(), ServerError> {
        let token = bearer_token(headers).ok_or(ServerError::Unauthorized("missing token"))?;
        if self.sessions.read().await.contains_key(token) {
            Ok(())
        } else {
            warn!("rejected unknown auth token");
            Err(ServerError::Unauthorized("invalid token"))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

pub fn app() -> Router {
    app_with_config(&ServerConfig::default())
}

pub fn app_with_config(config: &ServerConfig) -> Router {
    Router::new()
        .route("/api/healthcheck", get(healthcheck))
        .route("/api/auth/v1/login", post(login))
        .route("/api/auth/v1/logout", get(logout_session).post(logout))
        .route("/api/records/v1/{name}", get(list_records).post(create_records))
        .route(
            "/api/records/v1/{name}/{id}",
            get(read_record).patch(update_record).delete(delete_record),
        )
        .route("/api/transactions/v1/execute", post(execute_transaction))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(config))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_config(listener, ServerConfig::default()).await
}

pub async fn run_with_config(
    listener: TcpListener,
    config: ServerConfig,
) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_config(&config)).await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn healthcheck() -> &'static str {
    "OK"
}

async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<Tokens>, ServerError> {
    let (email, password) = state.admin.as_ref();
    if input.email != *email || input.password != *password {
        warn!(email = %input.email, "login rejected");
        return Err(ServerError::Unauthorized("invalid credentials"));
    }
    let tokens = Tokens {
        auth_token: Uuid::new_v4().to_string(),
        refresh_token: Uuid::new_v4().to_string(),
        csrf_token: Uuid::new_v4().to_string(),
    };
    state
        .sessions
        .write()
        .await
        .insert(tokens.auth_token.clone(), tokens.refresh_token.clone());
    info!(email = %input.email, "logged in");
    Ok(Json(tokens))
}

async fn logout(State(state): State<AppState>, Json(input): Json<LogoutRequest>) -> StatusCode {
    state
        .sessions
        .write()
        .await
        .retain(|_, refresh| *refresh != input.refresh_token);
    StatusCode::OK
}

async fn logout_session(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.write().await.remove(token);
    }
    StatusCode::OK
}

async fn create_records(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(input): Json<Value>,
) -> Result<Json<IdsResponse>, ServerError> {
    state.authorize(&headers).await?;
    let values = match input {
        Value::Object(value) => vec![value],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(value) => Ok(value),
                _ => Err(ServerError::BadRequest("records must be objects".into())),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(ServerError::BadRequest("expected a record or array".into())),
    };

    let mut store = state.store.write().await;
    let mut staged = store.clone();
    let mut ids = Vec::with_capacity(values.len());
    for value in values {
        ids.push(staged.create(&name, value)?.to_string());
    }
    *store = staged;
    Ok(Json(IdsResponse { ids }))
}

async fn read_record(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
) -> Result<Json<JsonObject>, ServerError> {
    state.authorize(&headers).await?;
    let expand = parse_read_query(raw.as_deref())?;
    let store = state.store.read().await;
    let table = store.table(&name)?;
    table.check_expand(&expand)?;
    let row = store.read(&name, &id)?.clone();
    Ok(Json(store.render(table, row, &expand)))
}

async fn update_record(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(input): Json<JsonObject>,
) -> Result<StatusCode, ServerError> {
    state.authorize(&headers).await?;
    state.store.write().await.update(&name, &id, input)?;
    Ok(StatusCode::OK)
}

async fn delete_record(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ServerError> {
    state.authorize(&headers).await?;
    state.store.write().await.delete(&name, &id)?;
    Ok(StatusCode::OK)
}

async fn list_records(
    State(state): State<AppState>,
    Path(name): Path<String>,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
) -> Result<Json<ListPage>, ServerError> {
    state.authorize(&headers).await?;
    let query = ListQuery::parse(raw.as_deref())?;
    let store = state.store.read().await;
    let table = store.table(&name)?;
    let mut page = query.execute(table)?;
    page.records = page
        .records
        .into_iter()
        .map(|row| store.render(table, row, query.expand()))
        .collect();
    Ok(Json(page))
}

/// Apply every operation to a staged copy; commit only if all succeed.
async fn execute_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<TransactionRequest>,
) -> Result<Json<IdsResponse>, ServerError> {
    state.authorize(&headers).await?;
    let mut store = state.store.write().await;
    let mut staged = store.clone();
    let mut ids = Vec::new();

    for (index, operation) in input.operations.into_iter().enumerate() {
        let result = match operation {
            Operation::Create(op) => staged
                .create(&op.api_name, op.value)
                .map(|id| ids.push(id.to_string())),
            Operation::Update(op) => staged.update(&op.api_name, &op.id, op.value),
            Operation::Delete(op) => staged.delete(&op.api_name, &op.id),
        };
        if let Err(err) = result {
            warn!(index, error = %err, "transaction aborted");
            return Err(err.into());
        }
    }

    *store = staged;
    Ok(Json(IdsResponse { ids }))
}
