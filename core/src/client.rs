//! Stateless HTTP request builder and response parser for the record backend.
//!
//! # Design
//! `Client` holds a `base_url` and, once logged in, the session tokens. It
//! carries no other state between calls. Each operation is split into a
//! `build_*` method that produces an `HttpRequest` and a `parse_*` method that
//! consumes an `HttpResponse`. The caller executes the actual HTTP round-trip,
//! keeping the core deterministic and free of I/O dependencies.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, CONTENT_TYPE_JSON};
use crate::record_api::RecordApi;
use crate::transaction::TransactionBatch;
use crate::types::{Credentials, LogoutRequest, Tokens};

const LOGIN_PATH: &str = "/api/auth/v1/login";
const LOGOUT_PATH: &str = "/api/auth/v1/logout";

/// Characters escaped inside a single path segment (RFC 3986 unreserved
/// characters pass through).
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Synchronous, stateless client for record APIs, transactions and auth.
///
/// Builds `HttpRequest` values and parses `HttpResponse` values without
/// touching the network.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    tokens: Option<Tokens>,
}

impl Client {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens: None,
        }
    }

    /// A client whose requests carry `tokens.auth_token` as a bearer token.
    pub fn with_tokens(mut self, tokens: Tokens) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Drop held tokens, e.g. after a successful logout.
    pub fn without_tokens(mut self) -> Self {
        self.tokens = None;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> Option<&Tokens> {
        self.tokens.as_ref()
    }

    /// Typed facade over the record API `name`.
    pub fn records<T>(&self, name: impl Into<String>) -> RecordApi<T> {
        RecordApi::new(self.clone(), name.into())
    }

    /// Start an empty transaction batch bound to this session.
    pub fn transaction(&self) -> TransactionBatch {
        TransactionBatch::new(self.clone())
    }

    pub fn build_login(&self, email: &str, password: &str) -> Result<HttpRequest, ApiError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let body = serde_json::to_string(&credentials).map_err(ApiError::serialization)?;
        Ok(self.request(HttpMethod::Post, LOGIN_PATH, Some(body)))
    }

    pub fn parse_login(&self, response: HttpResponse) -> Result<Tokens, ApiError> {
        check_status(&response, 200)?;
        serde_json::from_str(&response.body).map_err(ApiError::deserialization)
    }

    /// Logout revokes the refresh token when one is held; otherwise it ends
    /// the session identified by the auth header.
    pub fn build_logout(&self) -> Result<HttpRequest, ApiError> {
        match self.tokens.as_ref().and_then(|t| t.refresh_token.clone()) {
            Some(refresh_token) => {
                let body = serde_json::to_string(&LogoutRequest { refresh_token })
                    .map_err(ApiError::serialization)?;
                Ok(self.request(HttpMethod::Post, LOGOUT_PATH, Some(body)))
            }
            None => Ok(self.request(HttpMethod::Get, LOGOUT_PATH, None)),
        }
    }

    pub fn parse_logout(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, 200)
    }

    /// Assemble a request for `path` (which may carry a query string),
    /// attaching the JSON content type and bearer token as applicable.
    pub(crate) fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
    ) -> HttpRequest {
        let mut headers = Vec::new();
        if body.is_some() {
            let (key, value) = CONTENT_TYPE_JSON;
            headers.push((key.to_string(), value.to_string()));
        }
        if let Some(tokens) = &self.tokens {
            headers.push((
                "authorization".to_string(),
                format!("Bearer {}", tokens.auth_token),
            ));
        }
        HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers,
            body,
        }
    }
}

/// Percent-encode one path segment.
pub(crate) fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Map non-success status codes to the appropriate `ApiError` variant.
pub(crate) fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    debug!(status = response.status, expected, "unexpected response status");
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}
