//! Error types for the record API client.
//!
//! # Design
//! `NotFound` gets a dedicated variant because reading a deleted record must
//! fail loudly instead of yielding an empty value. All other non-2xx
//! responses land in `HttpError` with the raw status code and body, which
//! also carries the backend's validation detail for rejected filters, orders
//! and payloads.

/// Errors returned by the `build_*` and `parse_*` methods.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server returned 404: the record or record API does not exist.
    #[error("resource not found")]
    NotFound,

    /// The server returned a status other than the expected success code.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The response decoded but contradicts the request it answers.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Caller input rejected before any request was built.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The host's transport failed. Never produced by the core itself.
    #[error("transport failed: {0}")]
    Transport(String),
}

impl ApiError {
    /// Whether the backend rejected the request's content (bad column,
    /// malformed filter, schema violation).
    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::HttpError { status: 400, .. })
    }

    pub(crate) fn serialization(err: serde_json::Error) -> Self {
        ApiError::SerializationError(err.to_string())
    }

    pub(crate) fn deserialization(err: serde_json::Error) -> Self {
        ApiError::DeserializationError(err.to_string())
    }
}
