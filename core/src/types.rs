//! Shared DTOs: record identifiers, record payloads and auth tokens.
//!
//! # Design
//! Record payloads are schema-flexible JSON objects because the backend's
//! schema is unknown at compile time. Typed records layer on top through
//! explicit serde conversion (see `record_api::record_value`).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// A schema-flexible record payload.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Opaque record identifier.
///
/// Servers key records by integers or by url-safe strings; either way the
/// identifier travels as a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! record_id_from_int {
    ($($int:ty),*) => {
        $(
            impl From<$int> for RecordId {
                fn from(id: $int) -> Self {
                    Self(id.to_string())
                }
            }
        )*
    };
}

record_id_from_int!(i32, i64, u32, u64);

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Integer(i64),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(id) => RecordId(id),
            Repr::Integer(id) => RecordId::from(id),
        })
    }
}

/// Tokens issued by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub auth_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
}

/// Request payload for a password login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Request payload for logging out a refresh-token session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LogoutRequest {
    pub refresh_token: String,
}

/// Identifiers generated by a create call, in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct IdsResponse {
    pub ids: Vec<RecordId>,
}
