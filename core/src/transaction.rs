//! Multi-operation transactions executed atomically by the backend.
//!
//! # Design
//! `Operation` is a closed sum type encoded as an externally tagged union:
//! exactly one of `Create`, `Update` or `Delete` appears as the single
//! top-level key, and the other variants are absent rather than `null`.
//!
//! A `TransactionBatch` collects operations in call order. `send` consumes
//! the batch and yields a `SentTransaction`, which knows how many creates it
//! carried and parses the response into exactly that many identifiers.
//! Clone the batch before sending to re-submit the same operations; retried
//! creates insert duplicate records.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{check_status, Client};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{JsonObject, RecordId};

pub const TRANSACTION_PATH: &str = "/api/transactions/v1/execute";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOperation {
    pub api_name: String,
    pub value: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateOperation {
    pub api_name: String,
    pub id: RecordId,
    pub value: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteOperation {
    pub api_name: String,
    pub id: RecordId,
}

/// One operation of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Create(CreateOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
}

impl Operation {
    pub fn api_name(&self) -> &str {
        match self {
            Operation::Create(op) => &op.api_name,
            Operation::Update(op) => &op.api_name,
            Operation::Delete(op) => &op.api_name,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Operation::Create(_))
    }
}

/// Wire body of `POST /api/transactions/v1/execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionRequest {
    pub operations: Vec<Operation>,
}

/// Identifiers generated by the transaction's create operations, in the
/// order those creates were appended. Updates and deletes contribute none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionResponse {
    pub ids: Vec<String>,
}

impl TransactionResponse {
    pub fn record_ids(&self) -> Vec<RecordId> {
        self.ids.iter().map(|id| RecordId::from(id.as_str())).collect()
    }
}

/// Ordered operations awaiting submission.
///
/// Not meant for shared mutation: append order is significant, so a batch
/// has a single owner.
#[derive(Debug, Clone)]
pub struct TransactionBatch {
    client: Client,
    operations: Vec<Operation>,
}

impl TransactionBatch {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            operations: Vec::new(),
        }
    }

    /// Scope the following operation to the record API `api_name`.
    pub fn api(&mut self, api_name: impl Into<String>) -> ApiBatch<'_> {
        ApiBatch {
            batch: self,
            api_name: api_name.into(),
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn add_operation(&mut self, operation: Operation) -> &mut Self {
        self.operations.push(operation);
        self
    }

    /// Serialize every appended operation into one request.
    pub fn send(self) -> Result<SentTransaction, ApiError> {
        let creates = self.operations.iter().filter(|op| op.is_create()).count();
        debug!(
            operations = self.operations.len(),
            creates, "building transaction request"
        );

        let body = TransactionRequest {
            operations: self.operations,
        };
        let body = serde_json::to_string(&body).map_err(ApiError::serialization)?;
        let request = self
            .client
            .request(HttpMethod::Post, TRANSACTION_PATH, Some(body));

        Ok(SentTransaction { request, creates })
    }
}

/// Scoping handle returned by [`TransactionBatch::api`].
///
/// Each call appends one operation and hands back the parent batch, so
/// operations on different APIs interleave in a single global order.
#[derive(Debug)]
pub struct ApiBatch<'a> {
    batch: &'a mut TransactionBatch,
    api_name: String,
}

impl<'a> ApiBatch<'a> {
    pub fn create(self, value: JsonObject) -> &'a mut TransactionBatch {
        self.batch.add_operation(Operation::Create(CreateOperation {
            api_name: self.api_name,
            value,
        }))
    }

    pub fn update(self, id: impl Into<RecordId>, value: JsonObject) -> &'a mut TransactionBatch {
        self.batch.add_operation(Operation::Update(UpdateOperation {
            api_name: self.api_name,
            id: id.into(),
            value,
        }))
    }

    pub fn delete(self, id: impl Into<RecordId>) -> &'a mut TransactionBatch {
        self.batch.add_operation(Operation::Delete(DeleteOperation {
            api_name: self.api_name,
            id: id.into(),
        }))
    }
}

/// A serialized transaction awaiting its response.
#[derive(Debug, Clone)]
pub struct SentTransaction {
    request: HttpRequest,
    creates: usize,
}

impl SentTransaction {
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Number of create operations, and therefore of expected identifiers.
    pub fn creates(&self) -> usize {
        self.creates
    }

    /// Parse the execute response.
    ///
    /// Any failure status aborts the whole transaction: no identifiers are
    /// returned even if some operations would have succeeded on their own.
    pub fn parse_response(self, response: HttpResponse) -> Result<TransactionResponse, ApiError> {
        check_status(&response, 200)?;
        let parsed: TransactionResponse =
            serde_json::from_str(&response.body).map_err(ApiError::deserialization)?;
        if parsed.ids.len() != self.creates {
            return Err(ApiError::ProtocolViolation(format!(
                "expected one id per create operation ({}), got {}",
                self.creates,
                parsed.ids.len()
            )));
        }
        Ok(parsed)
    }
}
