//! Synchronous client core for record APIs and atomic transactions.
//!
//! # Overview
//! Builds `HttpRequest` values and parses `HttpResponse` values without
//! touching the network (host-does-IO pattern). The caller executes the
//! actual HTTP round-trip, making the core fully deterministic and testable.
//!
//! # Design
//! - `Client` is immutable: it holds only `base_url` and optional tokens.
//! - `RecordApi<T>` offers create/read/update/delete/list on one named
//!   record API, split into `build_*` and `parse_*`.
//! - `TransactionBatch` collects create/update/delete operations across
//!   record APIs and submits them as one all-or-nothing request.
//! - Listing arguments (`Filter`, ordering, `Pagination`, count) encode to
//!   query parameters; pages decode strictly.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod error;
pub mod filter;
pub mod http;
pub mod list;
pub mod record_api;
pub mod transaction;
pub mod types;

pub use client::Client;
pub use error::ApiError;
pub use filter::{CompareOp, Filter};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use list::{ListArguments, ListResponse, Pagination};
pub use record_api::{record_value, RecordApi};
pub use transaction::{
    ApiBatch, CreateOperation, DeleteOperation, Operation, SentTransaction, TransactionBatch,
    TransactionRequest, TransactionResponse, UpdateOperation,
};
pub use types::{Credentials, JsonObject, RecordId, Tokens};
