//! C-ABI wrapper around `records-core`.
//!
//! # Overview
//! Exposes record CRUD, listing, transactions and login through `extern "C"`
//! functions so any language with a C FFI can build and parse HTTP
//! requests/responses without linking to Rust's async runtime or serde
//! directly. Records, list arguments and tokens cross the boundary as JSON.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Per-operation `build_*` / `parse_*` mirrors the core API 1:1. Builders
//!   return null on a null or malformed argument.
//! - A single `FfiRecordsResult` envelope with `FfiDataTag` + `void* data`
//!   conveys success payloads and errors uniformly.
//! - The C caller owns all returned pointers and must call the matching
//!   `records_free_*` or `*_free` function to release them.

pub mod types;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, RefUnwindSafe, UnwindSafe};

use records_core::{ApiError, Client, HttpResponse, JsonObject, ListArguments, RecordId};
use serde_json::Value;

use types::*;

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

/// Borrow a C string argument as UTF-8.
fn arg_str<'a>(ptr: *const c_char) -> Result<&'a str, FfiErrorCode> {
    if ptr.is_null() {
        return Err(FfiErrorCode::NullArg);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| FfiErrorCode::InvalidArgument)
}

/// Parse a C string argument holding a JSON object.
fn arg_object(ptr: *const c_char) -> Result<JsonObject, FfiErrorCode> {
    match serde_json::from_str(arg_str(ptr)?) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(FfiErrorCode::InvalidArgument),
        Err(_) => Err(FfiErrorCode::Deserialization),
    }
}

/// Convert an `FfiHttpResponse` to a core `HttpResponse`. A null body is an
/// empty body; a body that is not UTF-8 is a deserialization error.
fn ffi_response_to_core(resp: &FfiHttpResponse) -> Result<HttpResponse, ApiError> {
    let body = if resp.body.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(resp.body) }
            .to_str()
            .map_err(|err| {
                ApiError::DeserializationError(format!("response body is not UTF-8: {err}"))
            })?
            .to_string()
    };
    Ok(HttpResponse::new(resp.status, body))
}

/// Shared body of the facade parse functions: null checks, response
/// conversion and panic capture.
fn parse_with<H, F>(
    handle: *const H,
    response: *const FfiHttpResponse,
    name: &str,
    parse: F,
) -> *mut FfiRecordsResult
where
    H: RefUnwindSafe,
    F: FnOnce(&H, HttpResponse) -> *mut FfiRecordsResult + UnwindSafe,
{
    catch_unwind(|| {
        if handle.is_null() {
            return FfiRecordsResult::null_arg("handle");
        }
        if response.is_null() {
            return FfiRecordsResult::null_arg("response");
        }
        let handle = unsafe { &*handle };
        let resp = unsafe { &*response };
        match ffi_response_to_core(resp) {
            Ok(resp) => parse(handle, resp),
            Err(e) => FfiRecordsResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiRecordsResult::panic(&format!("panic in {name}")))
}

// ---------------------------------------------------------------------------
// Client lifecycle and auth
// ---------------------------------------------------------------------------

/// Create a new `Client` bound to `base_url`.
///
/// Returns null if `base_url` is null or not UTF-8, or if an internal panic
/// occurs. The caller must free the returned pointer with
/// `records_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn records_client_new(base_url: *const c_char) -> *mut FfiRecordsClient {
    catch_unwind(|| match arg_str(base_url) {
        Ok(url) => Box::into_raw(Box::new(FfiRecordsClient {
            inner: Client::new(url),
        })),
        Err(_) => std::ptr::null_mut(),
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `records_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn records_client_free(client: *mut FfiRecordsClient) {
    if !client.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(client) });
        });
    }
}

/// Build a password login request.
#[unsafe(no_mangle)]
pub extern "C" fn records_build_login(
    client: *const FfiRecordsClient,
    email: *const c_char,
    password: *const c_char,
) -> *mut FfiHttpRequest {
    catch_unwind(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let client = unsafe { &*client };
        let (Ok(email), Ok(password)) = (arg_str(email), arg_str(password)) else {
            return std::ptr::null_mut();
        };
        match client.inner.build_login(email, password) {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Parse a login response and store the tokens in `client`.
///
/// Returns a result with `data_tag = Json` (the tokens) on success. Handles
/// created with `records_api_new` or `records_batch_new` before this call
/// keep the tokens they were created with.
#[unsafe(no_mangle)]
pub extern "C" fn records_parse_login(
    client: *mut FfiRecordsClient,
    response: *const FfiHttpResponse,
) -> *mut FfiRecordsResult {
    catch_unwind(|| {
        if client.is_null() {
            return FfiRecordsResult::null_arg("client");
        }
        if response.is_null() {
            return FfiRecordsResult::null_arg("response");
        }
        let client = unsafe { &mut *client };
        let resp = match ffi_response_to_core(unsafe { &*response }) {
            Ok(resp) => resp,
            Err(e) => return FfiRecordsResult::from_error(e),
        };
        match client.inner.parse_login(resp) {
            Ok(tokens) => {
                let result = FfiRecordsResult::ok_json(&tokens);
                client.inner = client.inner.clone().with_tokens(tokens);
                result
            }
            Err(e) => FfiRecordsResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiRecordsResult::panic("panic in records_parse_login"))
}

/// Build a logout request for the tokens held by `client`.
#[unsafe(no_mangle)]
pub extern "C" fn records_build_logout(client: *const FfiRecordsClient) -> *mut FfiHttpRequest {
    catch_unwind(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let client = unsafe { &*client };
        match client.inner.build_logout() {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Parse a logout response. On success the tokens are dropped from `client`.
#[unsafe(no_mangle)]
pub extern "C" fn records_parse_logout(
    client: *mut FfiRecordsClient,
    response: *const FfiHttpResponse,
) -> *mut FfiRecordsResult {
    catch_unwind(|| {
        if client.is_null() {
            return FfiRecordsResult::null_arg("client");
        }
        if response.is_null() {
            return FfiRecordsResult::null_arg("response");
        }
        let client = unsafe { &mut *client };
        let resp = match ffi_response_to_core(unsafe { &*response }) {
            Ok(resp) => resp,
            Err(e) => return FfiRecordsResult::from_error(e),
        };
        match client.inner.parse_logout(resp) {
            Ok(()) => {
                client.inner = client.inner.clone().without_tokens();
                FfiRecordsResult::ok_empty()
            }
            Err(e) => FfiRecordsResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiRecordsResult::panic("panic in records_parse_logout"))
}

// ---------------------------------------------------------------------------
// Record API facade
// ---------------------------------------------------------------------------

/// Open the record API `name` with the client's current tokens.
///
/// Free with `records_api_free`.
#[unsafe(no_mangle)]
pub extern "C" fn records_api_new(
    client: *const FfiRecordsClient,
    name: *const c_char,
) -> *mut FfiRecordApi {
    catch_unwind(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let client = unsafe { &*client };
        match arg_str(name) {
            Ok(name) => Box::into_raw(Box::new(FfiRecordApi {
                inner: client.inner.records(name),
            })),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a handle created by `records_api_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn records_api_free(api: *mut FfiRecordApi) {
    if !api.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(api) });
        });
    }
}

/// Build a create request. `record_json` must be a JSON object.
///
/// Returns null if an argument is null or `record_json` is not an object.
/// The caller must free the returned pointer with `records_free_request`.
#[unsafe(no_mangle)]
pub extern "C" fn records_build_create(
    api: *const FfiRecordApi,
    record_json: *const c_char,
) -> *mut FfiHttpRequest {
    catch_unwind(|| {
        if api.is_null() {
            return std::ptr::null_mut();
        }
        let api = unsafe { &*api };
        let Ok(record) = arg_object(record_json) else {
            return std::ptr::null_mut();
        };
        match api.inner.build_create(&Value::Object(record)) {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Build a read request. `expand` is an optional comma-separated list of
/// foreign-key columns to inline; pass null for none.
#[unsafe(no_mangle)]
pub extern "C" fn records_build_read(
    api: *const FfiRecordApi,
    id: *const c_char,
    expand: *const c_char,
) -> *mut FfiHttpRequest {
    catch_unwind(|| {
        if api.is_null() {
            return std::ptr::null_mut();
        }
        let api = unsafe { &*api };
        let Ok(id) = arg_str(id) else {
            return std::ptr::null_mut();
        };
        let expand: Vec<&str> = if expand.is_null() {
            Vec::new()
        } else {
            match arg_str(expand) {
                Ok(list) => list.split(',').filter(|c| !c.is_empty()).collect(),
                Err(_) => return std::ptr::null_mut(),
            }
        };
        FfiHttpRequest::from_core(api.inner.build_read_expanded(&RecordId::from(id), &expand))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Build a partial update request. `record_json` must be a JSON object.
#[unsafe(no_mangle)]
pub extern "C" fn records_build_update(
    api: *const FfiRecordApi,
    id: *const c_char,
    record_json: *const c_char,
) -> *mut FfiHttpRequest {
    catch_unwind(|| {
        if api.is_null() {
            return std::ptr::null_mut();
        }
        let api = unsafe { &*api };
        let (Ok(id), Ok(record)) = (arg_str(id), arg_object(record_json)) else {
            return std::ptr::null_mut();
        };
        match api.inner.build_update(&RecordId::from(id), &Value::Object(record)) {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub extern "C" fn records_build_delete(
    api: *const FfiRecordApi,
    id: *const c_char,
) -> *mut FfiHttpRequest {
    catch_unwind(|| {
        if api.is_null() {
            return std::ptr::null_mut();
        }
        let api = unsafe { &*api };
        match arg_str(id) {
            Ok(id) => FfiHttpRequest::from_core(api.inner.build_delete(&RecordId::from(id))),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Build a list request.
///
/// `args_json` holds `ListArguments` as JSON, e.g.
/// `{"filters":[{"column":{"column":"text","op":"like","value":"%"}}],"order":["-text"],"count":true}`.
/// Null means no arguments. Returns null if the arguments do not decode or
/// are rejected (an order entry without `+`/`-`, an empty group).
#[unsafe(no_mangle)]
pub extern "C" fn records_build_list(
    api: *const FfiRecordApi,
    args_json: *const c_char,
) -> *mut FfiHttpRequest {
    catch_unwind(|| {
        if api.is_null() {
            return std::ptr::null_mut();
        }
        let api = unsafe { &*api };
        let args: ListArguments = if args_json.is_null() {
            ListArguments::default()
        } else {
            let parsed = arg_str(args_json)
                .ok()
                .and_then(|json| serde_json::from_str(json).ok());
            match parsed {
                Some(args) => args,
                None => return std::ptr::null_mut(),
            }
        };
        match api.inner.build_list(&args) {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Parse a create response. Returns `data_tag = Id` on success.
#[unsafe(no_mangle)]
pub extern "C" fn records_parse_create(
    api: *const FfiRecordApi,
    response: *const FfiHttpResponse,
) -> *mut FfiRecordsResult {
    parse_with(api, response, "records_parse_create", |api, resp| {
        match api.inner.parse_create(resp) {
            Ok(id) => FfiRecordsResult::ok_id(id),
            Err(e) => FfiRecordsResult::from_error(e),
        }
    })
}

/// Parse a read response. Returns `data_tag = Json` (the record) on success
/// and `NotFound` for a missing record.
#[unsafe(no_mangle)]
pub extern "C" fn records_parse_read(
    api: *const FfiRecordApi,
    response: *const FfiHttpResponse,
) -> *mut FfiRecordsResult {
    parse_with(api, response, "records_parse_read", |api, resp| {
        match api.inner.parse_read(resp) {
            Ok(record) => FfiRecordsResult::ok_json(&record),
            Err(e) => FfiRecordsResult::from_error(e),
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn records_parse_update(
    api: *const FfiRecordApi,
    response: *const FfiHttpResponse,
) -> *mut FfiRecordsResult {
    parse_with(api, response, "records_parse_update", |api, resp| {
        match api.inner.parse_update(resp) {
            Ok(()) => FfiRecordsResult::ok_empty(),
            Err(e) => FfiRecordsResult::from_error(e),
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn records_parse_delete(
    api: *const FfiRecordApi,
    response: *const FfiHttpResponse,
) -> *mut FfiRecordsResult {
    parse_with(api, response, "records_parse_delete", |api, resp| {
        match api.inner.parse_delete(resp) {
            Ok(()) => FfiRecordsResult::ok_empty(),
            Err(e) => FfiRecordsResult::from_error(e),
        }
    })
}

/// Parse a list response. Returns `data_tag = ListPage` on success.
#[unsafe(no_mangle)]
pub extern "C" fn records_parse_list(
    api: *const FfiRecordApi,
    response: *const FfiHttpResponse,
) -> *mut FfiRecordsResult {
    parse_with(api, response, "records_parse_list", |api, resp| {
        match api.inner.parse_list(resp) {
            Ok(page) => FfiRecordsResult::ok_list_page(page),
            Err(e) => FfiRecordsResult::from_error(e),
        }
    })
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Start an empty transaction batch with the client's current tokens.
///
/// Free with `records_batch_free` unless it is consumed by
/// `records_batch_send`.
#[unsafe(no_mangle)]
pub extern "C" fn records_batch_new(client: *const FfiRecordsClient) -> *mut FfiBatch {
    catch_unwind(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let client = unsafe { &*client };
        Box::into_raw(Box::new(FfiBatch {
            inner: client.inner.transaction(),
        }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Append a create operation on `api_name`. `value_json` must be an object.
#[unsafe(no_mangle)]
pub extern "C" fn records_batch_create(
    batch: *mut FfiBatch,
    api_name: *const c_char,
    value_json: *const c_char,
) -> FfiErrorCode {
    catch_unwind(|| {
        if batch.is_null() {
            return FfiErrorCode::NullArg;
        }
        let api_name = match arg_str(api_name) {
            Ok(name) => name,
            Err(code) => return code,
        };
        let value = match arg_object(value_json) {
            Ok(value) => value,
            Err(code) => return code,
        };
        let batch = unsafe { &mut *batch };
        batch.inner.api(api_name).create(value);
        FfiErrorCode::Ok
    })
    .unwrap_or(FfiErrorCode::Panic)
}

/// Append an update operation on record `id` of `api_name`.
#[unsafe(no_mangle)]
pub extern "C" fn records_batch_update(
    batch: *mut FfiBatch,
    api_name: *const c_char,
    id: *const c_char,
    value_json: *const c_char,
) -> FfiErrorCode {
    catch_unwind(|| {
        if batch.is_null() {
            return FfiErrorCode::NullArg;
        }
        let (api_name, id) = match (arg_str(api_name), arg_str(id)) {
            (Ok(name), Ok(id)) => (name, id),
            (Err(code), _) | (_, Err(code)) => return code,
        };
        let value = match arg_object(value_json) {
            Ok(value) => value,
            Err(code) => return code,
        };
        let batch = unsafe { &mut *batch };
        batch.inner.api(api_name).update(id, value);
        FfiErrorCode::Ok
    })
    .unwrap_or(FfiErrorCode::Panic)
}

/// Append a delete operation on record `id` of `api_name`.
#[unsafe(no_mangle)]
pub extern "C" fn records_batch_delete(
    batch: *mut FfiBatch,
    api_name: *const c_char,
    id: *const c_char,
) -> FfiErrorCode {
    catch_unwind(|| {
        if batch.is_null() {
            return FfiErrorCode::NullArg;
        }
        let (api_name, id) = match (arg_str(api_name), arg_str(id)) {
            (Ok(name), Ok(id)) => (name, id),
            (Err(code), _) | (_, Err(code)) => return code,
        };
        let batch = unsafe { &mut *batch };
        batch.inner.api(api_name).delete(id);
        FfiErrorCode::Ok
    })
    .unwrap_or(FfiErrorCode::Panic)
}

/// Number of operations appended so far. 0 for null.
#[unsafe(no_mangle)]
pub extern "C" fn records_batch_len(batch: *const FfiBatch) -> u32 {
    catch_unwind(|| {
        if batch.is_null() {
            return 0;
        }
        let batch = unsafe { &*batch };
        batch.inner.len() as u32
    })
    .unwrap_or(0)
}

/// Serialize the batch into one execute request.
///
/// Consumes `batch` (do not free it afterwards) and writes the request to
/// `*out_request`, to be released with `records_free_request`. Returns the
/// handle that parses the response, or null on failure. When
/// `out_request` is null nothing is consumed.
#[unsafe(no_mangle)]
pub extern "C" fn records_batch_send(
    batch: *mut FfiBatch,
    out_request: *mut *mut FfiHttpRequest,
) -> *mut FfiSentTransaction {
    catch_unwind(|| {
        if batch.is_null() || out_request.is_null() {
            return std::ptr::null_mut();
        }
        let batch = unsafe { Box::from_raw(batch) };
        match batch.inner.send() {
            Ok(sent) => {
                unsafe { *out_request = FfiHttpRequest::from_core(sent.request().clone()) };
                Box::into_raw(Box::new(FfiSentTransaction { inner: sent }))
            }
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Parse the execute response. Returns `data_tag = IdList` with one id per
/// create operation, in append order.
///
/// Consumes `sent` unless an argument is null. A failure status yields an
/// error result and no ids.
#[unsafe(no_mangle)]
pub extern "C" fn records_parse_transaction(
    sent: *mut FfiSentTransaction,
    response: *const FfiHttpResponse,
) -> *mut FfiRecordsResult {
    catch_unwind(|| {
        if sent.is_null() {
            return FfiRecordsResult::null_arg("sent");
        }
        if response.is_null() {
            return FfiRecordsResult::null_arg("response");
        }
        let sent = unsafe { Box::from_raw(sent) };
        let resp = match ffi_response_to_core(unsafe { &*response }) {
            Ok(resp) => resp,
            Err(e) => return FfiRecordsResult::from_error(e),
        };
        match sent.inner.parse_response(resp) {
            Ok(response) => FfiRecordsResult::ok_id_list(response.ids),
            Err(e) => FfiRecordsResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiRecordsResult::panic("panic in records_parse_transaction"))
}

/// Free an unsent batch. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn records_batch_free(batch: *mut FfiBatch) {
    if !batch.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(batch) });
        });
    }
}

/// Free a sent transaction whose response will not be parsed. Safe to call
/// with null.
#[unsafe(no_mangle)]
pub extern "C" fn records_sent_transaction_free(sent: *mut FfiSentTransaction) {
    if !sent.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(sent) });
        });
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

fn free_c_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

/// Free an `FfiHttpRequest` returned by any build function.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn records_free_request(req: *mut FfiHttpRequest) {
    if req.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let req = unsafe { Box::from_raw(req) };
        free_c_string(req.path);
        free_c_string(req.body);
        for header in unsafe { from_raw_parts(req.headers, req.headers_len) } {
            free_c_string(header.key);
            free_c_string(header.value);
        }
    });
}

/// Free an `FfiRecordsResult` returned by any parse function.
/// Safe to call with null. Uses `data_tag` to determine what `data` points to.
#[unsafe(no_mangle)]
pub extern "C" fn records_free_result(result: *mut FfiRecordsResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        free_c_string(result.error_message);
        if result.data.is_null() {
            return;
        }
        match result.data_tag {
            FfiDataTag::Json | FfiDataTag::Id => free_c_string(result.data as *mut c_char),
            FfiDataTag::IdList => {
                let list = unsafe { Box::from_raw(result.data as *mut FfiStringList) };
                for item in unsafe { from_raw_parts(list.items, list.len) } {
                    free_c_string(item);
                }
            }
            FfiDataTag::ListPage => {
                let page = unsafe { Box::from_raw(result.data as *mut FfiListPage) };
                free_c_string(page.records_json);
                free_c_string(page.cursor);
            }
            FfiDataTag::None => {}
        }
    });
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn records_free_string(s: *mut c_char) {
    let _ = catch_unwind(|| free_c_string(s));
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
