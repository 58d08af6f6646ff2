//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Handles (`FfiRecordsClient`, `FfiRecordApi`, `FfiBatch`,
//! `FfiSentTransaction`) are opaque boxes around core values. Requests and
//! results are plain C structs: `*mut c_char` instead of `String`, raw
//! pointers instead of `Vec`, and tagged enums with explicit discriminants.
//! Record payloads cross the boundary as JSON text. Conversion functions
//! live here to keep `lib.rs` focused on the `extern "C"` surface.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;

use records_core::{
    ApiError, Client, HttpMethod, HttpRequest, ListResponse, RecordApi, RecordId,
    SentTransaction, TransactionBatch,
};
use serde_json::Value;

/// Opaque handle to a `Client`, including any tokens stored by login.
pub struct FfiRecordsClient {
    pub(crate) inner: Client,
}

/// Opaque handle to a record API facade. Records are untyped JSON.
pub struct FfiRecordApi {
    pub(crate) inner: RecordApi<Value>,
}

/// Opaque handle to a transaction batch that is still being built.
pub struct FfiBatch {
    pub(crate) inner: TransactionBatch,
}

/// Opaque handle to a sent batch awaiting its execute response.
pub struct FfiSentTransaction {
    pub(crate) inner: SentTransaction,
}

/// Copy `s` into a C string owned by the caller. Interior NUL bytes, which
/// serde_json never emits, are dropped.
pub(crate) fn into_c_string(s: String) -> *mut c_char {
    let c_string = CString::new(s).unwrap_or_else(|err| {
        let mut bytes = err.into_vec();
        bytes.retain(|b| *b != 0);
        CString::new(bytes).unwrap_or_default()
    });
    c_string.into_raw()
}

/// Move `items` to the heap and leak it as a pointer/length pair.
pub(crate) fn into_raw_parts<T>(items: Vec<T>) -> (*mut T, u32) {
    if items.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    let len = items.len() as u32;
    let boxed = items.into_boxed_slice();
    (Box::into_raw(boxed) as *mut T, len)
}

/// Reclaim a pointer/length pair produced by `into_raw_parts`.
///
/// # Safety
/// `ptr` and `len` must come from one `into_raw_parts` call and not have
/// been reclaimed before.
pub(crate) unsafe fn from_raw_parts<T>(ptr: *mut T, len: u32) -> Vec<T> {
    if ptr.is_null() || len == 0 {
        return Vec::new();
    }
    let slice = std::ptr::slice_from_raw_parts_mut(ptr, len as usize);
    unsafe { Box::from_raw(slice) }.into_vec()
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Patch = 2,
    Delete = 3,
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => FfiHttpMethod::Get,
            HttpMethod::Post => FfiHttpMethod::Post,
            HttpMethod::Patch => FfiHttpMethod::Patch,
            HttpMethod::Delete => FfiHttpMethod::Delete,
        }
    }
}

/// A single HTTP header as a key-value pair of C strings.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// An HTTP request described as C-compatible plain data.
///
/// Built by `records_build_*` and `records_batch_send`. The C caller
/// executes the request and passes the response back through
/// `records_parse_*`.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: FfiHttpMethod,
    pub path: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub body: *mut c_char,
}

impl FfiHttpRequest {
    /// Convert a core `HttpRequest` into a heap-allocated `FfiHttpRequest`.
    pub(crate) fn from_core(req: HttpRequest) -> *mut Self {
        let headers: Vec<FfiHeader> = req
            .headers
            .into_iter()
            .map(|(k, v)| FfiHeader {
                key: into_c_string(k),
                value: into_c_string(v),
            })
            .collect();
        let (headers, headers_len) = into_raw_parts(headers);

        Box::into_raw(Box::new(FfiHttpRequest {
            method: req.method.into(),
            path: into_c_string(req.path),
            headers,
            headers_len,
            body: req.body.map_or(std::ptr::null_mut(), into_c_string),
        }))
    }
}

/// An HTTP response described as C-compatible plain data.
///
/// The C caller constructs this on the stack after executing a request,
/// then passes a pointer to a `records_parse_*` function. The FFI layer
/// reads but does not free these fields.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status: u16,
    pub body: *const c_char,
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Error codes returned in `FfiRecordsResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    NotFound = 1,
    Http = 2,
    Deserialization = 3,
    Serialization = 4,
    ProtocolViolation = 5,
    InvalidArgument = 6,
    Transport = 7,
    Panic = 8,
    NullArg = 9,
}

impl From<&ApiError> for FfiErrorCode {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::NotFound => FfiErrorCode::NotFound,
            ApiError::HttpError { .. } => FfiErrorCode::Http,
            ApiError::DeserializationError(_) => FfiErrorCode::Deserialization,
            ApiError::SerializationError(_) => FfiErrorCode::Serialization,
            ApiError::ProtocolViolation(_) => FfiErrorCode::ProtocolViolation,
            ApiError::InvalidArgument(_) => FfiErrorCode::InvalidArgument,
            ApiError::Transport(_) => FfiErrorCode::Transport,
        }
    }
}

/// Tag that tells `records_free_result` what `FfiRecordsResult::data`
/// points to.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiDataTag {
    None = 0,
    /// `data` is a `char*` holding a JSON document.
    Json = 1,
    /// `data` is a `char*` holding one record id.
    Id = 2,
    /// `data` is an `FfiStringList*` of record ids.
    IdList = 3,
    /// `data` is an `FfiListPage*`.
    ListPage = 4,
}

/// An owned array of C strings.
#[repr(C)]
pub struct FfiStringList {
    pub items: *mut *mut c_char,
    pub len: u32,
}

/// One page of a listing.
///
/// `records_json` is a JSON array. `cursor` is null when the server sent
/// none. `total_count` is -1 unless a count was requested.
#[repr(C)]
pub struct FfiListPage {
    pub records_json: *mut c_char,
    pub cursor: *mut c_char,
    pub total_count: i64,
}

/// Result envelope for all parse operations.
///
/// On success `error_code` is `Ok`, `error_message` is null, and `data`
/// points to the parsed payload (tagged by `data_tag`).
/// On failure `error_code` describes the category, `error_message` is a
/// human-readable C string, and `data` is null.
#[repr(C)]
pub struct FfiRecordsResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub http_status: u16,
    pub data_tag: FfiDataTag,
    pub data: *mut c_void,
}

impl FfiRecordsResult {
    fn ok(data_tag: FfiDataTag, data: *mut c_void) -> *mut Self {
        Box::into_raw(Box::new(FfiRecordsResult {
            error_code: FfiErrorCode::Ok,
            error_message: std::ptr::null_mut(),
            http_status: 0,
            data_tag,
            data,
        }))
    }

    fn failure(error_code: FfiErrorCode, http_status: u16, msg: String) -> *mut Self {
        Box::into_raw(Box::new(FfiRecordsResult {
            error_code,
            error_message: into_c_string(msg),
            http_status,
            data_tag: FfiDataTag::None,
            data: std::ptr::null_mut(),
        }))
    }

    /// Build a success result with no data payload (e.g. delete).
    pub(crate) fn ok_empty() -> *mut Self {
        Self::ok(FfiDataTag::None, std::ptr::null_mut())
    }

    /// Build a success result carrying `value` as JSON text.
    pub(crate) fn ok_json<T: serde::Serialize>(value: &T) -> *mut Self {
        match serde_json::to_string(value) {
            Ok(json) => Self::ok(FfiDataTag::Json, into_c_string(json) as *mut c_void),
            Err(err) => Self::from_error(ApiError::SerializationError(err.to_string())),
        }
    }

    pub(crate) fn ok_id(id: RecordId) -> *mut Self {
        Self::ok(FfiDataTag::Id, into_c_string(id.into_string()) as *mut c_void)
    }

    /// Build a success result carrying ids in response order.
    pub(crate) fn ok_id_list(ids: Vec<String>) -> *mut Self {
        let (items, len) = into_raw_parts(ids.into_iter().map(into_c_string).collect());
        let list = Box::new(FfiStringList { items, len });
        Self::ok(FfiDataTag::IdList, Box::into_raw(list) as *mut c_void)
    }

    pub(crate) fn ok_list_page(page: ListResponse<Value>) -> *mut Self {
        let records_json = match serde_json::to_string(&page.records) {
            Ok(json) => json,
            Err(err) => return Self::from_error(ApiError::SerializationError(err.to_string())),
        };
        let total_count = page
            .total_count
            .and_then(|n| i64::try_from(n).ok())
            .unwrap_or(-1);
        let ffi_page = Box::new(FfiListPage {
            records_json: into_c_string(records_json),
            cursor: page.cursor.map_or(std::ptr::null_mut(), into_c_string),
            total_count,
        });
        Self::ok(FfiDataTag::ListPage, Box::into_raw(ffi_page) as *mut c_void)
    }

    /// Build an error result from an `ApiError`.
    pub(crate) fn from_error(err: ApiError) -> *mut Self {
        let http_status = match &err {
            ApiError::NotFound => 404,
            ApiError::HttpError { status, .. } => *status,
            _ => 0,
        };
        Self::failure(FfiErrorCode::from(&err), http_status, err.to_string())
    }

    /// Build an error result for a null argument.
    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::failure(FfiErrorCode::NullArg, 0, format!("null argument: {name}"))
    }

    /// Build an error result for a caught panic.
    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::failure(FfiErrorCode::Panic, 0, msg.to_string())
    }
}
