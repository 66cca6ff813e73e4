//! Purpose: Scoped Rust ownership over the raw C ABI handles and buffers.
//! Exports: `Document`, `Status`, `BoundaryError`, `parse_file_to_json`, `parse_str_to_json`.
//! Role: Lets Rust callers (CLI, golden harness) exercise the exact C surface without manual frees.
//! Invariants: Every raw handle or buffer obtained here is released exactly once.
//! Invariants: Calls go through the exported `tyco_*` functions, never around them.
use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::c_char;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use serde_json::Value;

use crate::abi::{
    self, tyco_context, tyco_json_result, tyco_status, tyco_context_free, tyco_context_to_json,
    tyco_free_string, tyco_json_result_free, tyco_load_file, tyco_load_string,
};
use crate::core::context::TycoContext;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Ok,
    InvalidArgument,
    ParsingFailed,
    Internal,
}

impl Status {
    pub fn from_raw(raw: tyco_status) -> Self {
        match raw {
            tyco_status::TYCO_OK => Status::Ok,
            tyco_status::TYCO_ERROR_INVALID_ARGUMENT => Status::InvalidArgument,
            tyco_status::TYCO_ERROR_PARSING => Status::ParsingFailed,
            tyco_status::TYCO_ERROR_INTERNAL => Status::Internal,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::InvalidArgument => 1,
            Status::ParsingFailed => 2,
            Status::Internal => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::InvalidArgument => "invalid_argument",
            Status::ParsingFailed => "parsing_failed",
            Status::Internal => "internal",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BoundaryError {
    status: Status,
    message: String,
}

impl BoundaryError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn from_raw(status: tyco_status, error: *mut c_char) -> Self {
        let message = take_string(error).unwrap_or_else(|| "unknown error".to_string());
        Self::new(Status::from_raw(status), message)
    }
}

impl fmt::Display for BoundaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.label(), self.message)
    }
}

impl std::error::Error for BoundaryError {}

/// A loaded document. Dropping it calls `tyco_context_free`.
#[derive(Debug)]
pub struct Document {
    raw: NonNull<tyco_context>,
}

// The handle points at an immutable, rendered context behind an `Arc`.
unsafe impl Send for Document {}
unsafe impl Sync for Document {}

impl Document {
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, BoundaryError> {
        let path = path_to_cstring(path.as_ref())?;
        let mut ctx = ptr::null_mut();
        let mut error = ptr::null_mut();
        let status = tyco_load_file(path.as_ptr(), &mut ctx, &mut error);
        Self::from_load(status, ctx, error)
    }

    pub fn load_str(source: &str, source_name: Option<&str>) -> Result<Self, BoundaryError> {
        let source = CString::new(source).map_err(|_| {
            BoundaryError::new(Status::InvalidArgument, "source contains an interior NUL byte")
        })?;
        let name = source_name
            .map(|name| {
                CString::new(name).map_err(|_| {
                    BoundaryError::new(
                        Status::InvalidArgument,
                        "source name contains an interior NUL byte",
                    )
                })
            })
            .transpose()?;
        let mut ctx = ptr::null_mut();
        let mut error = ptr::null_mut();
        let status = tyco_load_string(
            source.as_ptr(),
            name.as_ref().map_or(ptr::null(), |name| name.as_ptr()),
            &mut ctx,
            &mut error,
        );
        Self::from_load(status, ctx, error)
    }

    fn from_load(
        status: tyco_status,
        ctx: *mut tyco_context,
        error: *mut c_char,
    ) -> Result<Self, BoundaryError> {
        if status != tyco_status::TYCO_OK {
            // Success-only outputs are null on failure; free defensively anyway.
            tyco_context_free(ctx);
            return Err(BoundaryError::from_raw(status, error));
        }
        tyco_free_string(error);
        NonNull::new(ctx)
            .map(|raw| Self { raw })
            .ok_or_else(|| BoundaryError::new(Status::Internal, "load returned a null handle"))
    }

    pub fn to_json(&self) -> Result<String, BoundaryError> {
        let mut json = ptr::null_mut();
        let mut error = ptr::null_mut();
        let status = tyco_context_to_json(self.raw.as_ptr(), &mut json, &mut error);
        if status != tyco_status::TYCO_OK {
            tyco_free_string(json);
            return Err(BoundaryError::from_raw(status, error));
        }
        tyco_free_string(error);
        take_string(json)
            .ok_or_else(|| BoundaryError::new(Status::Internal, "serialize returned a null buffer"))
    }

    pub fn to_value(&self) -> Result<Value, BoundaryError> {
        let json = self.to_json()?;
        serde_json::from_str(&json).map_err(|err| {
            BoundaryError::new(Status::Internal, format!("engine produced invalid JSON: {err}"))
        })
    }

    /// Another owner of the underlying context; it outlives this handle if kept.
    pub fn share(&self) -> Arc<TycoContext> {
        unsafe { self.raw.as_ref() }.context().clone()
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        tyco_context_free(self.raw.as_ptr());
    }
}

/// One-shot load and serialize through `tyco_parse_file_to_json`.
pub fn parse_file_to_json(path: impl AsRef<Path>) -> Result<String, BoundaryError> {
    let path = path_to_cstring(path.as_ref())?;
    JsonResult(abi::tyco_parse_file_to_json(path.as_ptr())).into_result()
}

/// One-shot load and serialize through `tyco_parse_string_to_json`.
pub fn parse_str_to_json(source: &str, source_name: Option<&str>) -> Result<String, BoundaryError> {
    let source = CString::new(source).map_err(|_| {
        BoundaryError::new(Status::InvalidArgument, "source contains an interior NUL byte")
    })?;
    let name = match source_name.map(CString::new).transpose() {
        Ok(name) => name,
        Err(_) => {
            return Err(BoundaryError::new(
                Status::InvalidArgument,
                "source name contains an interior NUL byte",
            ));
        }
    };
    let name_ptr = name.as_ref().map_or(ptr::null(), |name| name.as_ptr());
    JsonResult(abi::tyco_parse_string_to_json(source.as_ptr(), name_ptr)).into_result()
}

struct JsonResult(tyco_json_result);

impl JsonResult {
    fn into_result(mut self) -> Result<String, BoundaryError> {
        let status = Status::from_raw(self.0.status);
        let json = copy_string(self.0.json);
        let error = copy_string(self.0.error);
        tyco_json_result_free(&mut self.0);
        match (status, json) {
            (Status::Ok, Some(json)) => Ok(json),
            (Status::Ok, None) => Err(BoundaryError::new(
                Status::Internal,
                "aggregate result is missing its JSON buffer",
            )),
            (status, _) => Err(BoundaryError::new(
                status,
                error.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

impl Drop for JsonResult {
    fn drop(&mut self) {
        tyco_json_result_free(&mut self.0);
    }
}

fn path_to_cstring(path: &Path) -> Result<CString, BoundaryError> {
    let text = path.to_str().ok_or_else(|| {
        BoundaryError::new(Status::InvalidArgument, "path is not valid UTF-8")
    })?;
    CString::new(text).map_err(|_| {
        BoundaryError::new(Status::InvalidArgument, "path contains an interior NUL byte")
    })
}

fn copy_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

fn take_string(ptr: *mut c_char) -> Option<String> {
    let text = copy_string(ptr);
    tyco_free_string(ptr);
    text
}

#[cfg(test)]
mod tests {
    use super::{Document, Status, parse_file_to_json, parse_str_to_json};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn load_and_serialize() {
        let doc = Document::load_str("str name: demo\n", None).expect("load");
        assert_eq!(doc.to_json().expect("json"), r#"{"name":"demo"}"#);
        assert_eq!(doc.to_value().expect("value"), json!({"name": "demo"}));
    }

    #[test]
    fn load_errors_keep_status_and_message() {
        let err = Document::load_str("int x: nope\n", Some("cfg")).unwrap_err();
        assert_eq!(err.status(), Status::ParsingFailed);
        assert!(err.message().starts_with("cfg:1: type error"), "{err}");
        assert!(err.to_string().starts_with("parsing_failed: "));
    }

    #[test]
    fn interior_nul_is_rejected_locally() {
        let err = Document::load_str("int a: 1\0", None).unwrap_err();
        assert_eq!(err.status(), Status::InvalidArgument);
    }

    #[test]
    fn shared_context_outlives_document() {
        let doc = Document::load_str("int a: 1\n", None).expect("load");
        let shared = doc.share();
        drop(doc);
        assert_eq!(Arc::strong_count(&shared), 1);
        assert_eq!(shared.to_json().expect("json"), r#"{"a":1}"#);
    }

    #[test]
    fn concurrent_serialization_of_one_handle() {
        let doc = Document::load_str(
            "Db:\n *str name:\n  int port: 1\n  - a\n  - b, port: 2\n",
            None,
        )
        .expect("load");
        let expected = doc.to_json().expect("json");
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| doc.to_json().expect("json")))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().expect("join"), expected);
            }
        });
    }

    #[test]
    fn one_shot_helpers() {
        assert_eq!(parse_str_to_json("", None).expect("json"), "{}");
        let err = parse_str_to_json("bool b: maybe\n", None).unwrap_err();
        assert_eq!(err.status(), Status::ParsingFailed);

        let dir = tempfile::tempdir().expect("tempdir");
        let err = parse_file_to_json(dir.path().join("missing.tyco")).unwrap_err();
        assert_eq!(err.status(), Status::ParsingFailed);
        assert!(!err.message().is_empty());
    }

    #[test]
    fn status_codes_match_the_c_enum() {
        for (status, code) in [
            (Status::Ok, 0),
            (Status::InvalidArgument, 1),
            (Status::ParsingFailed, 2),
            (Status::Internal, 3),
        ] {
            assert_eq!(status.code(), code);
        }
    }
}
