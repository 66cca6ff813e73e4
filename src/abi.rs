//! Purpose: C ABI bridge for Tyco documents (libtyco).
//! Exports: `tyco_load_file`, `tyco_load_string`, `tyco_context_to_json`, free functions,
//! and the one-shot `tyco_parse_*_to_json` helpers.
//! Role: Stable ABI surface for non-Rust callers; declared in `include/tyco_c.h`.
//! Invariants: Every entry point returns a `tyco_status`; panics never unwind into C.
//! Invariants: Success-only outputs are null whenever the status is not `TYCO_OK`.
//! Invariants: Buffers handed out here are freed only by `tyco_free_string`.
//! Notes: Entry points are thin shells over `*_with` functions that take the engine as input.
#![allow(non_camel_case_types)]

use crate::core::context::TycoContext;
use crate::core::engine::{Engine, TycoEngine};
use crate::core::error::{Error, ErrorKind};
use std::any::Any;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;
use std::sync::Arc;
use tracing::{debug, warn};

pub const NULL_ARGUMENT_MESSAGE: &str = "Invalid argument: null pointer";
pub const OUT_OF_MEMORY_MESSAGE: &str = "Out of memory";
pub const DEFAULT_SOURCE_NAME: &str = "<string>";

#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum tyco_status {
    TYCO_OK = 0,
    TYCO_ERROR_INVALID_ARGUMENT = 1,
    TYCO_ERROR_PARSING = 2,
    TYCO_ERROR_INTERNAL = 3,
}

/// Opaque handle to a rendered document. The `Arc` may be shared with Rust owners.
#[repr(C)]
pub struct tyco_context {
    context: Arc<TycoContext>,
}

impl tyco_context {
    pub fn context(&self) -> &Arc<TycoContext> {
        &self.context
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct tyco_json_result {
    pub status: tyco_status,
    pub json: *mut c_char,
    pub error: *mut c_char,
}

impl tyco_json_result {
    fn empty() -> Self {
        Self {
            status: tyco_status::TYCO_OK,
            json: ptr::null_mut(),
            error: ptr::null_mut(),
        }
    }
}

pub fn status_for_kind(kind: ErrorKind) -> tyco_status {
    match kind {
        ErrorKind::Usage => tyco_status::TYCO_ERROR_INVALID_ARGUMENT,
        kind if kind.is_document_failure() => tyco_status::TYCO_ERROR_PARSING,
        _ => tyco_status::TYCO_ERROR_INTERNAL,
    }
}

#[derive(Debug)]
struct Failure {
    status: tyco_status,
    message: String,
}

impl Failure {
    fn new(status: tyco_status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn null_argument() -> Self {
        Self::new(tyco_status::TYCO_ERROR_INVALID_ARGUMENT, NULL_ARGUMENT_MESSAGE)
    }

    fn out_of_memory() -> Self {
        Self::new(tyco_status::TYCO_ERROR_INTERNAL, OUT_OF_MEMORY_MESSAGE)
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self::new(status_for_kind(err.kind()), err.to_string())
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn tyco_load_file(
    path: *const c_char,
    out_ctx: *mut *mut tyco_context,
    out_error: *mut *mut c_char,
) -> tyco_status {
    load_file_with(&TycoEngine, path, out_ctx, out_error)
}

#[unsafe(no_mangle)]
pub extern "C" fn tyco_load_string(
    source: *const c_char,
    source_name: *const c_char,
    out_ctx: *mut *mut tyco_context,
    out_error: *mut *mut c_char,
) -> tyco_status {
    load_string_with(&TycoEngine, source, source_name, out_ctx, out_error)
}

#[unsafe(no_mangle)]
pub extern "C" fn tyco_context_to_json(
    ctx: *const tyco_context,
    out_json: *mut *mut c_char,
    out_error: *mut *mut c_char,
) -> tyco_status {
    clear(out_error);
    if ctx.is_null() || out_json.is_null() {
        return report(out_error, Failure::null_argument());
    }
    unsafe {
        *out_json = ptr::null_mut();
    }
    let result = guarded("serialization", || {
        let handle = unsafe { &*ctx };
        let json = handle.context.to_json()?;
        debug!(
            source = handle.context.source_name(),
            bytes = json.len(),
            "serialized document"
        );
        duplicate_string(&json)
    });
    match result {
        Ok(buffer) => {
            unsafe {
                *out_json = buffer;
            }
            tyco_status::TYCO_OK
        }
        Err(failure) => report(out_error, failure),
    }
}

/// Alias of `tyco_context_to_json` kept for callers built against the older name.
#[unsafe(no_mangle)]
pub extern "C" fn tyco_context_dumps_json(
    ctx: *const tyco_context,
    out_json: *mut *mut c_char,
    out_error: *mut *mut c_char,
) -> tyco_status {
    tyco_context_to_json(ctx, out_json, out_error)
}

#[unsafe(no_mangle)]
pub extern "C" fn tyco_context_free(ctx: *mut tyco_context) {
    if ctx.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(ctx));
    }
    #[cfg(test)]
    live_handles::release();
}

#[unsafe(no_mangle)]
pub extern "C" fn tyco_free_string(buffer: *mut c_char) {
    if buffer.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(buffer));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn tyco_parse_file_to_json(path: *const c_char) -> tyco_json_result {
    parse_to_json(|out_ctx, out_error| tyco_load_file(path, out_ctx, out_error))
}

#[unsafe(no_mangle)]
pub extern "C" fn tyco_parse_string_to_json(
    source: *const c_char,
    source_name: *const c_char,
) -> tyco_json_result {
    parse_to_json(|out_ctx, out_error| tyco_load_string(source, source_name, out_ctx, out_error))
}

#[unsafe(no_mangle)]
pub extern "C" fn tyco_json_result_free(result: *mut tyco_json_result) {
    if result.is_null() {
        return;
    }
    let result = unsafe { &mut *result };
    tyco_free_string(result.json);
    tyco_free_string(result.error);
    result.json = ptr::null_mut();
    result.error = ptr::null_mut();
}

pub(crate) fn load_file_with<E: Engine + ?Sized>(
    engine: &E,
    path: *const c_char,
    out_ctx: *mut *mut tyco_context,
    out_error: *mut *mut c_char,
) -> tyco_status {
    clear(out_error);
    if path.is_null() || out_ctx.is_null() {
        return report(out_error, Failure::null_argument());
    }
    unsafe {
        *out_ctx = ptr::null_mut();
    }
    let result = guarded("parsing", || {
        let path = unsafe { CStr::from_ptr(path) }.to_str().map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("path is not valid UTF-8")
                .with_source(err)
        })?;
        debug!(path, "loading document from file");
        let context = engine
            .parse_file(Path::new(path))?
            .ok_or_else(|| Failure::new(tyco_status::TYCO_ERROR_PARSING, "Failed to parse file"))?;
        render_into_handle(context)
    });
    publish_handle(result, out_ctx, out_error)
}

pub(crate) fn load_string_with<E: Engine + ?Sized>(
    engine: &E,
    source: *const c_char,
    source_name: *const c_char,
    out_ctx: *mut *mut tyco_context,
    out_error: *mut *mut c_char,
) -> tyco_status {
    clear(out_error);
    if source.is_null() || out_ctx.is_null() {
        return report(out_error, Failure::null_argument());
    }
    unsafe {
        *out_ctx = ptr::null_mut();
    }
    let result = guarded("parsing", || {
        let source = unsafe { CStr::from_ptr(source) }.to_str().map_err(|_| {
            Failure::new(tyco_status::TYCO_ERROR_PARSING, "source is not valid UTF-8")
        })?;
        let source_name = if source_name.is_null() {
            DEFAULT_SOURCE_NAME.to_string()
        } else {
            unsafe { CStr::from_ptr(source_name) }
                .to_string_lossy()
                .into_owned()
        };
        debug!(source = %source_name, bytes = source.len(), "loading document from memory");
        let context = engine
            .parse_string(source, &source_name)?
            .ok_or_else(|| {
                Failure::new(tyco_status::TYCO_ERROR_PARSING, "Failed to parse content")
            })?;
        render_into_handle(context)
    });
    publish_handle(result, out_ctx, out_error)
}

fn render_into_handle(mut context: TycoContext) -> Result<*mut tyco_context, Failure> {
    context.render()?;
    let handle = Box::new(tyco_context {
        context: Arc::new(context),
    });
    #[cfg(test)]
    live_handles::acquire();
    Ok(Box::into_raw(handle))
}

fn publish_handle(
    result: Result<*mut tyco_context, Failure>,
    out_ctx: *mut *mut tyco_context,
    out_error: *mut *mut c_char,
) -> tyco_status {
    match result {
        Ok(handle) => {
            unsafe {
                *out_ctx = handle;
            }
            tyco_status::TYCO_OK
        }
        Err(failure) => report(out_error, failure),
    }
}

/// Frees the wrapped handle when dropped, on every exit path.
struct ContextGuard(*mut tyco_context);

impl Drop for ContextGuard {
    fn drop(&mut self) {
        tyco_context_free(self.0);
    }
}

fn parse_to_json(
    load: impl FnOnce(*mut *mut tyco_context, *mut *mut c_char) -> tyco_status,
) -> tyco_json_result {
    let mut result = tyco_json_result::empty();
    let mut raw: *mut tyco_context = ptr::null_mut();
    let status = load(&mut raw as *mut _, &mut result.error as *mut _);
    let handle = ContextGuard(raw);
    if status != tyco_status::TYCO_OK {
        result.status = status;
        return result;
    }
    result.status = tyco_context_to_json(handle.0, &mut result.json, &mut result.error);
    result
}

/// Run `op`, converting a panic into `TYCO_ERROR_INTERNAL`.
fn guarded<T>(
    operation: &'static str,
    op: impl FnOnce() -> Result<T, Failure>,
) -> Result<T, Failure> {
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref())
                .unwrap_or_else(|| format!("Unknown error during {operation}"));
            warn!(operation, %message, "panic caught at the C boundary");
            Err(Failure::new(tyco_status::TYCO_ERROR_INTERNAL, message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
}

fn clear(out_error: *mut *mut c_char) {
    if !out_error.is_null() {
        unsafe {
            *out_error = ptr::null_mut();
        }
    }
}

fn report(out_error: *mut *mut c_char, failure: Failure) -> tyco_status {
    debug!(status = ?failure.status, message = %failure.message, "boundary call failed");
    if out_error.is_null() {
        return failure.status;
    }
    let (status, buffer) = match duplicate_string(&failure.message) {
        Ok(buffer) => (failure.status, buffer),
        Err(oom) => (
            oom.status,
            duplicate_string(OUT_OF_MEMORY_MESSAGE).unwrap_or(ptr::null_mut()),
        ),
    };
    unsafe {
        *out_error = buffer;
    }
    status
}

/// Copy `text` into a NUL-terminated buffer owned by the caller.
/// Interior NULs become U+FFFD; the only allocation is the checked reservation.
fn duplicate_string(text: &str) -> Result<*mut c_char, Failure> {
    const REPLACEMENT: &[u8] = "\u{FFFD}".as_bytes();
    let nuls = text.bytes().filter(|byte| *byte == 0).count();
    let len = text.len() + nuls * (REPLACEMENT.len() - 1);
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len + 1)
        .map_err(|_| Failure::out_of_memory())?;
    for byte in text.bytes() {
        if byte == 0 {
            bytes.extend_from_slice(REPLACEMENT);
        } else {
            bytes.push(byte);
        }
    }
    let buffer = CString::new(bytes).map_err(|_| {
        Failure::new(tyco_status::TYCO_ERROR_INTERNAL, "interior NUL survived replacement")
    })?;
    Ok(buffer.into_raw())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;

    struct CountingEngine {
        calls: Cell<usize>,
    }

    impl CountingEngine {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
            }
        }
    }

    impl Engine for CountingEngine {
        fn parse_file(&self, path: &Path) -> crate::core::error::Result<Option<TycoContext>> {
            self.calls.set(self.calls.get() + 1);
            TycoEngine.parse_file(path)
        }

        fn parse_string(
            &self,
            source: &str,
            source_name: &str,
        ) -> crate::core::error::Result<Option<TycoContext>> {
            self.calls.set(self.calls.get() + 1);
            TycoEngine.parse_string(source, source_name)
        }
    }

    struct DecliningEngine;

    impl Engine for DecliningEngine {
        fn parse_file(&self, _path: &Path) -> crate::core::error::Result<Option<TycoContext>> {
            Ok(None)
        }

        fn parse_string(
            &self,
            _source: &str,
            _source_name: &str,
        ) -> crate::core::error::Result<Option<TycoContext>> {
            Ok(None)
        }
    }

    enum PanicPayload {
        Str,
        Formatted,
        Opaque,
    }

    struct PanickingEngine(PanicPayload);

    impl PanickingEngine {
        fn explode(&self) -> ! {
            match self.0 {
                PanicPayload::Str => panic!("engine exploded"),
                PanicPayload::Formatted => panic!("engine exploded at step {}", 3),
                PanicPayload::Opaque => std::panic::panic_any(42_u32),
            }
        }
    }

    impl Engine for PanickingEngine {
        fn parse_file(&self, _path: &Path) -> crate::core::error::Result<Option<TycoContext>> {
            self.explode()
        }

        fn parse_string(
            &self,
            _source: &str,
            _source_name: &str,
        ) -> crate::core::error::Result<Option<TycoContext>> {
            self.explode()
        }
    }

    fn c(text: &str) -> CString {
        CString::new(text).expect("no interior NUL")
    }

    fn take(ptr: *mut c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        tyco_free_string(ptr);
        Some(text)
    }

    fn load_str(source: &str) -> (tyco_status, *mut tyco_context, Option<String>) {
        let source = c(source);
        let mut ctx = ptr::null_mut();
        let mut error = ptr::null_mut();
        let status = tyco_load_string(source.as_ptr(), ptr::null(), &mut ctx, &mut error);
        (status, ctx, take(error))
    }

    fn to_json(ctx: *const tyco_context) -> (tyco_status, Option<String>, Option<String>) {
        let mut json = ptr::null_mut();
        let mut error = ptr::null_mut();
        let status = tyco_context_to_json(ctx, &mut json, &mut error);
        (status, take(json), take(error))
    }

    #[test]
    fn status_codes_are_stable() {
        assert_eq!(tyco_status::TYCO_OK as i32, 0);
        assert_eq!(tyco_status::TYCO_ERROR_INVALID_ARGUMENT as i32, 1);
        assert_eq!(tyco_status::TYCO_ERROR_PARSING as i32, 2);
        assert_eq!(tyco_status::TYCO_ERROR_INTERNAL as i32, 3);
    }

    #[test]
    fn kind_mapping_covers_every_kind() {
        let cases = [
            (ErrorKind::Usage, tyco_status::TYCO_ERROR_INVALID_ARGUMENT),
            (ErrorKind::Io, tyco_status::TYCO_ERROR_PARSING),
            (ErrorKind::Syntax, tyco_status::TYCO_ERROR_PARSING),
            (ErrorKind::Type, tyco_status::TYCO_ERROR_PARSING),
            (ErrorKind::Reference, tyco_status::TYCO_ERROR_PARSING),
            (ErrorKind::Template, tyco_status::TYCO_ERROR_PARSING),
            (ErrorKind::Internal, tyco_status::TYCO_ERROR_INTERNAL),
        ];
        for (kind, status) in cases {
            assert_eq!(status_for_kind(kind), status, "{kind:?}");
        }
    }

    #[test]
    fn load_serialize_free_round_trip() {
        let before = live_handles::count();
        let (status, ctx, error) = load_str("str name: demo\nint port: 8080\n");
        assert_eq!(status, tyco_status::TYCO_OK);
        assert!(error.is_none());
        assert!(!ctx.is_null());
        assert_eq!(live_handles::count(), before + 1);

        let (status, json, error) = to_json(ctx);
        assert_eq!(status, tyco_status::TYCO_OK);
        assert!(error.is_none());
        assert_eq!(json.as_deref(), Some(r#"{"name":"demo","port":8080}"#));

        tyco_context_free(ctx);
        assert_eq!(live_handles::count(), before);
    }

    #[test]
    fn serialization_is_repeatable() {
        let (_, ctx, _) = load_str("Db:\n *str name:\n  - a\n  - b\nDb main: Db(b)\n");
        let (_, first, _) = to_json(ctx);
        let (_, second, _) = to_json(ctx);
        let (_, alias, _) = {
            let mut json = ptr::null_mut();
            let mut error = ptr::null_mut();
            let status = tyco_context_dumps_json(ctx, &mut json, &mut error);
            (status, take(json), take(error))
        };
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(first, alias);
        tyco_context_free(ctx);
    }

    #[test]
    fn null_arguments_are_rejected_before_the_engine_runs() {
        let engine = CountingEngine::new();
        let source = c("int a: 1");
        let mut ctx = ptr::null_mut();
        let mut error = ptr::null_mut();

        let status = load_file_with(&engine, ptr::null(), &mut ctx, &mut error);
        assert_eq!(status, tyco_status::TYCO_ERROR_INVALID_ARGUMENT);
        assert_eq!(take(error).as_deref(), Some(NULL_ARGUMENT_MESSAGE));
        assert!(ctx.is_null());

        let mut error = ptr::null_mut();
        let status = load_file_with(&engine, source.as_ptr(), ptr::null_mut(), &mut error);
        assert_eq!(status, tyco_status::TYCO_ERROR_INVALID_ARGUMENT);
        assert_eq!(take(error).as_deref(), Some(NULL_ARGUMENT_MESSAGE));

        let mut error = ptr::null_mut();
        let status = load_string_with(&engine, ptr::null(), ptr::null(), &mut ctx, &mut error);
        assert_eq!(status, tyco_status::TYCO_ERROR_INVALID_ARGUMENT);
        assert_eq!(take(error).as_deref(), Some(NULL_ARGUMENT_MESSAGE));

        let status = load_string_with(
            &engine,
            source.as_ptr(),
            ptr::null(),
            ptr::null_mut(),
            ptr::null_mut(),
        );
        assert_eq!(status, tyco_status::TYCO_ERROR_INVALID_ARGUMENT);

        assert_eq!(engine.calls.get(), 0);
    }

    #[test]
    fn null_handle_or_output_slot_for_serialize() {
        let (status, json, error) = to_json(ptr::null());
        assert_eq!(status, tyco_status::TYCO_ERROR_INVALID_ARGUMENT);
        assert!(json.is_none());
        assert_eq!(error.as_deref(), Some(NULL_ARGUMENT_MESSAGE));

        let (_, ctx, _) = load_str("int a: 1\n");
        let mut error = ptr::null_mut();
        let status = tyco_context_to_json(ctx, ptr::null_mut(), &mut error);
        assert_eq!(status, tyco_status::TYCO_ERROR_INVALID_ARGUMENT);
        assert!(take(error).is_some());
        tyco_context_free(ctx);
    }

    #[test]
    fn malformed_documents_report_parsing_failure() {
        for source in [
            "int port: eighty\n",
            "str a: \"unterminated\n",
            "  str a: x\n",
            "str a: \"{missing}\"\n",
            "Db x: Db(a)\n",
        ] {
            let (status, ctx, error) = load_str(source);
            assert_eq!(status, tyco_status::TYCO_ERROR_PARSING, "{source:?}");
            assert!(ctx.is_null(), "{source:?}");
            let error = error.expect("error message");
            assert!(!error.is_empty());
            assert!(error.starts_with("<string>:"), "{error}");
        }
    }

    #[test]
    fn source_name_labels_diagnostics() {
        let source = c("int port: eighty\n");
        let name = c("settings.tyco");
        let mut ctx = ptr::null_mut();
        let mut error = ptr::null_mut();
        let status = tyco_load_string(source.as_ptr(), name.as_ptr(), &mut ctx, &mut error);
        assert_eq!(status, tyco_status::TYCO_ERROR_PARSING);
        let error = take(error).expect("error");
        assert!(error.starts_with("settings.tyco:1: type error"), "{error}");
    }

    #[test]
    fn out_error_is_optional() {
        let source = c("int port: eighty\n");
        let mut ctx = ptr::null_mut();
        let status = tyco_load_string(source.as_ptr(), ptr::null(), &mut ctx, ptr::null_mut());
        assert_eq!(status, tyco_status::TYCO_ERROR_PARSING);
        assert!(ctx.is_null());
    }

    #[test]
    fn stale_output_slots_are_reset() {
        let source = c("int port: eighty\n");
        let mut ctx = ptr::NonNull::<tyco_context>::dangling().as_ptr();
        let mut error = ptr::null_mut();
        let status = tyco_load_string(source.as_ptr(), ptr::null(), &mut ctx, &mut error);
        assert_eq!(status, tyco_status::TYCO_ERROR_PARSING);
        assert!(ctx.is_null());
        take(error);
    }

    #[test]
    fn declined_parse_maps_to_generic_messages() {
        let path = c("whatever.tyco");
        let mut ctx = ptr::null_mut();
        let mut error = ptr::null_mut();
        let status = load_file_with(&DecliningEngine, path.as_ptr(), &mut ctx, &mut error);
        assert_eq!(status, tyco_status::TYCO_ERROR_PARSING);
        assert_eq!(take(error).as_deref(), Some("Failed to parse file"));
        assert!(ctx.is_null());

        let mut error = ptr::null_mut();
        let status = load_string_with(
            &DecliningEngine,
            path.as_ptr(),
            ptr::null(),
            &mut ctx,
            &mut error,
        );
        assert_eq!(status, tyco_status::TYCO_ERROR_PARSING);
        assert_eq!(take(error).as_deref(), Some("Failed to parse content"));
    }

    #[test]
    fn panics_become_internal_errors() {
        let input = c("int a: 1");
        let cases = [
            (PanicPayload::Str, "engine exploded"),
            (PanicPayload::Formatted, "engine exploded at step 3"),
            (PanicPayload::Opaque, "Unknown error during parsing"),
        ];
        for (payload, expected) in cases {
            let engine = PanickingEngine(payload);
            let mut ctx = ptr::null_mut();
            let mut error = ptr::null_mut();
            let status = load_string_with(&engine, input.as_ptr(), ptr::null(), &mut ctx, &mut error);
            assert_eq!(status, tyco_status::TYCO_ERROR_INTERNAL);
            assert!(ctx.is_null());
            assert_eq!(take(error).as_deref(), Some(expected));

            let mut error = ptr::null_mut();
            let status = load_file_with(&engine, input.as_ptr(), &mut ctx, &mut error);
            assert_eq!(status, tyco_status::TYCO_ERROR_INTERNAL);
            assert_eq!(take(error).as_deref(), Some(expected));
        }
    }

    #[test]
    fn invalid_utf8_inputs() {
        let bad = CString::new(vec![0xff, 0xfe, b'a']).expect("no NUL");
        let mut ctx = ptr::null_mut();
        let mut error = ptr::null_mut();
        let status = tyco_load_file(bad.as_ptr(), &mut ctx, &mut error);
        assert_eq!(status, tyco_status::TYCO_ERROR_INVALID_ARGUMENT);
        let message = take(error).expect("error");
        assert!(
            message.starts_with("invalid argument: path is not valid UTF-8"),
            "{message}"
        );

        let mut error = ptr::null_mut();
        let status = tyco_load_string(bad.as_ptr(), ptr::null(), &mut ctx, &mut error);
        assert_eq!(status, tyco_status::TYCO_ERROR_PARSING);
        assert!(take(error).is_some());
        assert!(ctx.is_null());
    }

    #[test]
    fn load_file_and_missing_path() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "bool enabled: true").expect("write");
        let path = c(file.path().to_str().expect("utf8 path"));
        let mut ctx = ptr::null_mut();
        let mut error = ptr::null_mut();
        assert_eq!(
            tyco_load_file(path.as_ptr(), &mut ctx, &mut error),
            tyco_status::TYCO_OK
        );
        assert!(error.is_null());
        let (_, json, _) = to_json(ctx);
        assert_eq!(json.as_deref(), Some(r#"{"enabled":true}"#));
        tyco_context_free(ctx);

        let dir = tempfile::tempdir().expect("tempdir");
        let missing = c(dir.path().join("nope.tyco").to_str().expect("utf8"));
        let mut ctx = ptr::null_mut();
        let mut error = ptr::null_mut();
        let status = tyco_load_file(missing.as_ptr(), &mut ctx, &mut error);
        assert_eq!(status, tyco_status::TYCO_ERROR_PARSING);
        assert!(ctx.is_null());
        let error = take(error).expect("error");
        assert!(error.contains("nope.tyco"), "{error}");
    }

    #[test]
    fn free_functions_accept_null() {
        tyco_context_free(ptr::null_mut());
        tyco_free_string(ptr::null_mut());
        tyco_json_result_free(ptr::null_mut());
    }

    #[test]
    fn convenience_success_and_failure_are_exclusive() {
        let ok = c("str a: x\n");
        let mut result = tyco_parse_string_to_json(ok.as_ptr(), ptr::null());
        assert_eq!(result.status, tyco_status::TYCO_OK);
        assert!(!result.json.is_null());
        assert!(result.error.is_null());
        let json = unsafe { CStr::from_ptr(result.json) }.to_str().unwrap().to_string();
        assert_eq!(json, r#"{"a":"x"}"#);
        tyco_json_result_free(&mut result);
        assert!(result.json.is_null());
        tyco_json_result_free(&mut result);

        let bad = c("int a: x\n");
        let mut result = tyco_parse_string_to_json(bad.as_ptr(), ptr::null());
        assert_eq!(result.status, tyco_status::TYCO_ERROR_PARSING);
        assert!(result.json.is_null());
        assert!(!result.error.is_null());
        tyco_json_result_free(&mut result);

        let mut result = tyco_parse_file_to_json(ptr::null());
        assert_eq!(result.status, tyco_status::TYCO_ERROR_INVALID_ARGUMENT);
        assert!(result.json.is_null());
        assert!(!result.error.is_null());
        tyco_json_result_free(&mut result);
    }

    #[test]
    fn convenience_on_empty_source_yields_empty_object() {
        let empty = c("");
        let mut result = tyco_parse_string_to_json(empty.as_ptr(), ptr::null());
        assert_eq!(result.status, tyco_status::TYCO_OK);
        assert!(result.error.is_null());
        let json = unsafe { CStr::from_ptr(result.json) }.to_str().unwrap().to_string();
        assert_eq!(json, "{}");
        tyco_json_result_free(&mut result);
    }

    #[test]
    fn convenience_operations_never_leak_handles() {
        let before = live_handles::count();
        let good = c("int a: 1\n");
        let bad = c("int a: x\n");
        for _ in 0..64 {
            let mut ok = tyco_parse_string_to_json(good.as_ptr(), ptr::null());
            let mut err = tyco_parse_string_to_json(bad.as_ptr(), ptr::null());
            let mut missing = tyco_parse_file_to_json(bad.as_ptr());
            assert_eq!(live_handles::count(), before);
            tyco_json_result_free(&mut ok);
            tyco_json_result_free(&mut err);
            tyco_json_result_free(&mut missing);
        }
        assert_eq!(live_handles::count(), before);
    }

    #[test]
    fn handle_free_keeps_shared_context_alive() {
        let (_, ctx, _) = load_str("int a: 1\n");
        let shared = unsafe { &*ctx }.context().clone();
        assert_eq!(Arc::strong_count(&shared), 2);
        tyco_context_free(ctx);
        assert_eq!(Arc::strong_count(&shared), 1);
        assert_eq!(shared.to_json().unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn interior_nul_in_messages_is_replaced() {
        let buffer = duplicate_string("bad\0byte").expect("duplicate");
        assert_eq!(take(buffer).as_deref(), Some("bad\u{FFFD}byte"));

        let buffer = duplicate_string("\0\0").expect("duplicate");
        assert_eq!(take(buffer).as_deref(), Some("\u{FFFD}\u{FFFD}"));

        let buffer = duplicate_string("").expect("duplicate");
        assert_eq!(take(buffer).as_deref(), Some(""));
    }
}
