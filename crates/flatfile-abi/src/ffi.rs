//! The `ff_*` C-callable surface.
//!
//! Every entry point resolves its handle through the process-wide manager,
//! runs the engine operation with the workbook's lock held, and writes the
//! JSON payload (or `{}`) plus any error message into the workbook's string
//! arena and the process-level mirrors behind `ff_getLastError` /
//! `ff_getLastJson`. Returned pointers stay valid until the next call on any
//! handle. No panic crosses this boundary.

use crate::handles::HandleManager;
use crate::lock_unpoisoned;
use flatfile_engine::{EngineContext, EngineError};
use flatfile_model::{FileFormat, OpenOptions};
use serde_json::Value as JsonValue;
use std::ffi::{c_char, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

/// Status codes returned by the non-pointer entry points.
pub const FF_STATUS_OK: i32 = 0;
pub const FF_STATUS_ERROR: i32 = 1;
pub const FF_STATUS_INVALID_HANDLE: i32 = 2;

static MANAGER: OnceLock<HandleManager> = OnceLock::new();

/// The process-wide handle table backing the `ff_*` surface.
pub fn manager() -> &'static HandleManager {
    MANAGER.get_or_init(HandleManager::default)
}

unsafe fn cstr_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

unsafe fn buffer_arg<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len)
    }
}

fn record_failure(err: &EngineError) {
    manager().set_last_results(Some(&err.to_string()), "{}");
}

/// Run a JSON-returning operation against a handle. Failures return a
/// pointer to `{}` with the message retrievable via `ff_getLastError`.
fn json_op(
    handle: u64,
    op: impl FnOnce(&mut EngineContext) -> Result<JsonValue, EngineError>,
) -> *const c_char {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mgr = manager();
        let Some(slot) = mgr.touch(handle) else {
            return Err(EngineError::InvalidHandle(handle));
        };
        let mut guard = lock_unpoisoned(&slot);
        let pointer = match op(&mut guard.context) {
            Ok(payload) => {
                let text = payload.to_string();
                let pointer = guard.set_json(&text).as_ptr();
                drop(guard);
                mgr.set_last_results(None, &text);
                pointer
            }
            Err(err) => {
                let message = err.to_string();
                guard.set_error(&message);
                let pointer = guard.set_json("{}").as_ptr();
                drop(guard);
                mgr.set_last_results(Some(&message), "{}");
                pointer
            }
        };
        Ok(pointer)
    }));
    match outcome {
        Ok(Ok(pointer)) => pointer,
        Ok(Err(err)) => {
            record_failure(&err);
            manager().last_json_ptr()
        }
        Err(_) => {
            record_failure(&EngineError::Internal(
                "panic inside engine operation".to_string(),
            ));
            manager().last_json_ptr()
        }
    }
}

/// Run a status-returning operation against a handle.
fn status_op(
    handle: u64,
    op: impl FnOnce(&mut EngineContext) -> Result<(), EngineError>,
) -> i32 {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mgr = manager();
        let Some(slot) = mgr.touch(handle) else {
            return FF_STATUS_INVALID_HANDLE;
        };
        let mut guard = lock_unpoisoned(&slot);
        match op(&mut guard.context) {
            Ok(()) => {
                guard.set_json("{}");
                drop(guard);
                mgr.set_last_results(None, "{}");
                FF_STATUS_OK
            }
            Err(err) => {
                let message = err.to_string();
                guard.set_error(&message);
                guard.set_json("{}");
                drop(guard);
                mgr.set_last_results(Some(&message), "{}");
                FF_STATUS_ERROR
            }
        }
    }));
    match outcome {
        Ok(status) => {
            if status == FF_STATUS_INVALID_HANDLE {
                record_failure(&EngineError::InvalidHandle(handle));
            }
            status
        }
        Err(_) => {
            record_failure(&EngineError::Internal(
                "panic inside engine operation".to_string(),
            ));
            FF_STATUS_ERROR
        }
    }
}

#[export_name = "ff_init"]
pub extern "C" fn ff_init() {
    manager();
}

/// Open a workbook from a byte buffer. Returns the new handle, or `0` on
/// failure (message via `ff_getLastError`).
///
/// # Safety
/// `buffer` must point to `size` readable bytes and `file_name` to a
/// NUL-terminated string; both only need to live for the duration of the
/// call.
#[export_name = "ff_openFile"]
pub unsafe extern "C" fn ff_open_file(
    buffer: *const u8,
    size: usize,
    file_name: *const c_char,
    format_code: u32,
    delimiter: u8,
    has_header: u8,
) -> u64 {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let name = cstr_arg(file_name)
            .ok_or_else(|| EngineError::OpenFailed("file name is not valid UTF-8".to_string()))?;
        let format = FileFormat::from_code(format_code)
            .ok_or_else(|| EngineError::OpenFailed(format!("unknown format code {format_code}")))?;
        let options = OpenOptions::from_abi(delimiter, has_header != 0);
        let context = EngineContext::open(buffer_arg(buffer, size), name, format, options)?;
        let mgr = manager();
        let handle = mgr.insert(context);
        mgr.enforce_limits(handle);
        mgr.set_last_results(None, "{}");
        Ok::<u64, EngineError>(handle)
    }));
    match outcome {
        Ok(Ok(handle)) => handle,
        Ok(Err(err)) => {
            record_failure(&err);
            0
        }
        Err(_) => {
            record_failure(&EngineError::Internal(
                "panic while opening workbook".to_string(),
            ));
            0
        }
    }
}

/// Attach another source file to an open workbook.
///
/// # Safety
/// Pointer arguments as for [`ff_open_file`].
#[export_name = "ff_attachFile"]
pub unsafe extern "C" fn ff_attach_file(
    handle: u64,
    buffer: *const u8,
    size: usize,
    file_name: *const c_char,
    format_code: u32,
    delimiter: u8,
    has_header: u8,
) -> i32 {
    let Some(name) = cstr_arg(file_name) else {
        record_failure(&EngineError::OpenFailed(
            "file name is not valid UTF-8".to_string(),
        ));
        return FF_STATUS_ERROR;
    };
    let Some(format) = FileFormat::from_code(format_code) else {
        record_failure(&EngineError::OpenFailed(format!(
            "unknown format code {format_code}"
        )));
        return FF_STATUS_ERROR;
    };
    let options = OpenOptions::from_abi(delimiter, has_header != 0);
    let buffer = buffer_arg(buffer, size);
    let status = status_op(handle, |context| {
        context.attach(buffer, name, format, options)
    });
    if status == FF_STATUS_OK {
        manager().enforce_limits(handle);
    }
    status
}

/// # Safety
/// `path` must be a NUL-terminated string.
#[export_name = "ff_detachSource"]
pub unsafe extern "C" fn ff_detach_source(handle: u64, path: *const c_char) -> i32 {
    let Some(path) = cstr_arg(path) else {
        record_failure(&EngineError::UnknownSource("<invalid path>".to_string()));
        return FF_STATUS_ERROR;
    };
    status_op(handle, |context| context.detach_source(path))
}

/// # Safety
/// `old_name` and `new_name` must be NUL-terminated strings.
#[export_name = "ff_renameDataset"]
pub unsafe extern "C" fn ff_rename_dataset(
    handle: u64,
    old_name: *const c_char,
    new_name: *const c_char,
) -> i32 {
    let (Some(old_name), Some(new_name)) = (cstr_arg(old_name), cstr_arg(new_name)) else {
        record_failure(&EngineError::InvalidName("<invalid name>".to_string()));
        return FF_STATUS_ERROR;
    };
    status_op(handle, |context| context.rename_dataset(old_name, new_name))
}

#[export_name = "ff_listDatasets"]
pub extern "C" fn ff_list_datasets(handle: u64) -> *const c_char {
    json_op(handle, |context| Ok(context.list_datasets()))
}

/// # Safety
/// `name` must be a NUL-terminated string.
#[export_name = "ff_describeDataset"]
pub unsafe extern "C" fn ff_describe_dataset(handle: u64, name: *const c_char) -> *const c_char {
    let name = cstr_arg(name).map(str::to_string);
    json_op(handle, move |context| match name {
        Some(name) => context.describe_dataset(&name),
        None => Err(EngineError::UnknownDataset("<invalid name>".to_string())),
    })
}

/// # Safety
/// `sql` must be a NUL-terminated string.
#[export_name = "ff_query"]
pub unsafe extern "C" fn ff_query(handle: u64, sql: *const c_char) -> *const c_char {
    let sql = cstr_arg(sql).map(str::to_string);
    json_op(handle, move |context| match sql {
        Some(sql) => context.query(&sql),
        None => Err(EngineError::Sql("query text is not valid UTF-8".to_string())),
    })
}

/// # Safety
/// `name` must be a NUL-terminated string.
#[export_name = "ff_profileDataset"]
pub unsafe extern "C" fn ff_profile_dataset(handle: u64, name: *const c_char) -> *const c_char {
    let name = cstr_arg(name).map(str::to_string);
    json_op(handle, move |context| match name {
        Some(name) => context.profile_dataset(&name),
        None => Err(EngineError::UnknownDataset("<invalid name>".to_string())),
    })
}

/// # Safety
/// `name` and `rules_json` must be NUL-terminated strings.
#[export_name = "ff_evaluateQualityRules"]
pub unsafe extern "C" fn ff_evaluate_quality_rules(
    handle: u64,
    name: *const c_char,
    rules_json: *const c_char,
) -> *const c_char {
    let name = cstr_arg(name).map(str::to_string);
    let rules = cstr_arg(rules_json).map(str::to_string);
    json_op(handle, move |context| match (name, rules) {
        (Some(name), Some(rules)) => context.evaluate_quality_rules(&name, &rules),
        _ => Err(EngineError::MalformedInput(
            "rule arguments are not valid UTF-8".to_string(),
        )),
    })
}

#[export_name = "ff_listDatasetSources"]
pub extern "C" fn ff_list_dataset_sources(handle: u64) -> *const c_char {
    json_op(handle, |context| Ok(context.list_dataset_sources()))
}

#[export_name = "ff_getWorkbookSourcePaths"]
pub extern "C" fn ff_get_workbook_source_paths(handle: u64) -> *const c_char {
    json_op(handle, |context| Ok(context.workbook_source_paths()))
}

#[export_name = "ff_getWorkbookMemoryStats"]
pub extern "C" fn ff_get_workbook_memory_stats(handle: u64) -> *const c_char {
    json_op(handle, |context| context.workbook_memory_stats())
}

#[export_name = "ff_listDatasetMemoryStats"]
pub extern "C" fn ff_list_dataset_memory_stats(handle: u64) -> *const c_char {
    json_op(handle, |context| Ok(context.dataset_memory_stats()))
}

/// # Safety
/// `project_name` may be null; when non-null it must be NUL-terminated.
#[export_name = "ff_exportProjectManifest"]
pub unsafe extern "C" fn ff_export_project_manifest(
    handle: u64,
    project_name: *const c_char,
) -> *const c_char {
    let project_name = cstr_arg(project_name).map(str::to_string);
    json_op(handle, move |context| {
        let manifest = context.export_manifest(project_name.as_deref())?;
        serde_json::to_value(&manifest).map_err(|err| EngineError::ExportFailed(err.to_string()))
    })
}

/// Message for the most recent failure, empty string when the last call
/// succeeded.
#[export_name = "ff_getLastError"]
pub extern "C" fn ff_get_last_error() -> *const c_char {
    manager().last_error_ptr()
}

/// JSON payload of the most recent call (`{}` when it had none).
#[export_name = "ff_getLastJson"]
pub extern "C" fn ff_get_last_json() -> *const c_char {
    manager().last_json_ptr()
}

/// Close a workbook and free its resources; idempotent.
#[export_name = "ff_closeFile"]
pub extern "C" fn ff_close_file(handle: u64) {
    let mgr = manager();
    mgr.remove(handle);
    mgr.set_last_results(None, "{}");
}

/// Allocate `size` bytes the host can fill before calling `ff_openFile` /
/// `ff_attachFile`; wasm hosts use this to pass buffers in.
#[export_name = "ff_alloc"]
pub extern "C" fn ff_alloc(size: usize) -> *mut u8 {
    let mut buffer = Vec::<u8>::with_capacity(size);
    let pointer = buffer.as_mut_ptr();
    std::mem::forget(buffer);
    pointer
}

/// Release a buffer from [`ff_alloc`].
///
/// # Safety
/// `pointer` must come from `ff_alloc(size)` and not be freed twice.
#[export_name = "ff_free"]
pub unsafe extern "C" fn ff_free(pointer: *mut u8, size: usize) {
    if !pointer.is_null() {
        drop(Vec::from_raw_parts(pointer, 0, size));
    }
}
