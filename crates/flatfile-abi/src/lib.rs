//! Handle-based ABI over the flatfile workbook engine.
//!
//! The process-wide [`HandleManager`] maps opaque integer handles to
//! workbooks, stamps every lookup for LRU accounting, and evicts whole
//! workbooks when the resident set exceeds its bounds. The `ff_*` entry
//! points in [`ffi`] are the language-neutral surface native hosts link
//! against and wasm hosts import; both see identical behavior.

pub mod ffi;
mod handles;

pub use handles::{HandleConfig, HandleManager};

pub(crate) fn lock_unpoisoned<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
