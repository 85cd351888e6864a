//! SQLite-backed store for one flatfile workbook.
//!
//! Every workbook owns exactly one in-memory SQLite database. This crate
//! wraps that database behind the narrow contract the engine relies on:
//! execute a statement, run a query and enumerate its rows, create/drop/
//! rename tables and views, introspect a table's columns and row count, and
//! report an approximate database size. Nothing above this crate touches
//! `rusqlite` directly.

mod store;

pub use store::{
    quote_identifier, quote_string_literal, CellValue, ColumnAffinity, QueryOutput, Store,
    StoreError,
};

pub type Result<T> = std::result::Result<T, StoreError>;

pub(crate) fn lock_unpoisoned<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
