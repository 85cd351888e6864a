//! The flatfile workbook engine.
//!
//! An [`EngineContext`] is one workbook: an embedded relational store, the
//! ordered table of attached sources and the dataset registry layered on top
//! of it. The engine exposes the full workbook contract (open, attach,
//! detach, rename, list, describe, query, memory accounting, profiling,
//! quality rules, manifest codec) as plain Rust; the handle table and C ABI
//! live one crate up.

mod context;
mod error;
mod manifest;
mod profile;
mod quality;
mod registry;
mod sources;

pub use context::EngineContext;
pub use error::EngineError;
pub use manifest::{
    import_project, ManifestRename, ManifestSource, ManifestSpreadsheetFilter, ProjectManifest,
    MANIFEST_SCHEMA_VERSION,
};
pub use registry::DatasetRegistry;
pub use sources::SourceTable;

pub type Result<T> = std::result::Result<T, EngineError>;
