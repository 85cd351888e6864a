//! Shared vocabulary for the flatfile workbook engine.
//!
//! This crate is dependency-light on purpose: it holds the types every other
//! crate in the workspace speaks (file formats and their stable ABI codes,
//! open-options, dataset descriptors, source records) plus the naming rules
//! that derive canonical dataset names from file and object names.

mod format;
mod naming;
mod options;

pub use format::FileFormat;
pub use naming::{
    default_dataset_name, file_stem, is_valid_dataset_name, resolve_name_collision,
    sanitize_identifier,
};
pub use options::{OpenOptions, SheetObjectKind};

use serde::{Deserialize, Serialize};

/// One column of a dataset's schema summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// Snapshot of a dataset's shape as last observed in the store.
///
/// Row counts can drift after user DML; [`SchemaSummary::row_count`] is the
/// count at the time the summary was (re)computed, not a live value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub columns: Vec<ColumnInfo>,
    pub row_count: u64,
}

impl SchemaSummary {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Registry entry for one SQL-visible dataset.
///
/// `default_name` and `(source_path, object_name)` are fixed at ingestion
/// time; only `technical_name` changes over the dataset's life (via rename).
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetDescriptor {
    /// Current SQL-visible name. Starts equal to `default_name`.
    pub technical_name: String,
    /// Canonical name assigned at ingestion; used for manifest round-trips.
    pub default_name: String,
    /// Logical path of the source that produced this dataset.
    pub source_path: String,
    /// Sheet, table or range name inside the source, when the format has
    /// inner objects. Single-object formats (csv, jsonl, ...) leave this unset.
    pub object_name: Option<String>,
    pub schema: SchemaSummary,
    /// Store-side size estimate in bytes.
    pub approx_bytes: u64,
}

/// One attached source file of a workbook.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceRecord {
    /// Caller-provided logical path; unique within a workbook.
    pub path: String,
    /// Format as declared at attach time (`Auto` is preserved here; the
    /// resolved format only matters during import).
    pub format: FileFormat,
    pub options: OpenOptions,
    /// Byte length of the ingested buffer.
    pub approx_buffer_bytes: u64,
    /// Technical names of the datasets this source produced, in ingestion
    /// order. Kept in sync by the dataset registry on rename.
    pub dataset_keys: Vec<String>,
}
