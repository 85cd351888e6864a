//! Importer registry for the flatfile workbook engine.
//!
//! An importer takes a byte buffer plus open-options and materializes one or
//! more datasets inside a workbook's [`Store`]. This crate bundles importers
//! for delimited text (csv/tsv/txt), JSON Lines / JSON arrays, the calamine
//! spreadsheet family (xlsx/xlsm/xltx/xls/xlsb/ods) and SQLite database
//! files. A parquet importer sits behind the `parquet` feature. The remaining
//! formats of [`FileFormat`] resolve but have no bundled decoder and fail
//! with [`ImportError::UnsupportedFormat`].

mod delimited;
mod infer;
mod json_lines;
#[cfg(feature = "parquet")]
mod parquet_file;
mod sheet;
mod sqlite_db;

use flatfile_model::{
    default_dataset_name, resolve_name_collision, ColumnInfo, DatasetDescriptor, FileFormat,
    OpenOptions, SchemaSummary,
};
use flatfile_store::{CellValue, ColumnAffinity, Store, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported format for `{file_name}`: {reason}")]
    UnsupportedFormat { file_name: String, reason: String },
    #[error("malformed input in `{file_name}`: {message}")]
    MalformedInput { file_name: String, message: String },
    #[error("store write failed: {0}")]
    StoreWrite(#[from] StoreError),
    #[error("internal panic while decoding `{file_name}`: {message}")]
    DecoderPanic { file_name: String, message: String },
    #[error("i/o error while staging `{file_name}`: {message}")]
    Io { file_name: String, message: String },
}

impl ImportError {
    pub(crate) fn malformed(file_name: &str, message: impl ToString) -> Self {
        ImportError::MalformedInput {
            file_name: file_name.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether the failure is a name collision with an object already in the
    /// store (a cross-source dataset collision, from the engine's viewpoint).
    pub fn is_duplicate_object(&self) -> bool {
        self.duplicate_object_name().is_some()
    }

    /// The colliding object name, when this is a collision failure.
    pub fn duplicate_object_name(&self) -> Option<&str> {
        match self {
            ImportError::StoreWrite(StoreError::DuplicateObject(name)) => Some(name),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;

/// Everything an importer needs to know about one ingestion.
#[derive(Clone, Copy, Debug)]
pub struct ImportRequest<'a> {
    pub buffer: &'a [u8],
    /// Logical file name; drives format inference and default naming.
    pub file_name: &'a str,
    /// Declared format; `Auto` infers from the file-name suffix.
    pub format: FileFormat,
    pub options: &'a OpenOptions,
    /// Base-file naming (bare stem) vs attach naming (full file name).
    pub base_naming: bool,
}

/// Outcome of one successful import.
#[derive(Clone, Debug)]
pub struct ImportResult {
    /// Descriptors in ingestion order; `technical_name == default_name`.
    pub datasets: Vec<DatasetDescriptor>,
    /// Byte length of the ingested buffer.
    pub approx_bytes: u64,
}

/// Resolve the effective format: the declared one, or a suffix lookup under
/// `Auto`.
pub fn resolve_format(file_name: &str, declared: FileFormat) -> Result<FileFormat> {
    if declared != FileFormat::Auto {
        return Ok(declared);
    }
    let extension = file_name
        .rsplit(['/', '\\'])
        .next()
        .and_then(|base| base.rsplit_once('.'))
        .map(|(_, ext)| ext);
    extension
        .and_then(FileFormat::from_extension)
        .ok_or_else(|| ImportError::UnsupportedFormat {
            file_name: file_name.to_string(),
            reason: match extension {
                Some(ext) => format!("unrecognized file suffix `.{ext}`"),
                None => "file name has no suffix to infer a format from".to_string(),
            },
        })
}

/// Dispatch an import request to the matching importer.
///
/// On failure no dataset is left behind in the store: importers stage their
/// work and tear down any tables they created before returning an error.
pub fn import(store: &Store, request: &ImportRequest<'_>) -> Result<ImportResult> {
    let format = resolve_format(request.file_name, request.format)?;
    match format {
        f if f.is_delimited() => delimited::import(store, request, f),
        FileFormat::Jsonl | FileFormat::Json => json_lines::import(store, request, format),
        f if f.is_spreadsheet() => sheet::import(store, request),
        FileFormat::Sqlite => sqlite_db::import(store, request),
        #[cfg(feature = "parquet")]
        FileFormat::Parquet => parquet_file::import(store, request),
        other => Err(ImportError::UnsupportedFormat {
            file_name: request.file_name.to_string(),
            reason: format!("no importer bundled for `{other}` files"),
        }),
    }
}

/// Catch panics at a third-party decoder boundary and surface them as
/// structured errors. Panics in our own importer logic are still bugs and
/// should crash in tests.
pub(crate) fn catch_decoder_panic<T>(file_name: &str, f: impl FnOnce() -> T) -> Result<T> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_string()
            };
            Err(ImportError::DecoderPanic {
                file_name: file_name.to_string(),
                message,
            })
        }
    }
}

const ROW_BASE_OVERHEAD_BYTES: u64 = 24;
const CELL_BASE_OVERHEAD_BYTES: u64 = 8;

fn estimate_cell_bytes(value: &CellValue) -> u64 {
    let payload = match value {
        CellValue::Null => 0,
        CellValue::Integer(_) | CellValue::Real(_) => 8,
        CellValue::Text(text) => text.len() as u64,
    };
    CELL_BASE_OVERHEAD_BYTES + payload
}

/// One fully decoded tabular object waiting to be written to the store.
pub(crate) struct PendingDataset {
    /// Inner object name (sheet/table/range); single-object formats use `None`.
    pub object_name: Option<String>,
    pub columns: Vec<(String, ColumnAffinity)>,
    pub rows: Vec<Vec<CellValue>>,
}

/// Write staged datasets into the store under their canonical names.
///
/// Names collide only within this import here; a collision with a table that
/// is already in the store fails the whole import, and every table created so
/// far is dropped again.
pub(crate) fn write_datasets(
    store: &Store,
    request: &ImportRequest<'_>,
    pending: Vec<PendingDataset>,
) -> Result<ImportResult> {
    let mut created: Vec<String> = Vec::new();
    let mut datasets: Vec<DatasetDescriptor> = Vec::new();

    for dataset in pending {
        let candidate = default_dataset_name(
            request.file_name,
            dataset.object_name.as_deref(),
            request.base_naming,
        );
        let name = resolve_name_collision(&candidate, |n| created.iter().any(|c| c == n));

        let result = write_one(store, &name, &dataset);
        let approx_bytes = match result {
            Ok(bytes) => bytes,
            Err(err) => {
                cleanup_tables(store, &created);
                return Err(err);
            }
        };
        created.push(name.clone());

        let columns: Vec<ColumnInfo> = dataset
            .columns
            .iter()
            .map(|(col, affinity)| {
                let ty = match affinity {
                    ColumnAffinity::Integer => "int",
                    ColumnAffinity::Real => "real",
                    ColumnAffinity::Text => "text",
                };
                ColumnInfo::new(col.clone(), ty)
            })
            .collect();
        datasets.push(DatasetDescriptor {
            technical_name: name.clone(),
            default_name: name,
            source_path: request.file_name.to_string(),
            object_name: dataset.object_name,
            schema: SchemaSummary {
                columns,
                row_count: dataset.rows.len() as u64,
            },
            approx_bytes,
        });
    }

    Ok(ImportResult {
        datasets,
        approx_bytes: request.buffer.len() as u64,
    })
}

fn write_one(store: &Store, name: &str, dataset: &PendingDataset) -> Result<u64> {
    store.create_table(name, &dataset.columns)?;
    let mut approx_bytes = 0u64;
    for row in &dataset.rows {
        approx_bytes += ROW_BASE_OVERHEAD_BYTES;
        for cell in row {
            approx_bytes += estimate_cell_bytes(cell);
        }
    }
    store.insert_rows(name, dataset.columns.len(), dataset.rows.iter().cloned())?;
    Ok(approx_bytes)
}

/// Best-effort teardown of tables created by a failed import.
pub(crate) fn cleanup_tables(store: &Store, names: &[String]) {
    for name in names {
        if let Err(err) = store.drop_object(name) {
            log::warn!("failed to drop `{name}` while unwinding a failed import: {err}");
        }
    }
}

/// De-duplicate and fill in decoded column names: blanks become positional
/// `col_N` names, repeats get `_2`, `_3`, ... suffixes.
pub(crate) fn finalize_column_names(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for (idx, name) in raw.into_iter().enumerate() {
        let trimmed = name.trim();
        let base = if trimmed.is_empty() {
            format!("col_{}", idx + 1)
        } else {
            trimmed.to_string()
        };
        let unique = resolve_name_collision(&base, |n| out.iter().any(|c| c == n));
        out.push(unique);
    }
    out
}
