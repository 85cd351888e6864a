use flatfile_import::ImportError;
use thiserror::Error;

/// Workbook-level failure kinds. Everything a host can observe through the
/// ABI boundary maps onto one of these.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid workbook handle {0}")]
    InvalidHandle(u64),
    #[error("failed to open workbook: {0}")]
    OpenFailed(String),
    #[error("import failed: {0}")]
    ImportFailed(ImportError),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("source `{0}` is already attached")]
    DuplicateSource(String),
    #[error("no source attached as `{0}`")]
    UnknownSource(String),
    #[error("a dataset named `{0}` already exists")]
    DuplicateDataset(String),
    #[error("no dataset named `{0}`")]
    UnknownDataset(String),
    #[error("`{0}` is not a valid dataset name")]
    InvalidName(String),
    #[error("sql error: {0}")]
    Sql(String),
    #[error("manifest export failed: {0}")]
    ExportFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Lift an importer failure, turning store-level name collisions into
    /// the dataset-collision kind the registry contract promises.
    pub(crate) fn from_import(err: ImportError) -> Self {
        match err.duplicate_object_name() {
            Some(name) => EngineError::DuplicateDataset(name.to_string()),
            None => EngineError::ImportFailed(err),
        }
    }
}
