use crate::{DatasetRegistry, EngineError, Result, SourceTable};
use flatfile_import::{import, ImportRequest};
use flatfile_model::{is_valid_dataset_name, FileFormat, OpenOptions, SourceRecord};
use flatfile_store::{Store, StoreError};
use serde_json::{json, Value as JsonValue};

/// One workbook: an embedded store plus the source table and dataset
/// registry describing what lives inside it.
///
/// All operations on one context are serialized by the caller (the ABI layer
/// wraps each workbook in a mutex); the context itself is plain mutable
/// state.
#[derive(Debug)]
pub struct EngineContext {
    store: Store,
    sources: SourceTable,
    datasets: DatasetRegistry,
}

impl EngineContext {
    /// Create a workbook from its base file.
    pub fn open(
        buffer: &[u8],
        file_name: &str,
        format: FileFormat,
        options: OpenOptions,
    ) -> Result<EngineContext> {
        let store =
            Store::open_in_memory().map_err(|err| EngineError::OpenFailed(err.to_string()))?;
        let mut context = EngineContext {
            store,
            sources: SourceTable::new(),
            datasets: DatasetRegistry::new(),
        };
        context.ingest(buffer, file_name, format, options)?;
        Ok(context)
    }

    /// Attach another source file to this workbook.
    pub fn attach(
        &mut self,
        buffer: &[u8],
        file_name: &str,
        format: FileFormat,
        options: OpenOptions,
    ) -> Result<()> {
        if self.sources.contains(file_name) {
            return Err(EngineError::DuplicateSource(file_name.to_string()));
        }
        self.ingest(buffer, file_name, format, options)
    }

    fn ingest(
        &mut self,
        buffer: &[u8],
        file_name: &str,
        format: FileFormat,
        options: OpenOptions,
    ) -> Result<()> {
        let request = ImportRequest {
            buffer,
            file_name,
            format,
            options: &options,
            base_naming: self.sources.is_empty(),
        };
        let result = import(&self.store, &request).map_err(EngineError::from_import)?;

        // The importer only collides with store-level objects; make sure the
        // registry agrees before anything becomes visible.
        if let Some(clash) = result
            .datasets
            .iter()
            .find(|d| self.datasets.contains(&d.technical_name))
        {
            let name = clash.technical_name.clone();
            for dataset in &result.datasets {
                if let Err(err) = self.store.drop_object(&dataset.technical_name) {
                    log::warn!(
                        "failed to drop `{}` while unwinding a colliding attach: {err}",
                        dataset.technical_name
                    );
                }
            }
            return Err(EngineError::DuplicateDataset(name));
        }

        let dataset_keys: Vec<String> = result
            .datasets
            .iter()
            .map(|d| d.technical_name.clone())
            .collect();
        self.sources.attach(SourceRecord {
            path: file_name.to_string(),
            format,
            options,
            approx_buffer_bytes: result.approx_bytes,
            dataset_keys,
        })?;
        for dataset in result.datasets {
            self.datasets.register(dataset)?;
        }
        Ok(())
    }

    /// Rename a dataset in the registry and the store as one observable step:
    /// if the store rejects the rename, the registry stays untouched.
    pub fn rename_dataset(&mut self, old: &str, new: &str) -> Result<()> {
        let source_path = match self.datasets.get(old) {
            Some(dataset) => dataset.source_path.clone(),
            None => return Err(EngineError::UnknownDataset(old.to_string())),
        };
        if !is_valid_dataset_name(new) {
            return Err(EngineError::InvalidName(new.to_string()));
        }
        if self.datasets.contains(new) {
            return Err(EngineError::DuplicateDataset(new.to_string()));
        }

        self.store.rename_object(old, new).map_err(|err| match err {
            StoreError::DuplicateObject(name) => EngineError::DuplicateDataset(name),
            StoreError::UnknownObject(name) => {
                EngineError::Internal(format!("dataset `{name}` has no backing store object"))
            }
            StoreError::Sqlite(err) => EngineError::Sql(err.to_string()),
        })?;

        self.datasets.rename(old, new)?;
        if let Some(source) = self.sources.get_mut(&source_path) {
            for key in &mut source.dataset_keys {
                if key == old {
                    *key = new.to_string();
                }
            }
        }
        Ok(())
    }

    /// Detach a source and drop every dataset it produced. The cascade is
    /// best-effort: the source entry goes away even when some drops fail, and
    /// the failures come back as one accumulated error.
    pub fn detach_source(&mut self, path: &str) -> Result<()> {
        self.sources.detach(path)?;
        let removed = self.datasets.detach_by_source(path);
        let mut failures = Vec::new();
        for dataset in &removed {
            if let Err(err) = self.store.drop_object(&dataset.technical_name) {
                log::warn!(
                    "detach of `{path}` left `{}` behind: {err}",
                    dataset.technical_name
                );
                failures.push(format!("failed to drop `{}`: {err}", dataset.technical_name));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Internal(failures.join("\n")))
        }
    }

    /// Forward SQL to the store verbatim.
    pub fn query(&mut self, sql: &str) -> Result<JsonValue> {
        let output = self.store.query(sql).map_err(sql_error)?;
        let runtime_view = if output.columns.is_empty() {
            None
        } else {
            self.store.materialize_result_view(sql)
        };
        Ok(json!({
            "columns": output.columns,
            "rows": output.rows,
            "meta": { "runtimeViewName": runtime_view },
        }))
    }

    /// Current datasets with fresh row counts, in registration order.
    pub fn list_datasets(&self) -> JsonValue {
        let sheets: Vec<JsonValue> = self
            .datasets
            .iter()
            .map(|dataset| {
                let row_count = self
                    .store
                    .row_count(&dataset.technical_name)
                    .unwrap_or(dataset.schema.row_count);
                json!({
                    "name": dataset.technical_name,
                    "rowCount": row_count,
                    "columnCount": dataset.schema.column_count(),
                    "columns": dataset.schema.columns,
                })
            })
            .collect();
        json!({ "sheets": sheets })
    }

    /// Re-query the store for the dataset's current shape and refresh the
    /// registry's summary with it.
    pub fn describe_dataset(&mut self, name: &str) -> Result<JsonValue> {
        if !self.datasets.contains(name) {
            return Err(EngineError::UnknownDataset(name.to_string()));
        }
        let columns = self.store.table_columns(name).map_err(sql_error)?;
        let row_count = self.store.row_count(name).map_err(sql_error)?;
        let dataset = self
            .datasets
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownDataset(name.to_string()))?;
        dataset.schema.columns = columns;
        dataset.schema.row_count = row_count;
        Ok(json!({
            "name": dataset.technical_name,
            "defaultName": dataset.default_name,
            "sourceFilePath": dataset.source_path,
            "sourceObjectName": dataset.object_name,
            "rowCount": dataset.schema.row_count,
            "columnCount": dataset.schema.column_count(),
            "columns": dataset.schema.columns,
        }))
    }

    /// Dataset-to-source provenance, in registration order.
    pub fn list_dataset_sources(&self) -> JsonValue {
        let datasets: Vec<JsonValue> = self
            .datasets
            .iter()
            .map(|dataset| {
                json!({
                    "technicalName": dataset.technical_name,
                    "sourceFilePath": dataset.source_path,
                    "sourceObjectName": dataset.object_name,
                })
            })
            .collect();
        json!({ "datasets": datasets })
    }

    /// Attached source paths in attach order.
    pub fn workbook_source_paths(&self) -> JsonValue {
        json!({ "paths": self.sources.paths() })
    }

    pub fn workbook_memory_stats(&self) -> Result<JsonValue> {
        let db_bytes = self.store.approx_db_bytes().map_err(sql_error)?;
        let buffer_bytes = self.sources.total_buffer_bytes();
        let sources: Vec<JsonValue> = self
            .sources
            .iter()
            .map(|source| {
                json!({
                    "sourceFilePath": source.path,
                    "sourceObjectName": JsonValue::Null,
                    "approxBytes": source.approx_buffer_bytes,
                })
            })
            .collect();
        Ok(json!({
            "approxDbBytes": db_bytes,
            "approxFileBufferBytes": buffer_bytes,
            "approxTotalBytes": db_bytes + buffer_bytes,
            "sources": sources,
        }))
    }

    pub fn dataset_memory_stats(&self) -> JsonValue {
        let datasets: Vec<JsonValue> = self
            .datasets
            .iter()
            .map(|dataset| {
                json!({
                    "technicalName": dataset.technical_name,
                    "sourceFilePath": dataset.source_path,
                    "sourceObjectName": dataset.object_name,
                    "approxBytes": dataset.approx_bytes,
                })
            })
            .collect();
        json!({ "datasets": datasets })
    }

    /// Total resident cost of this workbook; drives whole-workbook eviction.
    pub fn approx_total_bytes(&self) -> u64 {
        let db_bytes = self.store.approx_db_bytes().unwrap_or(0);
        db_bytes + self.sources.total_buffer_bytes()
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn source_table(&self) -> &SourceTable {
        &self.sources
    }

    pub(crate) fn registry(&self) -> &DatasetRegistry {
        &self.datasets
    }
}

fn sql_error(err: StoreError) -> EngineError {
    match err {
        StoreError::Sqlite(err) => EngineError::Sql(err.to_string()),
        other => EngineError::Sql(other.to_string()),
    }
}
