//! SQLite database importer.
//!
//! The buffer is staged to a temp file and attached to the workbook store;
//! every user table (or the ones selected by the object-name filter) is
//! copied across with `CREATE TABLE ... AS SELECT`.

use crate::{cleanup_tables, ImportError, ImportRequest, ImportResult, Result};
use flatfile_model::{
    default_dataset_name, resolve_name_collision, DatasetDescriptor, SchemaSummary,
};
use flatfile_store::{quote_identifier, quote_string_literal, Store, StoreError};
use std::io::Write;

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";
const ATTACH_ALIAS: &str = "ff_src";

pub(crate) fn import(store: &Store, request: &ImportRequest<'_>) -> Result<ImportResult> {
    let file = request.file_name;
    if !request.buffer.starts_with(SQLITE_MAGIC) {
        return Err(ImportError::malformed(file, "not an SQLite database file"));
    }

    let mut staged = tempfile::NamedTempFile::new().map_err(|err| ImportError::Io {
        file_name: file.to_string(),
        message: err.to_string(),
    })?;
    staged
        .write_all(request.buffer)
        .and_then(|()| staged.flush())
        .map_err(|err| ImportError::Io {
            file_name: file.to_string(),
            message: err.to_string(),
        })?;
    let staged_path = staged.path().to_string_lossy().into_owned();

    store
        .execute_batch(&format!(
            "ATTACH DATABASE {} AS {ATTACH_ALIAS}",
            quote_string_literal(&staged_path)
        ))
        .map_err(|err| ImportError::malformed(file, err))?;

    let result = copy_tables(store, request);

    if let Err(err) = store.execute_batch(&format!("DETACH DATABASE {ATTACH_ALIAS}")) {
        log::warn!("failed to detach staged database for `{file}`: {err}");
    }
    result
}

fn copy_tables(store: &Store, request: &ImportRequest<'_>) -> Result<ImportResult> {
    let file = request.file_name;
    let listed = store
        .query(&format!(
            "SELECT name FROM {ATTACH_ALIAS}.sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid"
        ))
        .map_err(|err| ImportError::malformed(file, err))?;
    let available: Vec<String> = listed
        .rows
        .iter()
        .filter_map(|row| row.first().and_then(|v| v.as_str()).map(str::to_string))
        .collect();

    let tables: Vec<String> = if request.options.object_names.is_empty() {
        available
    } else {
        for wanted in &request.options.object_names {
            if !available.iter().any(|t| t == wanted) {
                return Err(ImportError::malformed(
                    file,
                    format!("no table named `{wanted}` in database"),
                ));
            }
        }
        request.options.object_names.clone()
    };

    let mut created: Vec<String> = Vec::new();
    let mut datasets = Vec::new();
    for table in tables {
        let candidate = default_dataset_name(file, Some(&table), request.base_naming);
        let name = resolve_name_collision(&candidate, |n| created.iter().any(|c| c == n));

        match copy_one(store, &table, &name) {
            Ok(()) => {}
            Err(err) => {
                cleanup_tables(store, &created);
                return Err(err);
            }
        }
        created.push(name.clone());

        let columns = store.table_columns(&name)?;
        let row_count = store.row_count(&name)?;
        let approx_bytes = 128 + row_count * (columns.len() as u64) * 24;
        datasets.push(DatasetDescriptor {
            technical_name: name.clone(),
            default_name: name,
            source_path: file.to_string(),
            object_name: Some(table),
            schema: SchemaSummary { columns, row_count },
            approx_bytes,
        });
    }

    Ok(ImportResult {
        datasets,
        approx_bytes: request.buffer.len() as u64,
    })
}

fn copy_one(store: &Store, table: &str, name: &str) -> Result<()> {
    if store.object_exists(name)? {
        return Err(StoreError::DuplicateObject(name.to_string()).into());
    }
    store.execute_batch(&format!(
        "CREATE TABLE main.{} AS SELECT * FROM {ATTACH_ALIAS}.{}",
        quote_identifier(name),
        quote_identifier(table)
    ))?;
    Ok(())
}
