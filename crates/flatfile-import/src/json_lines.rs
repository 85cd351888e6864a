//! JSON Lines / JSON array importer.
//!
//! Each record must be a flat JSON object. The column set is the union of
//! keys in first-seen order; keys missing from a record are NULL and nested
//! values are kept as their JSON text.

use crate::infer::ColumnTally;
use crate::{
    finalize_column_names, write_datasets, ImportError, ImportRequest, ImportResult,
    PendingDataset, Result,
};
use flatfile_model::FileFormat;
use flatfile_store::{CellValue, Store};
use serde_json::{Map, Value as JsonValue};

pub(crate) fn import(
    store: &Store,
    request: &ImportRequest<'_>,
    format: FileFormat,
) -> Result<ImportResult> {
    let records = match format {
        FileFormat::Jsonl => parse_lines(request)?,
        _ => parse_array(request)?,
    };
    if records.is_empty() {
        return Err(ImportError::malformed(
            request.file_name,
            "no records to import",
        ));
    }

    let mut key_order: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !key_order.iter().any(|k| k == key) {
                key_order.push(key.clone());
            }
        }
    }
    if key_order.is_empty() {
        return Err(ImportError::malformed(
            request.file_name,
            "records carry no fields",
        ));
    }

    let mut tallies = vec![ColumnTally::default(); key_order.len()];
    let mut rows: Vec<Vec<CellValue>> = Vec::with_capacity(records.len());
    for record in &records {
        let mut row = Vec::with_capacity(key_order.len());
        for (idx, key) in key_order.iter().enumerate() {
            let value = match record.get(key) {
                None | Some(JsonValue::Null) => CellValue::Null,
                Some(JsonValue::Bool(b)) => CellValue::Integer(*b as i64),
                Some(JsonValue::Number(n)) => match n.as_i64() {
                    Some(int) => CellValue::Integer(int),
                    None => CellValue::Real(n.as_f64().unwrap_or(0.0)),
                },
                Some(JsonValue::String(s)) => CellValue::Text(s.clone()),
                Some(nested) => CellValue::Text(nested.to_string()),
            };
            tallies[idx].observe(&value);
            row.push(value);
        }
        rows.push(row);
    }

    let columns = finalize_column_names(key_order)
        .into_iter()
        .zip(tallies.iter().map(|tally| tally.affinity()))
        .collect();

    write_datasets(
        store,
        request,
        vec![PendingDataset {
            object_name: None,
            columns,
            rows,
        }],
    )
}

fn parse_lines(request: &ImportRequest<'_>) -> Result<Vec<Map<String, JsonValue>>> {
    let text = std::str::from_utf8(request.buffer)
        .map_err(|err| ImportError::malformed(request.file_name, err))?;
    let mut records = Vec::new();
    for (line_idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: Map<String, JsonValue> = serde_json::from_str(line).map_err(|err| {
            ImportError::malformed(
                request.file_name,
                format!("line {}: {err}", line_idx + 1),
            )
        })?;
        records.push(record);
    }
    Ok(records)
}

fn parse_array(request: &ImportRequest<'_>) -> Result<Vec<Map<String, JsonValue>>> {
    let value: JsonValue = serde_json::from_slice(request.buffer)
        .map_err(|err| ImportError::malformed(request.file_name, err))?;
    let JsonValue::Array(items) = value else {
        return Err(ImportError::malformed(
            request.file_name,
            "expected a top-level JSON array of objects",
        ));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            JsonValue::Object(record) => Ok(record),
            other => Err(ImportError::malformed(
                request.file_name,
                format!("element {idx} is not an object: {other}"),
            )),
        })
        .collect()
}
