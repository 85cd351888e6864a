//! Delimited-text importer (csv, tsv, txt).

use crate::infer::{parse_text_field, ColumnTally};
use crate::{
    finalize_column_names, write_datasets, ImportError, ImportRequest, ImportResult,
    PendingDataset, Result,
};
use flatfile_model::FileFormat;
use flatfile_store::{CellValue, Store};

pub(crate) fn import(
    store: &Store,
    request: &ImportRequest<'_>,
    format: FileFormat,
) -> Result<ImportResult> {
    let delimiter = request
        .options
        .delimiter
        .or_else(|| format.default_delimiter())
        .unwrap_or(b',');

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_reader(request.buffer);

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| ImportError::malformed(request.file_name, err))?;
        records.push(record);
    }

    let mut rows_iter = records.iter();
    let header: Vec<String> = if request.options.has_header_row {
        match rows_iter.next() {
            Some(record) => record.iter().map(|field| field.to_string()).collect(),
            None => {
                return Err(ImportError::malformed(
                    request.file_name,
                    "file is empty, expected a header row",
                ))
            }
        }
    } else {
        match records.first() {
            Some(record) => (0..record.len()).map(|idx| format!("col_{}", idx + 1)).collect(),
            None => {
                return Err(ImportError::malformed(
                    request.file_name,
                    "file is empty, no columns to infer",
                ))
            }
        }
    };

    let column_names = finalize_column_names(header);
    let column_count = column_names.len();

    let mut tallies = vec![ColumnTally::default(); column_count];
    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    for (row_idx, record) in rows_iter.enumerate() {
        if record.len() != column_count {
            return Err(ImportError::malformed(
                request.file_name,
                format!(
                    "row {} has {} fields, expected {column_count}",
                    row_idx + 1,
                    record.len()
                ),
            ));
        }
        let mut row = Vec::with_capacity(column_count);
        for (idx, field) in record.iter().enumerate() {
            let value = parse_text_field(field);
            tallies[idx].observe(&value);
            row.push(value);
        }
        rows.push(row);
    }

    let columns = column_names
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
