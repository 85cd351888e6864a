//! Parquet importer (`parquet` feature).
//!
//! Uses the parquet row API over an in-memory buffer; nested values are
//! flattened to their textual form.

use crate::infer::ColumnTally;
use crate::{
    finalize_column_names, write_datasets, ImportError, ImportRequest, ImportResult,
    PendingDataset, Result,
};
use flatfile_store::{CellValue, Store};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;

pub(crate) fn import(store: &Store, request: &ImportRequest<'_>) -> Result<ImportResult> {
    let file = request.file_name;
    let buffer = bytes::Bytes::copy_from_slice(request.buffer);
    let reader = SerializedFileReader::new(buffer)
        .map_err(|err| ImportError::malformed(file, err))?;

    let column_names: Vec<String> = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    let width = column_names.len();
    if width == 0 {
        return Err(ImportError::malformed(file, "parquet schema has no columns"));
    }

    let mut tallies = vec![ColumnTally::default(); width];
    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    let row_iter = reader
        .get_row_iter(None)
        .map_err(|err| ImportError::malformed(file, err))?;
    for row in row_iter {
        let row = row.map_err(|err| ImportError::malformed(file, err))?;
        let mut out = Vec::with_capacity(width);
        for (idx, (_, field)) in row.get_column_iter().enumerate() {
            if idx >= width {
                break;
            }
            let value = field_to_value(field);
            tallies[idx].observe(&value);
            out.push(value);
        }
        while out.len() < width {
            out.push(CellValue::Null);
        }
        rows.push(out);
    }

    let columns = finalize_column_names(column_names)
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

fn field_to_value(field: &Field) -> CellValue {
    match field {
        Field::Null => CellValue::Null,
        Field::Bool(v) => CellValue::Integer(*v as i64),
        Field::Byte(v) => CellValue::Integer(*v as i64),
        Field::Short(v) => CellValue::Integer(*v as i64),
        Field::Int(v) => CellValue::Integer(*v as i64),
        Field::Long(v) => CellValue::Integer(*v),
        Field::UByte(v) => CellValue::Integer(*v as i64),
        Field::UShort(v) => CellValue::Integer(*v as i64),
        Field::UInt(v) => CellValue::Integer(*v as i64),
        Field::ULong(v) => CellValue::Integer(*v as i64),
        Field::Float(v) => CellValue::Real(*v as f64),
        Field::Double(v) => CellValue::Real(*v),
        Field::Str(v) => CellValue::Text(v.clone()),
        Field::Bytes(v) => CellValue::Text(String::from_utf8_lossy(v.data()).into_owned()),
        Field::Date(v) => CellValue::Integer(*v as i64),
        Field::TimestampMillis(v) => CellValue::Integer(*v),
        Field::TimestampMicros(v) => CellValue::Integer(*v),
        other => CellValue::Text(other.to_string()),
    }
}
