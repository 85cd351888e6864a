//! Spreadsheet importer for the calamine-readable family
//! (xlsx, xlsm, xltx, xls, xlsb, ods).

use crate::infer::ColumnTally;
use crate::{
    catch_decoder_panic, finalize_column_names, write_datasets, ImportError, ImportRequest,
    ImportResult, PendingDataset, Result,
};
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use flatfile_model::SheetObjectKind;
use flatfile_store::{CellValue, Store};
use std::io::Cursor;

type SheetReader<'a> = Sheets<Cursor<&'a [u8]>>;

pub(crate) fn import(store: &Store, request: &ImportRequest<'_>) -> Result<ImportResult> {
    let file = request.file_name;
    let cursor = Cursor::new(request.buffer);
    let mut workbook: SheetReader<'_> =
        catch_decoder_panic(file, || open_workbook_auto_from_rs(cursor))?
            .map_err(|err| ImportError::malformed(file, err))?;

    let mut pending = Vec::new();
    for object in enumerate_objects(&mut workbook, request)? {
        let name = object.name;
        match range_to_dataset(
            &object.range,
            request.options.has_header_row,
            object.explicit_columns,
        ) {
            Some(mut dataset) => {
                dataset.object_name = Some(name);
                pending.push(dataset);
            }
            None => log::warn!("skipping empty spreadsheet object `{name}` in `{file}`"),
        }
    }

    write_datasets(store, request, pending)
}

/// One selected spreadsheet object. Tables carry their own column names
/// (their decoded range is the body without the header row).
struct SheetObject {
    name: String,
    range: Range<Data>,
    explicit_columns: Option<Vec<String>>,
}

/// Resolve the object filter to concrete objects, honoring the caller-given
/// order when explicit names were supplied.
fn enumerate_objects(
    workbook: &mut SheetReader<'_>,
    request: &ImportRequest<'_>,
) -> Result<Vec<SheetObject>> {
    let file = request.file_name;
    let kind = request.options.object_kind;
    let requested = &request.options.object_names;

    let sheet_names: Vec<String> = workbook
        .sheets_metadata()
        .iter()
        .map(|sheet| sheet.name.clone())
        .collect();
    let defined_names: Vec<(String, String)> = workbook.defined_names().to_vec();

    let names: Vec<String> = if requested.is_empty() {
        match kind {
            SheetObjectKind::Any | SheetObjectKind::Sheet => sheet_names.clone(),
            SheetObjectKind::NamedRange => {
                defined_names.iter().map(|(name, _)| name.clone()).collect()
            }
            SheetObjectKind::Table => table_names(workbook, file)?,
        }
    } else {
        requested.clone()
    };

    let mut objects = Vec::with_capacity(names.len());
    for name in names {
        let object = resolve_object(workbook, file, kind, name, &sheet_names, &defined_names)?;
        objects.push(object);
    }
    Ok(objects)
}

fn resolve_object(
    workbook: &mut SheetReader<'_>,
    file: &str,
    kind: SheetObjectKind,
    name: String,
    sheet_names: &[String],
    defined_names: &[(String, String)],
) -> Result<SheetObject> {
    let as_sheet = sheet_names.iter().any(|s| *s == name);
    let as_defined = defined_names
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, reference)| reference.clone());

    match kind {
        SheetObjectKind::Sheet => {
            if !as_sheet {
                return Err(ImportError::malformed(file, format!("no sheet named `{name}`")));
            }
            let range = read_sheet_range(workbook, file, &name)?;
            Ok(SheetObject {
                name,
                range,
                explicit_columns: None,
            })
        }
        SheetObjectKind::NamedRange => match as_defined {
            Some(reference) => {
                let range = read_defined_range(workbook, file, &name, &reference)?;
                Ok(SheetObject {
                    name,
                    range,
                    explicit_columns: None,
                })
            }
            None => Err(ImportError::malformed(
                file,
                format!("no named range `{name}`"),
            )),
        },
        SheetObjectKind::Table => read_table_object(workbook, file, name),
        SheetObjectKind::Any => {
            if as_sheet {
                let range = read_sheet_range(workbook, file, &name)?;
                Ok(SheetObject {
                    name,
                    range,
                    explicit_columns: None,
                })
            } else if let Some(reference) = as_defined {
                let range = read_defined_range(workbook, file, &name, &reference)?;
                Ok(SheetObject {
                    name,
                    range,
                    explicit_columns: None,
                })
            } else if table_names(workbook, file)?.iter().any(|t| *t == name) {
                read_table_object(workbook, file, name)
            } else {
                Err(ImportError::malformed(
                    file,
                    format!("no sheet, named range or table called `{name}`"),
                ))
            }
        }
    }
}

fn read_sheet_range(
    workbook: &mut SheetReader<'_>,
    file: &str,
    name: &str,
) -> Result<Range<Data>> {
    catch_decoder_panic(file, || workbook.worksheet_range(name))?
        .map_err(|err| ImportError::malformed(file, format!("sheet `{name}`: {err}")))
}

fn read_defined_range(
    workbook: &mut SheetReader<'_>,
    file: &str,
    name: &str,
    reference: &str,
) -> Result<Range<Data>> {
    let (sheet, start, end) = parse_area_reference(reference).ok_or_else(|| {
        ImportError::malformed(
            file,
            format!("named range `{name}` has an unsupported reference `{reference}`"),
        )
    })?;
    let full = read_sheet_range(workbook, file, &sheet)?;
    catch_decoder_panic(file, || full.range(start, end))
}

/// Tables are an xlsx-only concept in calamine.
fn table_names(workbook: &mut SheetReader<'_>, file: &str) -> Result<Vec<String>> {
    match workbook {
        Sheets::Xlsx(xlsx) => {
            catch_decoder_panic(file, || xlsx.load_tables())?
                .map_err(|err| ImportError::malformed(file, err))?;
            Ok(xlsx.table_names().into_iter().cloned().collect())
        }
        _ => Ok(Vec::new()),
    }
}

fn read_table_object(
    workbook: &mut SheetReader<'_>,
    file: &str,
    name: String,
) -> Result<SheetObject> {
    match workbook {
        Sheets::Xlsx(xlsx) => {
            catch_decoder_panic(file, || xlsx.load_tables())?
                .map_err(|err| ImportError::malformed(file, err))?;
            let table = catch_decoder_panic(file, || xlsx.table_by_name(&name))?
                .map_err(|err| ImportError::malformed(file, format!("table `{name}`: {err}")))?;
            let columns = table.columns().to_vec();
            Ok(SheetObject {
                name,
                range: table.data().clone(),
                explicit_columns: Some(columns),
            })
        }
        _ => Err(ImportError::malformed(
            file,
            format!("tables are not available in this format (requested `{name}`)"),
        )),
    }
}

/// Convert a decoded range into a pending dataset; `None` when the range
/// holds no cells. `explicit_columns` (from a table definition) overrides the
/// header-row convention, and the whole range counts as data.
fn range_to_dataset(
    range: &Range<Data>,
    has_header_row: bool,
    explicit_columns: Option<Vec<String>>,
) -> Option<PendingDataset> {
    let width = range.width();
    let height = range.height();
    if width == 0 || height == 0 {
        return None;
    }

    let mut rows_iter = range.rows();
    let header: Vec<String> = match explicit_columns {
        Some(columns) => {
            let mut columns = columns;
            columns.resize(width, String::new());
            columns
        }
        None if has_header_row => rows_iter
            .next()
            .map(|row| row.iter().map(cell_display).collect())?,
        None => (0..width).map(|idx| format!("col_{}", idx + 1)).collect(),
    };

    let column_names = finalize_column_names(header);
    let mut tallies = vec![ColumnTally::default(); width];
    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    for row in rows_iter {
        let mut out = Vec::with_capacity(width);
        for (idx, cell) in row.iter().enumerate() {
            let value = cell_to_value(cell);
            tallies[idx].observe(&value);
            out.push(value);
        }
        rows.push(out);
    }

    let columns = column_names
        .into_iter()
        .zip(tallies.iter().map(|tally| tally.affinity()))
        .collect();

    Some(PendingDataset {
        object_name: None,
        columns,
        rows,
    })
}

fn cell_to_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::Int(v) => CellValue::Integer(*v),
        Data::Float(v) => CellValue::Real(*v),
        Data::Bool(v) => CellValue::Integer(*v as i64),
        Data::String(v) => CellValue::Text(v.clone()),
        // Serial date values keep their numeric form; hosts format them.
        Data::DateTime(v) => CellValue::Real(v.as_f64()),
        Data::DateTimeIso(v) | Data::DurationIso(v) => CellValue::Text(v.clone()),
        Data::Error(_) => CellValue::Null,
    }
}

fn cell_display(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(v) => v.clone(),
        Data::Int(v) => v.to_string(),
        Data::Float(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(v) => v.as_f64().to_string(),
        Data::DateTimeIso(v) | Data::DurationIso(v) => v.clone(),
        Data::Error(e) => format!("{e:?}"),
    }
}

/// Parse a defined-name area reference like `Sheet1!$A$1:$B$3` or
/// `'My Sheet'!$C$2`. Multi-area references use only the first area.
fn parse_area_reference(reference: &str) -> Option<(String, (u32, u32), (u32, u32))> {
    let area = reference.split(',').next()?.trim();
    let (sheet_part, cells_part) = area.rsplit_once('!')?;
    let sheet = sheet_part.trim().trim_matches('\'').to_string();
    if sheet.is_empty() {
        return None;
    }
    let (start_raw, end_raw) = match cells_part.split_once(':') {
        Some((start, end)) => (start, end),
        None => (cells_part, cells_part),
    };
    let start = parse_cell_reference(start_raw)?;
    let end = parse_cell_reference(end_raw)?;
    Some((sheet, start, end))
}

/// `$B$3` / `B3` to zero-based `(row, col)`.
fn parse_cell_reference(raw: &str) -> Option<(u32, u32)> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != '$').collect();
    let split = cleaned.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cleaned.split_at(split);
    if letters.is_empty() || digits.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col
            .checked_mul(26)?
            .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_references() {
        assert_eq!(parse_cell_reference("A1"), Some((0, 0)));
        assert_eq!(parse_cell_reference("$B$3"), Some((2, 1)));
        assert_eq!(parse_cell_reference("AA10"), Some((9, 26)));
        assert_eq!(parse_cell_reference("A0"), None);
        assert_eq!(parse_cell_reference("12"), None);
    }

    #[test]
    fn area_references() {
        assert_eq!(
            parse_area_reference("Sheet1!$A$1:$B$3"),
            Some(("Sheet1".to_string(), (0, 0), (2, 1)))
        );
        assert_eq!(
            parse_area_reference("'My Sheet'!$C$2"),
            Some(("My Sheet".to_string(), (1, 2), (1, 2)))
        );
        assert_eq!(
            parse_area_reference("Data!$A$1:$A$5,Data!$C$1:$C$5"),
            Some(("Data".to_string(), (0, 0), (4, 0)))
        );
        assert_eq!(parse_area_reference("no-sheet"), None);
    }
}
