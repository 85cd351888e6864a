//! Fixture builders shared by the importer integration tests.

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// A spreadsheet cell for [`build_xlsx`].
#[derive(Clone, Debug)]
pub enum Cell {
    Text(&'static str),
    Number(f64),
    Empty,
}

/// Assemble a minimal xlsx package (inline strings, no shared strings or
/// styles) that calamine can read.
pub fn build_xlsx(sheets: &[(&str, Vec<Vec<Cell>>)], defined_names: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    for idx in 0..sheets.len() {
        content_types.push_str(&format!(
            "\n<Override PartName=\"/xl/worksheets/sheet{}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
            idx + 1
        ));
    }
    content_types.push_str("\n</Types>");

    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets>"#,
    );
    for (idx, (name, _)) in sheets.iter().enumerate() {
        workbook.push_str(&format!(
            "\n<sheet name=\"{name}\" sheetId=\"{id}\" r:id=\"rId{id}\"/>",
            id = idx + 1
        ));
    }
    workbook.push_str("\n</sheets>");
    if !defined_names.is_empty() {
        workbook.push_str("\n<definedNames>");
        for (name, reference) in defined_names {
            workbook.push_str(&format!(
                "\n<definedName name=\"{name}\">{reference}</definedName>"
            ));
        }
        workbook.push_str("\n</definedNames>");
    }
    workbook.push_str("\n</workbook>");

    let mut workbook_rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for idx in 0..sheets.len() {
        workbook_rels.push_str(&format!(
            "\n<Relationship Id=\"rId{id}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet{id}.xml\"/>",
            id = idx + 1
        ));
    }
    workbook_rels.push_str("\n</Relationships>");

    let root_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

    let mut write_part = |path: &str, body: &str| {
        writer.start_file(path, options).expect("start zip entry");
        writer.write_all(body.as_bytes()).expect("write zip entry");
    };

    write_part("[Content_Types].xml", &content_types);
    write_part("_rels/.rels", root_rels);
    write_part("xl/workbook.xml", &workbook);
    write_part("xl/_rels/workbook.xml.rels", &workbook_rels);

    for (idx, (_, rows)) in sheets.iter().enumerate() {
        let mut sheet = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<sheetData>"#,
        );
        for (row_idx, row) in rows.iter().enumerate() {
            sheet.push_str(&format!("\n<row r=\"{}\">", row_idx + 1));
            for (col_idx, cell) in row.iter().enumerate() {
                let reference = format!("{}{}", column_letters(col_idx), row_idx + 1);
                match cell {
                    Cell::Text(text) => sheet.push_str(&format!(
                        "<c r=\"{reference}\" t=\"inlineStr\"><is><t>{text}</t></is></c>"
                    )),
                    Cell::Number(value) => sheet
                        .push_str(&format!("<c r=\"{reference}\"><v>{value}</v></c>")),
                    Cell::Empty => {}
                }
            }
            sheet.push_str("</row>");
        }
        sheet.push_str("\n</sheetData>\n</worksheet>");
        write_part(&format!("xl/worksheets/sheet{}.xml", idx + 1), &sheet);
    }

    writer.finish().expect("finish zip").into_inner()
}

fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).expect("ascii letters")
}

/// Build an on-disk SQLite database and return its raw bytes.
pub fn build_sqlite(setup: &str) -> Vec<u8> {
    let staged = tempfile::NamedTempFile::new().expect("temp file");
    let conn = rusqlite::Connection::open(staged.path()).expect("open db");
    conn.execute_batch(setup).expect("seed db");
    drop(conn);
    std::fs::read(staged.path()).expect("read db bytes")
}
