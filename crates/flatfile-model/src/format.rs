use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared format of a source file.
///
/// The integer codes are part of the stable ABI: existing variants keep their
/// code forever, new formats append at the end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Auto,
    Csv,
    Tsv,
    Xlsx,
    Xlsm,
    Xltx,
    Xls,
    Xlsb,
    Ods,
    Sqlite,
    Dbf,
    Mdb,
    Accdb,
    Parquet,
    DuckDb,
    Jsonl,
    Json,
    Xml,
    Html,
    Txt,
}

impl FileFormat {
    /// Every concrete variant, in ABI-code order.
    pub const ALL: [FileFormat; 20] = [
        FileFormat::Auto,
        FileFormat::Csv,
        FileFormat::Tsv,
        FileFormat::Xlsx,
        FileFormat::Xlsm,
        FileFormat::Xltx,
        FileFormat::Xls,
        FileFormat::Xlsb,
        FileFormat::Ods,
        FileFormat::Sqlite,
        FileFormat::Dbf,
        FileFormat::Mdb,
        FileFormat::Accdb,
        FileFormat::Parquet,
        FileFormat::DuckDb,
        FileFormat::Jsonl,
        FileFormat::Json,
        FileFormat::Xml,
        FileFormat::Html,
        FileFormat::Txt,
    ];

    /// Stable integer encoding used across the ABI.
    pub fn code(self) -> u32 {
        match self {
            FileFormat::Auto => 0,
            FileFormat::Csv => 1,
            FileFormat::Tsv => 2,
            FileFormat::Xlsx => 3,
            FileFormat::Xlsm => 4,
            FileFormat::Xltx => 5,
            FileFormat::Xls => 6,
            FileFormat::Xlsb => 7,
            FileFormat::Ods => 8,
            FileFormat::Sqlite => 9,
            FileFormat::Dbf => 10,
            FileFormat::Mdb => 11,
            FileFormat::Accdb => 12,
            FileFormat::Parquet => 13,
            FileFormat::DuckDb => 14,
            FileFormat::Jsonl => 15,
            FileFormat::Json => 16,
            FileFormat::Xml => 17,
            FileFormat::Html => 18,
            FileFormat::Txt => 19,
        }
    }

    pub fn from_code(code: u32) -> Option<FileFormat> {
        FileFormat::ALL.get(code as usize).copied()
    }

    /// Map a file-name suffix (without the dot, ASCII case-insensitive) to a
    /// concrete format. `Auto` itself is never returned.
    pub fn from_extension(ext: &str) -> Option<FileFormat> {
        let format = match ext.to_ascii_lowercase().as_str() {
            "csv" => FileFormat::Csv,
            "tsv" => FileFormat::Tsv,
            "xlsx" => FileFormat::Xlsx,
            "xlsm" => FileFormat::Xlsm,
            "xltx" => FileFormat::Xltx,
            "xls" => FileFormat::Xls,
            "xlsb" => FileFormat::Xlsb,
            "ods" => FileFormat::Ods,
            "sqlite" | "sqlite3" | "db" => FileFormat::Sqlite,
            "dbf" => FileFormat::Dbf,
            "mdb" => FileFormat::Mdb,
            "accdb" => FileFormat::Accdb,
            "parquet" => FileFormat::Parquet,
            "duckdb" => FileFormat::DuckDb,
            "jsonl" | "ndjson" => FileFormat::Jsonl,
            "json" => FileFormat::Json,
            "xml" => FileFormat::Xml,
            "html" | "htm" => FileFormat::Html,
            "txt" => FileFormat::Txt,
            _ => return None,
        };
        Some(format)
    }

    /// Formats handled by the spreadsheet importer.
    pub fn is_spreadsheet(self) -> bool {
        matches!(
            self,
            FileFormat::Xlsx
                | FileFormat::Xlsm
                | FileFormat::Xltx
                | FileFormat::Xls
                | FileFormat::Xlsb
                | FileFormat::Ods
        )
    }

    /// Formats handled by the delimited-text importer.
    pub fn is_delimited(self) -> bool {
        matches!(self, FileFormat::Csv | FileFormat::Tsv | FileFormat::Txt)
    }

    /// Default field delimiter for delimited-text formats.
    pub fn default_delimiter(self) -> Option<u8> {
        match self {
            FileFormat::Csv | FileFormat::Txt => Some(b','),
            FileFormat::Tsv => Some(b'\t'),
            _ => None,
        }
    }

    /// Formats that expose exactly one tabular object per file.
    pub fn is_single_object(self) -> bool {
        matches!(
            self,
            FileFormat::Csv
                | FileFormat::Tsv
                | FileFormat::Txt
                | FileFormat::Jsonl
                | FileFormat::Json
                | FileFormat::Parquet
        )
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileFormat::Auto => "auto",
            FileFormat::Csv => "csv",
            FileFormat::Tsv => "tsv",
            FileFormat::Xlsx => "xlsx",
            FileFormat::Xlsm => "xlsm",
            FileFormat::Xltx => "xltx",
            FileFormat::Xls => "xls",
            FileFormat::Xlsb => "xlsb",
            FileFormat::Ods => "ods",
            FileFormat::Sqlite => "sqlite",
            FileFormat::Dbf => "dbf",
            FileFormat::Mdb => "mdb",
            FileFormat::Accdb => "accdb",
            FileFormat::Parquet => "parquet",
            FileFormat::DuckDb => "duckdb",
            FileFormat::Jsonl => "jsonl",
            FileFormat::Json => "json",
            FileFormat::Xml => "xml",
            FileFormat::Html => "html",
            FileFormat::Txt => "txt",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for format in FileFormat::ALL {
            assert_eq!(FileFormat::from_code(format.code()), Some(format));
        }
        assert_eq!(FileFormat::from_code(20), None);
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(FileFormat::from_extension("CSV"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::from_extension("xlsx"), Some(FileFormat::Xlsx));
        assert_eq!(FileFormat::from_extension("ndjson"), Some(FileFormat::Jsonl));
        assert_eq!(FileFormat::from_extension("dat"), None);
    }

    #[test]
    fn manifest_names_are_lowercase() {
        let json = serde_json::to_string(&FileFormat::DuckDb).unwrap();
        assert_eq!(json, "\"duckdb\"");
        let back: FileFormat = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(back, FileFormat::Auto);
    }
}
