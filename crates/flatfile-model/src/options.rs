use serde::{Deserialize, Serialize};

/// Which kinds of spreadsheet objects an import should consider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetObjectKind {
    #[default]
    Any,
    Sheet,
    NamedRange,
    Table,
}

/// Caller-supplied knobs for opening one source.
///
/// Delimiter and header settings only apply to delimited text; the object
/// kind/name filters only apply to spreadsheet and database formats. Each
/// importer ignores the options it has no use for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenOptions {
    /// Field delimiter override; `None` means the format's default
    /// (`,` for csv/txt, tab for tsv).
    pub delimiter: Option<u8>,
    /// Whether the first row names the columns.
    pub has_header_row: bool,
    pub object_kind: SheetObjectKind,
    /// Object names to import, in order; empty means all.
    pub object_names: Vec<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            has_header_row: true,
            object_kind: SheetObjectKind::Any,
            object_names: Vec::new(),
        }
    }
}

impl OpenOptions {
    /// Options as passed across the ABI: a raw delimiter byte (0 = default)
    /// and a header flag.
    pub fn from_abi(delimiter: u8, has_header_row: bool) -> Self {
        Self {
            delimiter: (delimiter != 0).then_some(delimiter),
            has_header_row,
            ..Self::default()
        }
    }

    /// Whether `name` passes the object-name filter.
    pub fn selects_object(&self, name: &str) -> bool {
        self.object_names.is_empty() || self.object_names.iter().any(|n| n == name)
    }
}
