//! Project manifest codec.
//!
//! A manifest is the reproducible description of a multi-file workbook: the
//! base file, every attached source with its open-options, and the renames
//! applied on top of the default dataset names. Unknown fields round-trip
//! through the flattened `extra` maps.

use crate::{EngineContext, EngineError, Result};
use flatfile_model::{file_stem, FileFormat, OpenOptions, SheetObjectKind, SourceRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub base_file: String,
    pub sources: Vec<ManifestSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub renames: Vec<ManifestRename>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSource {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FileFormat>,
    /// Single-character delimiter override for delimited text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default = "default_true")]
    pub has_header_row: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excel: Option<ManifestSpreadsheetFilter>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ManifestSpreadsheetFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SheetObjectKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestRename {
    pub from: String,
    pub to: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

fn default_true() -> bool {
    true
}

impl ProjectManifest {
    pub fn from_json(text: &str) -> Result<ProjectManifest> {
        let manifest: ProjectManifest = serde_json::from_str(text)
            .map_err(|err| EngineError::OpenFailed(format!("invalid manifest: {err}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| EngineError::ExportFailed(err.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(EngineError::OpenFailed(format!(
                "unsupported manifest schema version {} (expected {MANIFEST_SCHEMA_VERSION})",
                self.schema_version
            )));
        }
        if self.sources.is_empty() {
            return Err(EngineError::OpenFailed(
                "manifest lists no sources".to_string(),
            ));
        }
        if !self.sources.iter().any(|s| s.path == self.base_file) {
            return Err(EngineError::OpenFailed(format!(
                "manifest base file `{}` is not among its sources",
                self.base_file
            )));
        }
        Ok(())
    }
}

impl ManifestSource {
    pub fn declared_format(&self) -> FileFormat {
        self.format.unwrap_or(FileFormat::Auto)
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            delimiter: self
                .delimiter
                .as_ref()
                .and_then(|d| d.as_bytes().first().copied()),
            has_header_row: self.has_header_row,
            object_kind: self
                .excel
                .as_ref()
                .and_then(|excel| excel.kind)
                .unwrap_or_default(),
            object_names: self
                .excel
                .as_ref()
                .map(|excel| excel.names.clone())
                .unwrap_or_default(),
        }
    }
}

impl EngineContext {
    /// Emit the manifest describing this workbook. `project_name` defaults to
    /// the base file's stem.
    pub fn export_manifest(&self, project_name: Option<&str>) -> Result<ProjectManifest> {
        let base = self.source_table().first().ok_or_else(|| {
            EngineError::ExportFailed("workbook has no attached sources".to_string())
        })?;
        let base_file = base.path.clone();
        let project_name = project_name
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| file_stem(&base_file).to_string());

        let sources = self.source_table().iter().map(source_entry).collect();
        let renames = self
            .registry()
            .iter()
            .filter(|dataset| dataset.technical_name != dataset.default_name)
            .map(|dataset| ManifestRename {
                from: dataset.default_name.clone(),
                to: dataset.technical_name.clone(),
                extra: Map::new(),
            })
            .collect();

        Ok(ProjectManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            project_name: Some(project_name),
            base_file,
            sources,
            renames,
            extra: Map::new(),
        })
    }
}

fn source_entry(record: &SourceRecord) -> ManifestSource {
    let options = &record.options;
    let excel = (options.object_kind != SheetObjectKind::Any || !options.object_names.is_empty())
        .then(|| ManifestSpreadsheetFilter {
            kind: Some(options.object_kind),
            names: options.object_names.clone(),
        });
    ManifestSource {
        path: record.path.clone(),
        format: Some(record.format),
        delimiter: options.delimiter.map(|byte| (byte as char).to_string()),
        has_header_row: options.has_header_row,
        excel,
        extra: Map::new(),
    }
}

/// Rebuild a workbook from a manifest, loading each source's bytes through
/// `load` (paths are interpreted by the caller, typically relative to a
/// project root).
///
/// Strict mode: any per-source or per-rename failure is collected, the
/// partially built workbook is torn down, and the errors surface as one
/// aggregate failure.
pub fn import_project<F>(manifest: &ProjectManifest, mut load: F) -> Result<EngineContext>
where
    F: FnMut(&str) -> std::io::Result<Vec<u8>>,
{
    manifest.validate()?;
    let base_entry = manifest
        .sources
        .iter()
        .find(|source| source.path == manifest.base_file)
        .ok_or_else(|| {
            EngineError::OpenFailed(format!(
                "manifest base file `{}` is not among its sources",
                manifest.base_file
            ))
        })?;

    let base_bytes = load(&base_entry.path).map_err(|err| {
        EngineError::OpenFailed(format!("failed to read `{}`: {err}", base_entry.path))
    })?;
    let mut context = EngineContext::open(
        &base_bytes,
        &base_entry.path,
        base_entry.declared_format(),
        base_entry.open_options(),
    )?;

    let mut errors: Vec<String> = Vec::new();
    for source in manifest
        .sources
        .iter()
        .filter(|source| source.path != manifest.base_file)
    {
        match load(&source.path) {
            Ok(bytes) => {
                if let Err(err) = context.attach(
                    &bytes,
                    &source.path,
                    source.declared_format(),
                    source.open_options(),
                ) {
                    errors.push(format!("attach `{}`: {err}", source.path));
                }
            }
            Err(err) => errors.push(format!("read `{}`: {err}", source.path)),
        }
    }
    for rename in &manifest.renames {
        if let Err(err) = context.rename_dataset(&rename.from, &rename.to) {
            errors.push(format!("rename `{}` -> `{}`: {err}", rename.from, rename.to));
        }
    }

    if errors.is_empty() {
        Ok(context)
    } else {
        Err(EngineError::OpenFailed(errors.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn unknown_fields_round_trip() {
        let text = json!({
            "schemaVersion": 1,
            "baseFile": "a.csv",
            "sources": [{ "path": "a.csv", "vendorHint": "keep-me" }],
            "vendorBlock": { "x": 1 },
        })
        .to_string();
        let manifest = ProjectManifest::from_json(&text).expect("parse");
        assert_eq!(manifest.extra["vendorBlock"], json!({ "x": 1 }));
        assert_eq!(manifest.sources[0].extra["vendorHint"], json!("keep-me"));

        let emitted = manifest.to_json().expect("emit");
        let back = ProjectManifest::from_json(&emitted).expect("reparse");
        assert_eq!(back.extra["vendorBlock"], json!({ "x": 1 }));
    }

    #[test]
    fn schema_version_is_enforced() {
        let text = json!({
            "schemaVersion": 2,
            "baseFile": "a.csv",
            "sources": [{ "path": "a.csv" }],
        })
        .to_string();
        assert!(matches!(
            ProjectManifest::from_json(&text),
            Err(EngineError::OpenFailed(_))
        ));
    }

    #[test]
    fn base_file_must_be_listed() {
        let text = json!({
            "schemaVersion": 1,
            "baseFile": "a.csv",
            "sources": [{ "path": "b.csv" }],
        })
        .to_string();
        assert!(matches!(
            ProjectManifest::from_json(&text),
            Err(EngineError::OpenFailed(_))
        ));
    }

    #[test]
    fn source_options_map_back_to_open_options() {
        let text = json!({
            "schemaVersion": 1,
            "baseFile": "a.tsv",
            "sources": [{
                "path": "a.tsv",
                "format": "tsv",
                "delimiter": "\t",
                "hasHeaderRow": false,
                "excel": { "kind": "sheet", "names": ["One"] },
            }],
        })
        .to_string();
        let manifest = ProjectManifest::from_json(&text).expect("parse");
        let source = &manifest.sources[0];
        assert_eq!(source.declared_format(), FileFormat::Tsv);
        let options = source.open_options();
        assert_eq!(options.delimiter, Some(b'\t'));
        assert!(!options.has_header_row);
        assert_eq!(options.object_kind, SheetObjectKind::Sheet);
        assert_eq!(options.object_names, vec!["One"]);
    }
}
