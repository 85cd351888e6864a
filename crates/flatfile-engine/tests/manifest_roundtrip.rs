use flatfile_engine::{import_project, EngineContext, EngineError, ProjectManifest};
use flatfile_model::{FileFormat, OpenOptions};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::io;

const BASE_CSV: &[u8] = b"id,qty\n1,3\n2,5\n";
const EXTRA_CSV: &[u8] = b"cust_id,name\n10,ada\n";

fn file_map() -> HashMap<String, Vec<u8>> {
    HashMap::from([
        ("base.csv".to_string(), BASE_CSV.to_vec()),
        ("extra.csv".to_string(), EXTRA_CSV.to_vec()),
    ])
}

fn loader(
    files: HashMap<String, Vec<u8>>,
) -> impl FnMut(&str) -> io::Result<Vec<u8>> {
    move |path: &str| {
        files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }
}

fn build_workbook() -> EngineContext {
    let mut workbook = EngineContext::open(
        BASE_CSV,
        "base.csv",
        FileFormat::Auto,
        OpenOptions::default(),
    )
    .expect("open base");
    workbook
        .attach(EXTRA_CSV, "extra.csv", FileFormat::Auto, OpenOptions::default())
        .expect("attach extra");
    workbook.rename_dataset("base", "orders").expect("rename");
    workbook
}

#[test]
fn export_describes_the_workbook() {
    let workbook = build_workbook();
    let manifest = workbook.export_manifest(None).expect("export");

    assert_eq!(manifest.schema_version, 1);
    assert_eq!(manifest.project_name.as_deref(), Some("base"));
    assert_eq!(manifest.base_file, "base.csv");
    let paths: Vec<&str> = manifest.sources.iter().map(|s| s.path.as_str()).collect();
    assert_eq!(paths, vec!["base.csv", "extra.csv"]);
    assert_eq!(manifest.renames.len(), 1);
    assert_eq!(manifest.renames[0].from, "base");
    assert_eq!(manifest.renames[0].to, "orders");

    let named = workbook.export_manifest(Some("quarterly")).expect("export");
    assert_eq!(named.project_name.as_deref(), Some("quarterly"));
}

#[test]
fn round_trip_reproduces_the_workbook() {
    let original = build_workbook();
    let manifest = original.export_manifest(None).expect("export");
    let expected_datasets = original.list_datasets();
    let expected_sources = original.list_dataset_sources();
    drop(original);

    // Serialize and reparse so the trip covers the JSON codec too.
    let text = manifest.to_json().expect("emit json");
    let parsed = ProjectManifest::from_json(&text).expect("parse json");

    let mut rebuilt = import_project(&parsed, loader(file_map())).expect("import project");
    assert_eq!(rebuilt.list_datasets(), expected_datasets);
    assert_eq!(rebuilt.list_dataset_sources(), expected_sources);
    rebuilt
        .query("SELECT COUNT(*) FROM orders")
        .expect("renamed dataset queryable");
}

#[test]
fn import_is_strict_about_missing_sources() {
    let original = build_workbook();
    let manifest = original.export_manifest(None).expect("export");
    drop(original);

    let mut files = file_map();
    files.remove("extra.csv");
    let err = import_project(&manifest, loader(files)).unwrap_err();
    let EngineError::OpenFailed(message) = err else {
        panic!("expected aggregate OpenFailed");
    };
    assert!(message.contains("extra.csv"));
}

#[test]
fn import_collects_rename_failures() {
    let text = json!({
        "schemaVersion": 1,
        "baseFile": "base.csv",
        "sources": [{ "path": "base.csv" }],
        "renames": [{ "from": "nonexistent", "to": "orders" }],
    })
    .to_string();
    let manifest = ProjectManifest::from_json(&text).expect("parse");
    let err = import_project(&manifest, loader(file_map())).unwrap_err();
    let EngineError::OpenFailed(message) = err else {
        panic!("expected aggregate OpenFailed");
    };
    assert!(message.contains("nonexistent"));
}
