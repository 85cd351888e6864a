//! End-to-end exercise of the `ff_*` surface, calling the exported entry
//! points the way a C host would.

use flatfile_abi::ffi::{
    ff_alloc, ff_attach_file, ff_close_file, ff_describe_dataset, ff_detach_source,
    ff_evaluate_quality_rules, ff_export_project_manifest, ff_free, ff_get_last_error,
    ff_get_last_json, ff_get_workbook_memory_stats, ff_get_workbook_source_paths, ff_init,
    ff_list_dataset_memory_stats, ff_list_dataset_sources, ff_list_datasets, ff_open_file,
    ff_profile_dataset, ff_query, ff_rename_dataset, FF_STATUS_ERROR, FF_STATUS_INVALID_HANDLE,
    FF_STATUS_OK,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::ffi::{c_char, CStr, CString};

const ORDERS_CSV: &[u8] = b"id,qty,country\n1,3,DE\n2,5,FR\n";
const CUSTOMERS_CSV: &[u8] = b"cust_id,name\n10,ada\n";

fn cstring(text: &str) -> CString {
    CString::new(text).expect("no interior NUL")
}

unsafe fn json_at(pointer: *const c_char) -> Value {
    assert!(!pointer.is_null());
    let text = CStr::from_ptr(pointer).to_str().expect("utf-8 payload");
    serde_json::from_str(text).expect("valid json payload")
}

unsafe fn last_error() -> String {
    CStr::from_ptr(ff_get_last_error())
        .to_str()
        .expect("utf-8 error")
        .to_string()
}

unsafe fn open_csv(buffer: &[u8], name: &str) -> u64 {
    let name = cstring(name);
    ff_open_file(buffer.as_ptr(), buffer.len(), name.as_ptr(), 0, 0, 1)
}

// One sequential test: the `ff_getLast*` mirrors are process-global, so
// asserting them from parallel test threads would race.
#[test]
fn full_surface_end_to_end() {
    unsafe {
        ff_init();

        // Failed opens return the reserved zero handle: declared sqlite but
        // garbage bytes, then an unknown format code.
        let broken_name = cstring("broken.sqlite");
        let garbage = b"definitely not a database";
        let failed = ff_open_file(garbage.as_ptr(), garbage.len(), broken_name.as_ptr(), 9, 0, 1);
        assert_eq!(failed, 0);
        assert!(last_error().contains("broken.sqlite"));
        let failed = ff_open_file(garbage.as_ptr(), garbage.len(), broken_name.as_ptr(), 99, 0, 1);
        assert_eq!(failed, 0);
        assert!(last_error().contains("format code"));

        let handle = open_csv(ORDERS_CSV, "orders.csv");
        assert!(handle > 0, "open failed: {}", last_error());

        let listed = json_at(ff_list_datasets(handle));
        assert_eq!(listed["sheets"][0]["name"], json!("orders"));
        assert_eq!(listed["sheets"][0]["rowCount"], json!(2));

        let sql = cstring("SELECT COUNT(*) FROM orders");
        let result = json_at(ff_query(handle, sql.as_ptr()));
        assert_eq!(result["columns"], json!([{ "name": "COUNT(*)", "type": "int" }]));
        assert_eq!(result["rows"], json!([[2]]));

        // The process-level mirror carries the same payload.
        let mirrored = json_at(ff_get_last_json());
        assert_eq!(mirrored, result);
        assert_eq!(last_error(), "");

        let attach_name = cstring("customers.csv");
        let status = ff_attach_file(
            handle,
            CUSTOMERS_CSV.as_ptr(),
            CUSTOMERS_CSV.len(),
            attach_name.as_ptr(),
            0,
            0,
            1,
        );
        assert_eq!(status, FF_STATUS_OK);

        let paths = json_at(ff_get_workbook_source_paths(handle));
        assert_eq!(paths, json!({ "paths": ["orders.csv", "customers.csv"] }));

        let sources = json_at(ff_list_dataset_sources(handle));
        assert_eq!(
            sources["datasets"][1]["technicalName"],
            json!("customers_csv")
        );

        // Rename happy path, then a rejected reserved word.
        let old = cstring("orders");
        let new = cstring("sales");
        assert_eq!(ff_rename_dataset(handle, old.as_ptr(), new.as_ptr()), FF_STATUS_OK);
        let reserved = cstring("select");
        let sales = cstring("sales");
        assert_eq!(
            ff_rename_dataset(handle, sales.as_ptr(), reserved.as_ptr()),
            FF_STATUS_ERROR
        );
        assert!(last_error().contains("select"));

        let described = json_at(ff_describe_dataset(handle, sales.as_ptr()));
        assert_eq!(described["defaultName"], json!("orders"));
        assert_eq!(described["columnCount"], json!(3));

        let profiled = json_at(ff_profile_dataset(handle, sales.as_ptr()));
        assert_eq!(profiled["rowCount"], json!(2));

        let rules = cstring(r#"[{ "rule": "not_null", "column": "qty" }]"#);
        let evaluated = json_at(ff_evaluate_quality_rules(handle, sales.as_ptr(), rules.as_ptr()));
        assert_eq!(evaluated["results"][0]["passed"], json!(true));

        let memory = json_at(ff_get_workbook_memory_stats(handle));
        let file_bytes = memory["approxFileBufferBytes"].as_u64().expect("bytes");
        assert_eq!(file_bytes, (ORDERS_CSV.len() + CUSTOMERS_CSV.len()) as u64);
        let dataset_memory = json_at(ff_list_dataset_memory_stats(handle));
        assert_eq!(dataset_memory["datasets"].as_array().expect("datasets").len(), 2);

        let manifest = json_at(ff_export_project_manifest(handle, std::ptr::null()));
        assert_eq!(manifest["schemaVersion"], json!(1));
        assert_eq!(manifest["baseFile"], json!("orders.csv"));
        assert_eq!(
            manifest["renames"],
            json!([{ "from": "orders", "to": "sales" }])
        );

        let detach = cstring("customers.csv");
        assert_eq!(ff_detach_source(handle, detach.as_ptr()), FF_STATUS_OK);
        let listed = json_at(ff_list_datasets(handle));
        assert_eq!(listed["sheets"].as_array().expect("sheets").len(), 1);

        // Closing invalidates the handle; the error names it.
        ff_close_file(handle);
        let after_close = json_at(ff_list_datasets(handle));
        assert_eq!(after_close, json!({}));
        assert!(last_error().contains(&handle.to_string()));
        assert_eq!(
            ff_detach_source(handle, detach.as_ptr()),
            FF_STATUS_INVALID_HANDLE
        );
        // Closing again is a no-op.
        ff_close_file(handle);
    }
}

#[test]
fn alloc_and_free_round_trip() {
    unsafe {
        let size = 64usize;
        let pointer = ff_alloc(size);
        assert!(!pointer.is_null());
        std::ptr::write_bytes(pointer, 0xAB, size);
        ff_free(pointer, size);
    }
}
