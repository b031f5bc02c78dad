use assert_fs::prelude::*;
use conf_fs::{Tree, io::write_atomic, save_document};
use predicates::prelude::*;
use serde_json::json;

fn tree(value: serde_json::Value) -> Tree {
    value.as_object().cloned().unwrap()
}

#[test]
fn write_atomic_leaves_no_temp_files() {
    let temp = assert_fs::TempDir::new().unwrap();
    let target = temp.child("user/assistant.conf");

    write_atomic(target.path(), b"{}").unwrap();
    write_atomic(target.path(), br#"{"lang": "en-us"}"#).unwrap();

    target.assert(r#"{"lang": "en-us"}"#);
    let leftovers: Vec<_> = std::fs::read_dir(temp.child("user").path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|name| name.to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
}

#[test]
fn save_document_replaces_commented_file_with_plain_json() {
    let temp = assert_fs::TempDir::new().unwrap();
    let target = temp.child("assistant.conf");
    target
        .write_str("{\n  // hand edited\n  \"lang\": \"en-us\"\n}\n")
        .unwrap();

    save_document(target.path(), &tree(json!({"lang": "de-de"}))).unwrap();

    target.assert(predicate::str::contains("\"lang\": \"de-de\""));
    target.assert(predicate::str::contains("//").not());
}

#[test]
fn save_document_writes_toml_tables() {
    let temp = assert_fs::TempDir::new().unwrap();
    let target = temp.child("engine.toml");

    save_document(
        target.path(),
        &tree(json!({"remote": {"url": "https://api.example.org", "timeout_secs": 10}})),
    )
    .unwrap();

    target.assert(predicate::str::contains("[remote]"));
    target.assert(predicate::str::contains("timeout_secs = 10"));
}
