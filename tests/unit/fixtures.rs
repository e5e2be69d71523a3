//! Fixture store loading, exercised against a throwaway directory tree
//! rather than the shipped `fixtures/` so each case controls its own
//! YAML precisely.

use sentra_core::fixtures::FixtureStore;
use std::fs;
use tempfile::TempDir;

fn write(dir: &TempDir, rel_path: &str, contents: &str) {
    let full = dir.path().join(rel_path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, contents).unwrap();
}

#[test]
fn loads_nested_yaml_files_indexed_by_relative_path_and_category() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "chat/greeting.yaml",
        r#"
description: greetings
category: chat
responses:
  - id: hi-1
    content: "Hello! How can I help?"
    weight: 1.0
"#,
    );

    let store = FixtureStore::load_dir(dir.path()).expect("load_dir");
    assert!(store.path_exists("chat/greeting.yaml"));
    let fixture = store.by_id("chat/greeting.yaml", "hi-1").expect("by_id");
    assert_eq!(fixture.content, "Hello! How can I help?");
    assert_eq!(fixture.role, "assistant");

    let from_category = store.by_category("chat").expect("by_category");
    assert_eq!(from_category.id, "hi-1");
}

#[test]
fn rejects_duplicate_ids_within_one_file() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "chat/dupes.yaml",
        r#"
category: chat
responses:
  - id: same-id
    content: "first"
  - id: same-id
    content: "second"
"#,
    );

    assert!(FixtureStore::load_dir(dir.path()).is_err());
}

#[test]
fn rejects_empty_content_without_a_function_call() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "chat/empty.yaml",
        r#"
category: chat
responses:
  - id: blank
    content: ""
"#,
    );

    assert!(FixtureStore::load_dir(dir.path()).is_err());
}

#[test]
fn rejects_negative_weight() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "chat/negative.yaml",
        r#"
category: chat
responses:
  - id: bad-weight
    content: "some content"
    weight: -1.0
"#,
    );

    assert!(FixtureStore::load_dir(dir.path()).is_err());
}

#[test]
fn accepts_a_function_call_fixture_with_empty_content() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "chat/tool.yaml",
        r#"
category: chat
responses:
  - id: call-weather
    content: ""
    function_call:
      name: get_weather
      arguments: "{\"city\":\"Paris\"}"
    finish_reason: function_call
"#,
    );

    let store = FixtureStore::load_dir(dir.path()).expect("load_dir");
    let fixture = store.by_id("chat/tool.yaml", "call-weather").expect("by_id");
    assert_eq!(fixture.function_call.as_ref().unwrap().0, "get_weather");
}
