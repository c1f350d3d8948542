use std::fs;

use embed_launch::config::DataSource;
use embed_launch::data::{self, Split, SplitFormat};
use embed_launch::launch;

#[test_log::test]
fn json_split_is_preferred_over_jsonl() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("train.jsonl"), "").unwrap();
    fs::write(temp.path().join("train.json"), "[]").unwrap();

    let (path, format) = data::find_split(temp.path(), Split::Train).unwrap();
    assert_eq!(path, temp.path().join("train.json"));
    assert_eq!(format, SplitFormat::Json);
}

#[test_log::test]
fn jsonl_split_is_the_fallback() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(
        temp.path().join("dev.jsonl"),
        "\u{feff}{\"query\": \"q1\", \"document\": \"d1\"}\n\n{\"query\": [\"q2\"], \"document\": [\"d2\", \"x\"], \"hard_negative\": \"n2\"}\n",
    )
    .unwrap();

    let (_, format) = data::find_split(temp.path(), Split::Dev).unwrap();
    assert_eq!(format, SplitFormat::JsonLines);

    let triplets = data::load_split(temp.path(), Split::Dev).unwrap();
    assert_eq!(triplets.len(), 2);
    assert_eq!(triplets[0].query, "q1");
    assert_eq!(triplets[0].negative, None);
    assert_eq!(triplets[1].positive, "d2");
    assert_eq!(triplets[1].negative.as_deref(), Some("n2"));
}

#[test_log::test]
fn missing_split_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = data::find_split(temp.path(), Split::Test).unwrap_err();
    assert!(err.to_string().contains("test.json"));
}

#[test_log::test]
fn check_source_skips_hub_and_validates_directories() {
    data::check_source(&DataSource::Hub("org/set".into())).unwrap();

    let temp = tempfile::tempdir().unwrap();
    let source = DataSource::Directory(temp.path().to_path_buf());
    assert!(data::check_source(&source).is_err());

    fs::write(temp.path().join("train.json"), "[]").unwrap();
    assert!(data::check_source(&source).is_err());

    fs::write(
        temp.path().join("train.json"),
        r#"[{"query": "q", "document": "d", "hard_negative": "n"}]"#,
    )
    .unwrap();
    data::check_source(&source).unwrap();
}

#[test_log::test]
fn merge_concatenates_in_order() {
    let temp = tempfile::tempdir().unwrap();
    let a = temp.path().join("a.json");
    let b = temp.path().join("b.json");
    fs::write(&a, r#"[{"query": "첫째"}]"#).unwrap();
    fs::write(&b, r#"[{"query": "second"}, {"query": "third"}]"#).unwrap();

    let out = temp.path().join("merged.json");
    let count = data::merge_files(&[a, b], &out).unwrap();
    assert_eq!(count, 3);

    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("첫째"));
    assert!(text.contains("\n    {"));
    let merged: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
    let queries: Vec<_> = merged.iter().map(|v| v["query"].as_str().unwrap()).collect();
    assert_eq!(queries, ["첫째", "second", "third"]);
}

#[test_log::test]
fn merge_rejects_non_arrays() {
    let temp = tempfile::tempdir().unwrap();
    let a = temp.path().join("a.json");
    fs::write(&a, r#"{"query": "q"}"#).unwrap();
    assert!(data::merge_files(&[a], &temp.path().join("out.json")).is_err());
}

#[test_log::test]
fn merge_with_missing_input_exits_one() {
    let temp = tempfile::tempdir().unwrap();
    let err = data::merge_files(
        &[temp.path().join("missing.json")],
        &temp.path().join("out.json"),
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("missing.json"));
    assert_eq!(launch::exit_code_for_error(&err), 1);
    assert!(!temp.path().join("out.json").exists());
}

#[test_log::test]
fn unreadable_split_during_check_exits_one() {
    let temp = tempfile::tempdir().unwrap();
    fs::create_dir(temp.path().join("train.jsonl")).unwrap();
    // A directory named like a split is not a split file.
    let err = data::check_source(&DataSource::Directory(temp.path().to_path_buf())).unwrap_err();
    assert_eq!(launch::exit_code_for_error(&err), 1);
}
