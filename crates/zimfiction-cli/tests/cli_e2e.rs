use std::fs;
use std::path::Path;

use assert_cmd::Command;
use tempfile::tempdir;

fn zimfiction_build() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("zimfiction-build"))
}

fn write_dump(path: &Path, stories_json: &str) {
    let dump = format!(r#"{{"stories": [{stories_json}], "series": []}}"#);
    fs::write(path, dump).expect("write dump");
}

const STORY: &str = r#"{
    "id": 1,
    "publisher": "Demo",
    "author_ref": {"name": "Alice", "publisher": "Demo", "url": ""},
    "title": "A Small Story",
    "summary_html": "<p>hi</p>",
    "language": "en",
    "status": "completed",
    "rating": null,
    "url": "",
    "published_date": "2020-01-01",
    "updated_date": "2020-01-02",
    "packaged_date": "2020-01-03",
    "source_group": "",
    "source_name": "",
    "score": 0,
    "chapters": [{"index": 1, "title": "Chapter 1", "text_html": "<p>Once upon a time.</p>"}],
    "tags": []
}"#;

#[test]
fn build_writes_a_zim_file_and_exits_zero() {
    let td = tempdir().expect("tempdir");
    let dump_path = td.path().join("dump.json");
    write_dump(&dump_path, STORY);
    let output_path = td.path().join("out.zim");

    zimfiction_build()
        .arg(&dump_path)
        .arg(&output_path)
        .assert()
        .success();

    assert!(output_path.exists());
}

#[test]
fn build_writes_a_receipt_when_log_directory_is_set() {
    let td = tempdir().expect("tempdir");
    let dump_path = td.path().join("dump.json");
    write_dump(&dump_path, STORY);
    let output_path = td.path().join("out.zim");
    let log_dir = td.path().join("logs");

    zimfiction_build()
        .arg(&dump_path)
        .arg(&output_path)
        .arg("--log-directory")
        .arg(&log_dir)
        .assert()
        .success();

    assert!(log_dir.join("receipt.json").exists());
    assert!(log_dir.join("events.jsonl").exists());
}

#[test]
fn missing_store_dump_exits_with_code_two() {
    let td = tempdir().expect("tempdir");
    let output_path = td.path().join("out.zim");

    zimfiction_build()
        .arg(td.path().join("does-not-exist.json"))
        .arg(&output_path)
        .assert()
        .failure()
        .code(2);

    assert!(!output_path.exists());
}

#[test]
fn zero_workers_is_rejected_as_an_invalid_argument() {
    let td = tempdir().expect("tempdir");
    let dump_path = td.path().join("dump.json");
    write_dump(&dump_path, STORY);
    let output_path = td.path().join("out.zim");

    zimfiction_build()
        .arg(&dump_path)
        .arg(&output_path)
        .arg("--workers")
        .arg("0")
        .assert()
        .failure()
        .code(2);
}
