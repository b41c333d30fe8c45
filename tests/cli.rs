//! End-to-end runs of the `thedocs` binary with no engine or summarizer.

use std::{path::Path, process::Command};

use serde_json::Value;

fn thedocs(data_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_thedocs"));
    cmd.arg("--data-dir")
        .arg(data_dir)
        .env_remove("ELASTICSEARCH_URL")
        .env_remove("OPENAI_API_KEY")
        .env_remove("THEDOCS_LOCAL_INDEX")
        .env("THEDOCS_LOG", "error");
    cmd
}

fn run_json(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn upload_list_search_show_delete() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let source = tmp.path().join("Meeting Notes.md");
    std::fs::write(&source, "# Notes\n\nhello world from the command line\n")
        .unwrap();

    let uploaded = run_json(
        thedocs(&data)
            .arg("upload")
            .arg(&source)
            .args(["--title", "Notes", "--description", "Weekly sync"])
            .arg("--json"),
    );
    assert_eq!(uploaded["filename"], "meeting_notes.md");
    assert_eq!(uploaded["indexed"], false);

    let listed = run_json(thedocs(&data).args(["list", "--json"]));
    let records = listed.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["title"], "Notes");
    assert_eq!(records[0]["is_public"], false);

    let public =
        run_json(thedocs(&data).args(["list", "--public-only", "--json"]));
    assert!(public.as_array().unwrap().is_empty());

    let found = run_json(thedocs(&data).args(["search", "hello", "--json"]));
    assert_eq!(found["source"]["kind"], "fallback");
    assert_eq!(found["hits"][0]["filename"], "meeting_notes.md");

    let private = thedocs(&data)
        .args(["show", "meeting_notes.md", "--public-only"])
        .output()
        .unwrap();
    assert!(!private.status.success());

    let shown = thedocs(&data)
        .args(["show", "meeting_notes.md"])
        .output()
        .unwrap();
    assert!(shown.status.success());
    assert!(String::from_utf8_lossy(&shown.stdout).contains("hello world"));

    let status = thedocs(&data)
        .args(["visibility", "meeting_notes.md", "public"])
        .status()
        .unwrap();
    assert!(status.success());
    let public =
        run_json(thedocs(&data).args(["list", "--public-only", "--json"]));
    assert_eq!(public.as_array().unwrap().len(), 1);

    let status = thedocs(&data)
        .args(["delete", "meeting_notes.md"])
        .status()
        .unwrap();
    assert!(status.success());
    let listed = run_json(thedocs(&data).args(["list", "--json"]));
    assert!(listed.as_array().unwrap().is_empty());
}

#[test]
fn process_records_dropped_files() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");

    let status = run_json(thedocs(&data).args(["status", "--json"]));
    assert_eq!(status["records"], 0);
    assert!(status["engine"].is_null());

    let dropped = data.join("markdown_files").join("dropped.md");
    std::fs::write(dropped, "dropped in").unwrap();
    let status = run_json(thedocs(&data).args(["status", "--json"]));
    assert_eq!(status["unsynced"][0], "dropped.md");

    let summary = run_json(thedocs(&data).args(["process", "--json"]));
    assert_eq!(summary["new_files"], 1);
    assert_eq!(summary["enriched"], 0);
    assert_eq!(summary["errors"], 1);

    let listed = run_json(thedocs(&data).args(["list", "--json"]));
    assert_eq!(listed[0]["filename"], "dropped.md");
}

#[test]
fn unsupported_upload_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("image.png");
    std::fs::write(&source, [0u8, 1, 2]).unwrap();

    let output = thedocs(&tmp.path().join("data"))
        .arg("upload")
        .arg(&source)
        .output()
        .unwrap();
    assert!(!output.status.success());
}
