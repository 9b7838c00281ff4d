//! End-to-end tests for the `draftcanvas` binary.

use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};

use serde_json::Value;

const RESPONSE: &str = r##"Sure! Here is the diagram:

```json
[
  {"type": "text", "x": 100, "y": 40, "text": "Checkout", "fontSize": 28},
  {"type": "rectangle", "x": 100, "y": 120, "width": 200, "height": 80, "text": "Cart", "backgroundColor": "#e3f2fd"},
  {"type": "arrow", "x": 200, "y": 200, "points": [[0, 0], [0, 100]]},
]
```
"##;

fn draftcanvas() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_draftcanvas"));
    command.env_remove("CANVAS_DEBUG");
    command
}

fn run(args: &[&str]) -> Output {
    draftcanvas().args(args).output().expect("run draftcanvas")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn parse_prints_elements_from_a_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("response.txt");
    fs::write(&path, RESPONSE).expect("write response");

    let output = run(&["parse", path.to_str().expect("utf-8 path")]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let elements = stdout_json(&output);
    let types: Vec<&str> = elements
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|element| element["type"].as_str())
        .collect();
    assert_eq!(types, ["text", "rectangle", "text", "arrow"]);
    assert_eq!(elements[2]["containerId"], elements[1]["id"]);
}

#[test]
fn parse_reads_stdin() {
    let mut child = draftcanvas()
        .args(["parse", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn draftcanvas");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(br#"[{"type":"ellipse","x":5,"y":5}]"#)
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)[0]["type"], "ellipse");
}

#[test]
fn parse_summary_reports_strategy_and_counts() {
    let output = run(&["parse", "--summary", RESPONSE]);
    assert!(output.status.success());
    let summary = stdout_json(&output);
    assert_eq!(summary["element_count"], 4);
    assert_eq!(summary["source_count"], 3);
    assert_eq!(summary["strategy"], "direct");
}

#[test]
fn parse_scene_wraps_elements() {
    let output = run(&["parse", "--scene", r#"[{"type":"diamond"}]"#]);
    assert!(output.status.success());
    let scene = stdout_json(&output);
    assert_eq!(scene["type"], "excalidraw");
    assert_eq!(scene["elements"][0]["type"], "diamond");
}

#[test]
fn parse_of_garbage_prints_an_empty_array() {
    let output = run(&["parse", "hello world"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output), serde_json::json!([]));
}

#[test]
fn parse_writes_to_an_output_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("elements.json");
    let output = run(&[
        "parse",
        "--pretty",
        "-o",
        out.to_str().expect("utf-8 path"),
        r#"[{"type":"text","text":"hi"}]"#,
    ]);
    assert!(output.status.success());
    let written: Value =
        serde_json::from_str(&fs::read_to_string(&out).expect("read output")).expect("json");
    assert_eq!(written[0]["text"], "hi");
}

#[test]
fn extract_prints_the_bare_array() {
    let output = run(&["extract", "Result: ```json\n[1, 2,]\n```"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "[1, 2]");
}

#[test]
fn extract_fails_without_an_array() {
    let output = run(&["extract", "no diagram here"]);
    assert!(!output.status.success());
}

#[test]
fn check_passes_for_a_clean_response() {
    let output = run(&["check", "--json", RESPONSE]);
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["passed"], true);
    assert_eq!(report["element_count"], 4);
}

#[test]
fn check_fails_when_nothing_is_renderable() {
    let output = run(&["check", "hello world"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Nothing renderable"));
}

#[test]
fn strict_check_fails_on_dropped_elements() {
    let input = r#"[{"type":"rectangle"},{"type":"arrow","points":"oops"}]"#;
    assert!(run(&["check", input]).status.success());

    let strict = run(&["check", "--strict", "--json", input]);
    assert!(!strict.status.success());
    let report = stdout_json(&strict);
    assert_eq!(report["dropped_count"], 1);
    assert_eq!(report["renderable"], true);
}

#[test]
fn config_file_limits_label_length() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("draftcanvas.toml");
    fs::write(&config, "text_limit = 4\n").expect("write config");

    let output = run(&[
        "--config",
        config.to_str().expect("utf-8 path"),
        "parse",
        r#"[{"type":"text","text":"truncate me"}]"#,
    ]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)[0]["text"], "trun");
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("broken.toml");
    fs::write(&config, "text_limit = \"many\"\n").expect("write config");

    let output = run(&["--config", config.to_str().expect("utf-8 path"), "parse", "[]"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid config"));
}

#[test]
fn canvas_debug_env_enables_info_logging() {
    let input = r#"[{"type":"text"}]"#;
    let enabled = draftcanvas()
        .env("CANVAS_DEBUG", "1")
        .args(["parse", input])
        .output()
        .expect("run draftcanvas");
    assert!(enabled.status.success());
    assert!(String::from_utf8_lossy(&enabled.stderr).contains("parsed with strategy"));

    let disabled = draftcanvas()
        .env("CANVAS_DEBUG", "0")
        .args(["parse", input])
        .output()
        .expect("run draftcanvas");
    assert!(disabled.status.success());
    assert!(!String::from_utf8_lossy(&disabled.stderr).contains("parsed with strategy"));
}

#[test]
fn config_file_debug_enables_info_logging() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("draftcanvas.toml");
    fs::write(&config, "[debug]\nenabled = true\n").expect("write config");

    let output = run(&[
        "--config",
        config.to_str().expect("utf-8 path"),
        "parse",
        r#"[{"type":"ellipse"}]"#,
    ]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("parsed with strategy"));
}
