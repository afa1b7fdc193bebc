// CLI integration tests: drive the `tfsview` binary against scratch TFS files.
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::Value;

const TWISS: &str = r#"@ NAME             %s  "TWISS"
@ SEQUENCE         %s  "LHCB1"
@ Q1               %le 62.31
@ NPARTICLES       %d  3
* NAME      KEYWORD   S        BETX     MU
$ %s        %s        %le      %le      %le
 "IP1"      "MARKER"  0.0      0.55     0.0
 "MQXA.1R1" "QUAD"    26.15    1800.5   0.02
 "BPM 1"    "MONITOR" 31.5     nan      0.03
 "MQXA.1L2" "QUAD"    3300.1   2100.25  15.1
"#;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_tfsview");
    Command::new(exe)
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn stdout_json(output: &Output) -> Value {
    parse_json(std::str::from_utf8(&output.stdout).expect("utf8"))
}

fn stderr_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .filter(|line| line.starts_with('{'))
        .map(parse_json)
        .collect()
}

fn write_fixture(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("write fixture");
    path.to_str().expect("utf8 path").to_string()
}

fn run(args: &[&str]) -> Output {
    cmd().args(args).output().expect("run tfsview")
}

#[test]
fn headers_lists_entries_in_file_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&["headers", &file, "--json"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    let headers = json["headers"].as_array().expect("headers array");
    let keys = headers
        .iter()
        .map(|entry| entry["key"].as_str().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(keys, ["NAME", "SEQUENCE", "Q1", "NPARTICLES"]);
    assert_eq!(headers[2]["type"], "%le");
    assert_eq!(headers[2]["value"], 62.31);
    assert_eq!(headers[3]["value"], 3);

    let single = run(&["headers", &file, "--key", "SEQUENCE"]);
    assert!(single.status.success());
    assert_eq!(String::from_utf8_lossy(&single.stdout).trim(), "LHCB1");
}

#[test]
fn missing_header_key_exits_with_key_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&["headers", &file, "--key", "Q2"]);
    assert_eq!(output.status.code(), Some(9));
    let errors = stderr_lines(&output);
    assert_eq!(errors[0]["error"]["kind"], "KeyNotFound");
    assert_eq!(errors[0]["error"]["key"], "Q2");
}

#[test]
fn columns_reports_names_types_and_kinds() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&["columns", &file, "--json"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["rows"], 4);
    let columns = json["columns"].as_array().expect("columns");
    assert_eq!(columns.len(), 5);
    assert_eq!(columns[0]["name"], "NAME");
    assert_eq!(columns[0]["kind"], "text");
    assert_eq!(columns[3]["type"], "%le");
    assert_eq!(columns[3]["kind"], "float");
}

#[test]
fn show_filters_before_projecting() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&[
        "show",
        &file,
        "--columns",
        "NAME,S",
        "--where",
        ".KEYWORD == \"QUAD\"",
        "--format",
        "json",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["columns"], serde_json::json!(["NAME", "S"]));
    assert_eq!(
        json["rows"],
        serde_json::json!([["MQXA.1R1", 26.15], ["MQXA.1L2", 3300.1]])
    );
}

#[test]
fn show_limit_and_nan_in_json() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&[
        "show", &file, "--columns", "BETX", "--limit", "3", "--format", "json",
    ]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    let rows = json["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 3);
    assert!(rows[2][0].is_null());
}

#[test]
fn show_table_prints_aligned_rows() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&["show", &file, "--columns", "NAME,MU", "--limit", "2"]);
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("NAME"));
    assert!(lines[1].starts_with("IP1"));
    assert!(lines[2].contains("2.0e-02"));
}

#[test]
fn show_index_moves_column_first_and_survives_projection() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&[
        "show", &file, "--columns", "S,BETX", "--index", "NAME", "--format", "json",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["columns"], serde_json::json!(["NAME", "S", "BETX"]));
    assert_eq!(json["rows"][1], serde_json::json!(["MQXA.1R1", 26.15, 1800.5]));

    let output = run(&["show", &file, "--index", "NAMES"]);
    assert_eq!(output.status.code(), Some(8));
}

#[test]
fn invalid_where_expression_is_usage_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&["show", &file, "--where", ".S >"]);
    assert_eq!(output.status.code(), Some(2));
    let errors = stderr_lines(&output);
    assert_eq!(errors[0]["error"]["kind"], "Usage");
    assert!(errors[0]["error"]["hint"].is_string());
}

#[test]
fn unknown_column_exits_with_column_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&["show", &file, "--columns", "BETY"]);
    assert_eq!(output.status.code(), Some(8));
    let errors = stderr_lines(&output);
    assert_eq!(errors[0]["error"]["kind"], "ColumnNotFound");
    assert_eq!(errors[0]["error"]["column"], "BETY");
}

#[test]
fn row_arity_error_reports_line() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(
        temp.path(),
        "short.tfs",
        "* A B\n$ %d %d\n1 2\n3\n",
    );

    let output = run(&["show", &file]);
    assert_eq!(output.status.code(), Some(7));
    let errors = stderr_lines(&output);
    assert_eq!(errors[0]["error"]["kind"], "RowArity");
    assert_eq!(errors[0]["error"]["line"], 4);
    assert!(errors[0]["error"]["path"].as_str().unwrap().ends_with("short.tfs"));
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_file_exits_with_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("nope.tfs");

    let output = run(&["headers", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(3));
    let errors = stderr_lines(&output);
    assert_eq!(errors[0]["error"]["kind"], "NotFound");
    assert!(errors[0]["error"]["hint"].is_string());
}

#[test]
fn usage_error_for_unknown_flag() {
    let output = run(&["show", "x.tfs", "--bogus"]);
    assert_eq!(output.status.code(), Some(2));
    let errors = stderr_lines(&output);
    assert_eq!(errors[0]["error"]["kind"], "Usage");
    assert!(
        errors[0]["error"]["hint"]
            .as_str()
            .unwrap()
            .contains("tfsview")
    );
}

#[test]
fn write_then_read_back_roundtrips() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);
    let out = temp.path().join("out.tfs");
    let out_str = out.to_str().unwrap();

    let write = run(&[
        "write",
        &file,
        "--columns",
        "NAME,BETX",
        "--where",
        ".S < 100",
        "--set-header",
        "ORIGIN",
        "%s",
        "twiss.tfs",
        "--set-header",
        "Q1",
        "%le",
        "62.28",
        "-o",
        out_str,
    ]);
    assert!(write.status.success(), "{}", String::from_utf8_lossy(&write.stderr));
    assert!(write.stdout.is_empty());

    let headers = stdout_json(&run(&["headers", out_str, "--json"]));
    let keys = headers["headers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["key"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(keys, ["NAME", "SEQUENCE", "Q1", "NPARTICLES", "ORIGIN"]);
    assert_eq!(headers["headers"][2]["value"], 62.28);

    let rows = stdout_json(&run(&["show", out_str, "--format", "json"]));
    assert_eq!(rows["columns"], serde_json::json!(["NAME", "BETX"]));
    assert_eq!(rows["rows"].as_array().unwrap().len(), 3);
    assert_eq!(rows["rows"][1], serde_json::json!(["MQXA.1R1", 1800.5]));
}

#[test]
fn write_refuses_to_replace_its_input() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);
    let same = temp.path().join(".").join("twiss.tfs");

    let output = run(&[
        "write",
        &file,
        "--columns",
        "NAME",
        "-o",
        same.to_str().expect("utf8 path"),
    ]);
    assert_eq!(output.status.code(), Some(2));
    let errors = stderr_lines(&output);
    assert_eq!(errors[0]["error"]["kind"], "Usage");
    assert_eq!(std::fs::read_to_string(&file).expect("read input"), TWISS);
}

#[test]
fn stdin_input_is_accepted() {
    let mut child = cmd()
        .args(["show", "-", "--format", "tfs", "--columns", "S"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(TWISS.as_bytes())
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.starts_with("@ NAME"));
    assert!(text.contains("* "));
    assert!(text.contains("3.3001e+03"));
}

#[test]
fn unknown_type_code_emits_inferred_type_notice() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(
        temp.path(),
        "odd.tfs",
        "* A B\n$ %d %hx\n1 2\n2 3.5\n",
    );

    let output = run(&["columns", &file, "--json"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["columns"][1]["kind"], "float");

    let notices = stderr_lines(&output);
    assert_eq!(notices.len(), 1);
    let notice = &notices[0]["notice"];
    assert_eq!(notice["kind"], "inferred_type");
    assert_eq!(notice["cmd"], "columns");
    assert_eq!(notice["details"]["column"], "B");
    assert_eq!(notice["details"]["kind"], "float");
}

#[test]
fn profile_json_summarizes_columns() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&["profile", &file, "--columns", "KEYWORD,BETX", "--json"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["rows"], 4);
    let keyword = &json["columns"][0];
    assert_eq!(keyword["kind"], "text");
    assert_eq!(keyword["top"], "QUAD");
    assert_eq!(keyword["freq"], 2);
    let betx = &json["columns"][1];
    assert_eq!(betx["nan_count"], 1);
    assert_eq!(betx["min"], 0.55);
    assert_eq!(betx["max"], 2100.25);
}

#[test]
fn chart_scatter_reports_error_bar_mismatch_as_notice() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&[
        "chart", &file, "--kind", "scatter", "--x", "S", "--y", "BETX", "--y", "MU",
        "--error-y", "MU",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let spec = stdout_json(&output);
    assert_eq!(spec["kind"], "scatter");
    assert_eq!(spec["mode"], "markers");
    assert_eq!(spec["traces"][0]["error_y"]["column"], "MU");
    assert!(spec["traces"][1]["error_y"].is_null());
    assert_eq!(spec["x_range"]["max"], 3300.1);

    let notices = stderr_lines(&output);
    assert_eq!(notices[0]["notice"]["kind"], "error_bars_mismatch");
    assert_eq!(notices[0]["notice"]["cmd"], "chart");
}

#[test]
fn chart_histogram_rejects_text_columns() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&["chart", &file, "--kind", "histogram", "--x", "KEYWORD"]);
    assert_eq!(output.status.code(), Some(10));
    let errors = stderr_lines(&output);
    assert_eq!(errors[0]["error"]["kind"], "TypeMismatch");
}

#[test]
fn chart_histogram_uses_requested_bins() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&[
        "chart", &file, "--kind", "histogram", "--x", "S", "--bins", "10", "--norm", "percent",
    ]);
    assert!(output.status.success());
    let spec = stdout_json(&output);
    assert_eq!(spec["edges"].as_array().unwrap().len(), 11);
    let total: f64 = spec["traces"][0]["heights"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h.as_f64().unwrap())
        .sum();
    assert!((total - 100.0).abs() < 1e-9);
}

#[test]
fn chart_passes_presentation_options_through() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(temp.path(), "twiss.tfs", TWISS);

    let output = run(&[
        "chart", &file, "--kind", "histogram", "--x", "S", "--marginal", "box", "--height", "900",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let spec = stdout_json(&output);
    assert_eq!(spec["marginal"], "box");
    assert_eq!(spec["height"], 900);

    let output = run(&[
        "chart", &file, "--kind", "density", "--x", "S", "--y", "MU", "--colorscale", "Viridis",
        "--reverse-scale",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let spec = stdout_json(&output);
    assert_eq!(spec["colorscale"], "Viridis");
    assert_eq!(spec["reverse_scale"], true);
    assert!(spec.get("height").is_none());

    let output = run(&["chart", &file, "--kind", "histogram", "--x", "S", "--height", "50"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn version_emits_json_when_piped() {
    let output = run(&["version"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["name"], "tfsview");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}
