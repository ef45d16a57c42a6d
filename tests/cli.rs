use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn s57_extract(work_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("s57-extract").unwrap();
    cmd.current_dir(work_dir).env_remove("RUST_LOG");
    cmd
}

fn write_cell(path: &Path, cell: serde_json::Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, cell.to_string()).unwrap();
}

fn depare(values: &[Option<f64>]) -> serde_json::Value {
    let features: Vec<serde_json::Value> = values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            json!({
                "geometry": format!("POLYGON Z (({i} 0 0, {i} 1 0, {j} 1 0, {i} 0 0))", i = i, j = i + 1),
                "attributes": {"DRVAL1": value}
            })
        })
        .collect();
    json!({"layers": {"DEPARE": {"fields": ["DRVAL1", "DRVAL2"], "features": features}}})
}

#[test]
fn test_help_exits_zero() {
    let temp_dir = TempDir::new().unwrap();
    s57_extract(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--input-dir"))
        .stdout(predicate::str::contains("--output-dir"));
}

#[test]
fn test_missing_arguments_exit_one() {
    let temp_dir = TempDir::new().unwrap();
    s57_extract(temp_dir.path())
        .args(["-i", "enc"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--output-dir"));
}

#[test]
fn test_land_only_cell() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("ENC_ROOT");
    write_cell(
        &input.join("US5XX01M/US5XX01M.000"),
        json!({"layers": {"LNDARE": {"features": [
            {"geometry": "POLYGON ((0 0, 1 0, 1 1, 0 0))"}
        ]}}}),
    );

    s57_extract(temp_dir.path())
        .args(["-i", "ENC_ROOT", "-o", "out", "--engine", "snapshot", "-q"])
        .assert()
        .success();

    let content = fs::read_to_string(temp_dir.path().join("out/depth.csv")).unwrap();
    assert_eq!(
        content,
        "WKT,LAYERS,DEPTH\n\"POLYGON ((0 0, 1 0, 1 1, 0 0))\",LNDARE,-1\n"
    );
}

#[test]
fn test_two_cells_accumulate_and_flatten() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("enc");
    write_cell(&input.join("US4AA01M.000"), depare(&[Some(0.0), None, Some(5.0)]));
    write_cell(&input.join("US4BB01M.000"), depare(&[Some(10.0), Some(2.5)]));

    s57_extract(temp_dir.path())
        .args(["-i", "enc", "-o", "out", "--engine", "snapshot", "--output-format", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rows written: 4"));

    let content = fs::read_to_string(temp_dir.path().join("out/depth.csv")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[1], "\"POLYGON ((0 0, 0 1, 1 1, 0 0))\",DEPARE,0");
    assert_eq!(lines[4], "\"POLYGON ((1 0, 1 1, 2 1, 1 0))\",DEPARE,2.5");
}

#[test]
fn test_names_profile_from_layers_flag() {
    let temp_dir = TempDir::new().unwrap();
    write_cell(
        &temp_dir.path().join("enc/FR3NAM01.000"),
        json!({"layers": {
            "SEAARE": {"fields": ["NOBJNM"], "features": [
                {"geometry": "POINT (1 2)", "attributes": {"NOBJNM": "Mer d'Iroise"}}
            ]},
            "BRIDGE": {"fields": ["OBJNAM"], "features": [
                {"geometry": "POINT (3 4)", "attributes": {"OBJNAM": "Pont"}}
            ]}
        }}),
    );

    s57_extract(temp_dir.path())
        .args([
            "-i", "enc", "-o", "out", "--engine", "snapshot", "-q", "--layers", "SEAARE,BRIDGE",
            "--field", "NOBJNM",
        ])
        .assert()
        .success();

    let content = fs::read_to_string(temp_dir.path().join("out/nobjnm.csv")).unwrap();
    assert_eq!(
        content,
        "WKT,LEVEL,LAYERS,NOBJNM\nPOINT (1 2),3,SEAARE,Mer d'Iroise\n"
    );
}

#[test]
fn test_empty_input_creates_no_output() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("enc")).unwrap();

    s57_extract(temp_dir.path())
        .args(["-i", "enc", "-o", "out", "--engine", "snapshot", "-q"])
        .assert()
        .success();

    assert!(!temp_dir.path().join("out").exists());
}

#[test]
fn test_missing_input_dir_exits_one() {
    let temp_dir = TempDir::new().unwrap();
    s57_extract(temp_dir.path())
        .args(["-i", "nowhere", "-o", "out", "--engine", "snapshot"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("nowhere"));
}

#[test]
fn test_unreadable_cell_does_not_fail_run() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("enc")).unwrap();
    fs::write(temp_dir.path().join("enc/US5BAD01.000"), "\u{0}\u{1}binary").unwrap();

    s57_extract(temp_dir.path())
        .args(["-i", "enc", "-o", "out", "--engine", "snapshot", "--report", "run.json", "-q"])
        .assert()
        .success();

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(temp_dir.path().join("run.json")).unwrap())
            .unwrap();
    assert_eq!(report["files_processed"], 1);
    assert_eq!(report["files"][0]["outcome"], "skipped_open_failure");
}

#[test]
fn test_archive_flag() {
    let temp_dir = TempDir::new().unwrap();
    write_cell(&temp_dir.path().join("enc/US4AA01M.000"), depare(&[Some(3.0)]));

    s57_extract(temp_dir.path())
        .args(["-i", "enc", "-o", "out", "-n", "soundings", "--engine", "snapshot", "--archive", "-q"])
        .assert()
        .success();

    assert!(temp_dir.path().join("out/soundings.csv").exists());
    assert!(temp_dir.path().join("out/soundings.zip").exists());
}

#[test]
fn test_dry_run_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    write_cell(&temp_dir.path().join("enc/US4AA01M.000"), depare(&[Some(3.0)]));

    s57_extract(temp_dir.path())
        .args(["-i", "enc", "-o", "out", "--engine", "snapshot", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("UNION ALL").not())
        .stdout(predicate::str::contains("FROM \"DEPARE\""));

    assert!(!temp_dir.path().join("out").exists());
}

#[test]
fn test_output_containing_input_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    write_cell(&temp_dir.path().join("enc/US4AA01M.000"), depare(&[Some(3.0)]));

    s57_extract(temp_dir.path())
        .args(["-i", "enc", "-o", ".", "--engine", "snapshot"])
        .assert()
        .code(1);

    assert!(temp_dir.path().join("enc/US4AA01M.000").exists());
}

#[test]
fn test_generate_config() {
    let temp_dir = TempDir::new().unwrap();

    s57_extract(temp_dir.path())
        .args(["--generate-config", "--config", "sample.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sample.toml"));

    let content = fs::read_to_string(temp_dir.path().join("sample.toml")).unwrap();
    assert!(content.contains("[extraction]"));
}
