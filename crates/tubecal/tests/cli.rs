use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;
use tubecal::synthetic::SyntheticScan;
use tubecal::{CalibrationParams, CalibrationSummary, TubeId};

#[test]
fn prints_a_json_summary() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.json");
    let config = dir.path().join("config.json");
    let scan = SyntheticScan::default();
    scan.build().unwrap().write_json(&input).unwrap();
    scan.params().write_json(&config).unwrap();

    let output = Command::cargo_bin("tubecal")
        .unwrap()
        .arg("--input")
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: CalibrationSummary = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary.rows_applied, 4 * 128);
    assert_eq!(summary.tubes_calibrated, 4);
    assert!(summary.warnings.is_empty());
}

#[test]
fn skipped_tubes_show_up_in_the_summary() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.json");
    let config = dir.path().join("config.json");
    let scan = SyntheticScan {
        dead_pixels: vec![(TubeId(2), 40)],
        ..SyntheticScan::default()
    };
    scan.build().unwrap().write_json(&input).unwrap();
    CalibrationParams {
        skip_tubes_on_error: true,
        ..scan.params()
    }
    .write_json(&config)
    .unwrap();

    Command::cargo_bin("tubecal")
        .unwrap()
        .args(["--input", input.to_str().unwrap()])
        .args(["--config", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"rows_applied\": 384"))
        .stdout(predicate::str::contains("rear-module00-tube03"));
}

#[test]
fn failure_exits_with_error_message() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.json");
    SyntheticScan::default()
        .build()
        .unwrap()
        .write_json(&input)
        .unwrap();

    // Default parameters name no strip positions.
    Command::cargo_bin("tubecal")
        .unwrap()
        .args(["--input", input.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error: invalid configuration"));
}

#[test]
fn missing_input_file_fails() {
    Command::cargo_bin("tubecal")
        .unwrap()
        .args(["--input", "/nonexistent/input.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}
