use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

const LEVELLING: &str = r#"{
  "controls": [
    { "id": "A", "z": 100.0 },
    { "id": "B", "z": 101.0 },
    { "id": "C", "z": 102.5 }
  ],
  "stations": [
    { "key": "S1", "point": "A" },
    { "key": "S2", "point": "B" }
  ],
  "measurements": [
    { "station": "S1", "target": "B", "values": { "vd": 1.02 } },
    { "station": "S2", "target": "C", "values": { "vd": 1.49 } },
    { "station": "S1", "target": "C", "values": { "vd": 2.51 } }
  ]
}"#;

fn dataset(dir: &assert_fs::TempDir) -> assert_fs::fixture::ChildPath {
    let file = dir.child("network.json");
    file.write_str(LEVELLING).unwrap();
    file
}

#[test]
fn methods_command() {
    Command::cargo_bin("survey_lsq_cli")
        .unwrap()
        .arg("methods")
        .assert()
        .success()
        .stdout(predicate::str::contains("weighted"))
        .stdout(predicate::str::contains("huber c=1.345"))
        .stdout(predicate::str::contains("half_wave"));
}

#[test]
fn adjust_prints_summary() {
    let dir = assert_fs::TempDir::new().unwrap();
    let input = dataset(&dir);

    Command::cargo_bin("survey_lsq_cli")
        .unwrap()
        .args(["adjust", input.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"converged\""))
        .stdout(predicate::str::contains("\"method\": \"weighted\""))
        .stdout(predicate::str::contains("\"id\": \"C\""));
    dir.close().unwrap();
}

#[test]
fn adjust_writes_output_file() {
    let dir = assert_fs::TempDir::new().unwrap();
    let input = dataset(&dir);
    let output = dir.child("summary.json");

    Command::cargo_bin("survey_lsq_cli")
        .unwrap()
        .args([
            "adjust",
            input.path().to_str().unwrap(),
            "--strategy",
            "memory-safe",
            "--history",
            "--output",
            output.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote summary"));

    output.assert(predicate::str::contains("degrees_of_freedom"));
    output.assert(predicate::str::contains("history"));
    dir.close().unwrap();
}

#[test]
fn robust_method_with_tuning() {
    let dir = assert_fs::TempDir::new().unwrap();
    let input = dataset(&dir);

    Command::cargo_bin("survey_lsq_cli")
        .unwrap()
        .args([
            "adjust",
            input.path().to_str().unwrap(),
            "--method",
            "huber",
            "--tuning",
            "c=2.0",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"method\": \"huber\""))
        .stdout(predicate::str::contains("\"c\": 2.0"));
    dir.close().unwrap();
}

#[test]
fn free_adjustment_with_tuning() {
    let dir = assert_fs::TempDir::new().unwrap();
    let input = dataset(&dir);

    Command::cargo_bin("survey_lsq_cli")
        .unwrap()
        .args([
            "adjust",
            input.path().to_str().unwrap(),
            "--free-adjustment",
            "huber",
            "--free-tuning",
            "c=3.0",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"free_adjustment\": \"huber\""))
        .stdout(predicate::str::contains("\"c\": 3.0"))
        .stdout(predicate::str::contains("translation z"));
    dir.close().unwrap();
}

#[test]
fn sigma_config_row_is_used() {
    let dir = assert_fs::TempDir::new().unwrap();
    let input = dataset(&dir);
    let sigmas = dir.child("sigmas.json");
    sigmas
        .write_str(
            r#"{
  "default_index": "default",
  "rows": {
    "coarse": {
      "sd": 0.05, "hd": 0.05, "vd": 0.05, "dx": 0.01, "dy": 0.01, "dz": 0.01,
      "a": 0.0001, "hz": 0.0001, "vz": 0.0001, "vh": 0.0001,
      "x": 0.1, "y": 0.1, "z": 0.1
    }
  }
}"#,
        )
        .unwrap();

    Command::cargo_bin("survey_lsq_cli")
        .unwrap()
        .args([
            "adjust",
            input.path().to_str().unwrap(),
            "--sigma-config",
            sigmas.path().to_str().unwrap(),
            "--sigma-index",
            "coarse",
        ])
        .assert()
        .success();

    Command::cargo_bin("survey_lsq_cli")
        .unwrap()
        .args([
            "adjust",
            input.path().to_str().unwrap(),
            "--sigma-config",
            sigmas.path().to_str().unwrap(),
            "--sigma-index",
            "fine",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fine"));
    dir.close().unwrap();
}

#[test]
fn invalid_method_fails() {
    let dir = assert_fs::TempDir::new().unwrap();
    let input = dataset(&dir);

    Command::cargo_bin("survey_lsq_cli")
        .unwrap()
        .args(["adjust", input.path().to_str().unwrap(), "--method", "median"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid method 'median'"));
    dir.close().unwrap();
}

#[test]
fn malformed_tuning_is_rejected() {
    Command::cargo_bin("survey_lsq_cli")
        .unwrap()
        .args(["adjust", "network.json", "--tuning", "c"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn missing_dataset_fails() {
    Command::cargo_bin("survey_lsq_cli")
        .unwrap()
        .args(["adjust", "/nonexistent/network.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}
