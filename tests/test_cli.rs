mod fixtures;

use fixtures::*;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

const HEADER: &str = "TimeCreated,EventId,Provider,Channel,Computer,Payload,SourceFile\n";

#[test]
fn test_it_refuses_to_overwrite_directory() {
    let d = tempdir().unwrap();
    let sample = write_garbage(d.path(), "sample.evtx");
    fs::create_dir(d.path().join("out.csv")).unwrap();

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_csv"));
    cmd.args([
        "-f",
        sample.to_str().unwrap(),
        "--csv",
        &d.path().to_string_lossy(),
        "--csvf",
        "out.csv",
    ]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("refusing to overwrite"));
}

#[test]
fn test_it_requires_exactly_one_input() {
    let d = tempdir().unwrap();
    let sample = write_garbage(d.path(), "sample.evtx");

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_csv"));
    cmd.args(["--csv", &d.path().to_string_lossy()]);
    cmd.assert().failure();

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_csv"));
    cmd.args([
        "-f",
        sample.to_str().unwrap(),
        "-d",
        &d.path().to_string_lossy(),
        "--csv",
        &d.path().to_string_lossy(),
    ]);
    cmd.assert().failure();
}

#[test]
fn test_it_skips_files_which_are_not_evtx() {
    let d = tempdir().unwrap();
    let sample = write_garbage(d.path(), "sample.evtx");
    let out_dir = d.path().join("out");

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_csv"));
    cmd.args([
        "-f",
        sample.to_str().unwrap(),
        "--csv",
        &out_dir.to_string_lossy(),
        "--csvf",
        "result.csv",
    ]);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("is not an evtx file"));

    assert_eq!(
        fs::read_to_string(out_dir.join("result.csv")).unwrap(),
        HEADER
    );
}

#[test]
fn test_directory_mode_uses_a_timestamped_file_name() {
    let d = tempdir().unwrap();
    let input = d.path().join("logs");
    fs::create_dir_all(input.join("nested")).unwrap();
    write_garbage(&input, "System.evtx");
    write_garbage(&input.join("nested"), "Security.evtx");
    let out_dir = d.path().join("out");

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_csv"));
    cmd.args([
        "-d",
        &input.to_string_lossy(),
        "--csv",
        &out_dir.to_string_lossy(),
        "--met",
        "false",
    ]);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Found 2 file(s)"));

    let outputs: Vec<_> = fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].ends_with("-evtx-csv.csv"));
}

#[test]
fn test_it_overwrites_file_anyways_if_passed_flag() {
    let d = tempdir().unwrap();
    let sample = write_garbage(d.path(), "sample.evtx");
    let f = d.path().join("test.csv");

    let mut file = File::create(&f).unwrap();
    file.write_all(b"I'm a file!").unwrap();

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_csv"));
    cmd.args([
        "-f",
        sample.to_str().unwrap(),
        "--csv",
        &d.path().to_string_lossy(),
        "--csvf",
        "test.csv",
        "--no-confirm-overwrite",
    ]);

    cmd.assert().success();

    assert_eq!(fs::read_to_string(&f).unwrap(), HEADER);
}

#[test]
fn test_it_rejects_invalid_time_boundaries() {
    let d = tempdir().unwrap();
    let sample = write_garbage(d.path(), "sample.evtx");

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_csv"));
    cmd.args([
        "-f",
        sample.to_str().unwrap(),
        "--csv",
        &d.path().to_string_lossy(),
        "--from",
        "2024-01-01",
    ]);
    cmd.assert().failure().code(1);

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_csv"));
    cmd.args([
        "-f",
        sample.to_str().unwrap(),
        "--csv",
        &d.path().to_string_lossy(),
        "--from",
        "2024/02/01 00:00",
        "--to",
        "2024/01/01 00:00",
    ]);
    cmd.assert().failure().code(1);
}
