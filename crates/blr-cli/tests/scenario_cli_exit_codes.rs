use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

#[test]
fn missing_arguments_exit_one() {
    Command::cargo_bin("blr")
        .unwrap()
        .args(["reconcile", "only-one.json"])
        .assert()
        .code(1);

    Command::cargo_bin("blr").unwrap().assert().code(1);
}

#[test]
fn help_exits_zero() {
    Command::cargo_bin("blr")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("reconcile"));
}

#[test]
fn unreadable_input_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.json");
    fs::write(&source, "").unwrap();

    Command::cargo_bin("blr")
        .unwrap()
        .arg("reconcile")
        .arg(dir.path().join("missing.json"))
        .arg(&source)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing.json"));
}

#[test]
fn config_hash_is_stable_across_key_order() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.yaml");
    let b = dir.path().join("b.yaml");
    fs::write(&a, "reconcile:\n  count_gtid_mismatches: true\n  timestamp_tolerance_ms: 5\n").unwrap();
    fs::write(&b, "reconcile:\n  timestamp_tolerance_ms: 5\n  count_gtid_mismatches: true\n").unwrap();

    let run = |p: &std::path::Path| {
        let out = Command::cargo_bin("blr")
            .unwrap()
            .arg("config-hash")
            .arg(p)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        String::from_utf8(out).unwrap()
    };
    let (ha, hb) = (run(&a), run(&b));
    assert!(ha.starts_with("config_hash="));
    assert_eq!(ha, hb);
    assert!(ha.contains(r#"{"reconcile":{"count_gtid_mismatches":true,"timestamp_tolerance_ms":5}}"#));
}
