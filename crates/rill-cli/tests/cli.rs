use predicates::prelude::*;
use std::fs;

fn rill() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("rill").unwrap()
}

fn write_src(dir: &tempfile::TempDir, name: &str, src: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, src).unwrap();
    path.to_str().unwrap().to_string()
}

// ── parse command ───────────────────────────────────────────

#[test]
fn parse_echoes_the_tree() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_src(&dir, "id.rill", "{ x -> x }");
    rill()
        .args(["parse", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("{ x -> x }"));
}

#[test]
fn parse_error_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_src(&dir, "bad.rill", "(pair 1");
    rill()
        .args(["parse", &file])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse error"));
}

// ── check command ───────────────────────────────────────────

#[test]
fn check_prints_type_and_flow() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_src(&dir, "five.rill", "5");
    rill()
        .args(["check", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("type: 5"))
        .stdout(predicate::str::contains("flow: 5"));
}

#[test]
fn check_identity_scheme() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_src(&dir, "id.rill", "{ x -> x }");
    rill()
        .args(["check", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("type: { A -> A }"));
}

#[test]
fn check_missing_field_fails() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_src(&dir, "bad.rill", "@{ a = 1 }.b");
    rill()
        .args(["check", &file])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing field b"));
}

#[test]
fn check_gcp_only_skips_types() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_src(&dir, "five.rill", "5");
    rill()
        .args(["check", "--no-hm", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("type:").not())
        .stdout(predicate::str::contains("flow: 5"));
}

#[test]
fn check_mem_prints_memory() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_src(&dir, "pair.rill", "(pair 1 2)");
    rill()
        .args(["check", "--mem", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("mem:"));
}

#[test]
fn missing_file_fails() {
    rill()
        .args(["check", "/no/such/file.rill"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not read"));
}
