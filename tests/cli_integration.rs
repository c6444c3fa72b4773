//! Integration tests for the `munic` executable.
//!
//! Exercises the compiled binary itself (not just the library), spawning it
//! as a subprocess and checking exit codes, stdout and stderr, the way
//! `core/cli/tests/cli_integration.rs` tests its own CLI.

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn bin() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("munic"))
}

#[test]
fn fails_when_file_missing() {
    let mut cmd = bin();
    cmd.arg("compile")
        .arg("this-file-does-not-exist.mun")
        .arg("out.wat");
    cmd.assert().failure();
}

#[test]
fn compile_to_wat_succeeds_and_writes_output() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("hello.mun");
    input
        .write_str("void main() { write_int(1 + 2 * 3); }")
        .unwrap();
    let output = temp.child("hello.wat");

    let mut cmd = bin();
    cmd.arg("compile").arg(input.path()).arg(output.path());
    cmd.assert().success();

    output.assert(predicate::path::exists());
    let wat = std::fs::read_to_string(output.path()).unwrap();
    assert!(wat.contains("(module"));
    assert!(wat.contains("$main"));
}

#[test]
fn compile_rejects_unknown_output_extension() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("hello.mun");
    input.write_str("void main() {}").unwrap();
    let output = temp.child("hello.out");

    let mut cmd = bin();
    cmd.arg("compile").arg(input.path()).arg(output.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains(".wat or .wasm"));
}

#[test]
fn compile_reports_parse_errors_with_source_path() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("broken.mun");
    input.write_str("void main( { }").unwrap();
    let output = temp.child("broken.wat");

    let mut cmd = bin();
    cmd.arg("compile").arg(input.path()).arg(output.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains(input.path().to_str().unwrap()));
}

#[test]
fn compile_reports_semantic_errors() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("dup.mun");
    input
        .write_str("void main() { int a = 1; int a = 2; }")
        .unwrap();
    let output = temp.child("dup.wat");

    let mut cmd = bin();
    cmd.arg("compile").arg(input.path()).arg(output.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Redeclaration of 'a'"));
}

#[test]
fn shows_version() {
    let mut cmd = bin();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn shows_help() {
    let mut cmd = bin();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("compile"));
}
