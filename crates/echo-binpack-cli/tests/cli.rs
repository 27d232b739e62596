// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end runs of the `echo-binpack` binary.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SCHEMA: &str = r##"{
    "nameIds": { "name": 1, "children": 2 },
    "definitions": { "Entity": { "name": "string", "children": ["#Entity"] } },
    "root": "#Entity"
}"##;

const SCENE: &str = r#"{"children":[{"children":[],"name":"a"}],"name":"root"}"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("schema.json"), SCHEMA).expect("write schema");
        fs::write(dir.path().join("scene.json"), SCENE).expect("write scene");
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn bin() -> Command {
    Command::cargo_bin("echo-binpack").expect("binary")
}

fn arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

#[test]
fn encode_then_decode_round_trips() {
    let ws = Workspace::new();
    let schema = ws.path("schema.json");
    let packed = ws.path("scene.bin");
    let unpacked = ws.path("scene.out.json");

    bin()
        .args(["encode", "--schema", arg(&schema)])
        .args(["--input", arg(&ws.path("scene.json"))])
        .args(["--output", arg(&packed)])
        .assert()
        .success();
    assert_eq!(
        fs::read(&packed).unwrap(),
        [0x01, 0xa5, 0x00, 0x01, 0x01, 0x04, 0x00, b'r', b'o', b'o', b't', 0x00, 0x01, 0x00, b'a']
    );

    bin()
        .args(["decode", "--schema", arg(&schema)])
        .args(["--input", arg(&packed)])
        .args(["--output", arg(&unpacked)])
        .assert()
        .success();
    let original: serde_json::Value = serde_json::from_str(SCENE).unwrap();
    let decoded: serde_json::Value =
        serde_json::from_slice(&fs::read(&unpacked).unwrap()).unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn stdin_and_stdout_are_the_default_streams() {
    let ws = Workspace::new();
    let schema = ws.path("schema.json");

    let packed = bin()
        .args(["encode", "--schema", arg(&schema), "--big-endian"])
        .write_stdin(SCENE)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    // big-endian string length of "root"
    assert_eq!(&packed[5..7], &[0x00, 0x04]);

    bin()
        .args(["decode", "--schema", arg(&schema), "--big-endian", "--input", "-"])
        .write_stdin(packed)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name":"root""#));
}

#[test]
fn verify_checks_the_round_trip() {
    let ws = Workspace::new();
    bin()
        .args(["verify", "--schema", arg(&ws.path("schema.json"))])
        .write_stdin(SCENE)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: 4 nodes, 15 bytes"));

    bin()
        .args(["verify", "--schema", arg(&ws.path("schema.json"))])
        .write_stdin(r#"{"name":"root","children":[],"extra":true}"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("decoded graph differs"));
}

#[test]
fn inspect_reports_header_and_nodes() {
    let ws = Workspace::new();
    let schema = ws.path("schema.json");
    let packed = ws.path("scene.bin");
    bin()
        .args(["encode", "--schema", arg(&schema)])
        .args(["--input", arg(&ws.path("scene.json")), "--output", arg(&packed)])
        .assert()
        .success();

    bin()
        .args(["inspect", "--schema", arg(&schema), "--input", arg(&packed)])
        .assert()
        .success()
        .stdout(predicate::str::contains("bytes:   15"))
        .stdout(predicate::str::contains("header:  2 byte(s)"))
        .stdout(predicate::str::contains("refId=u8 array=u8 string=u16 buffer=u16"))
        .stdout(predicate::str::contains("nodes:   4"));
}

#[test]
fn schema_prints_a_stable_fingerprint() {
    let ws = Workspace::new();
    let schema = ws.path("schema.json");
    let run = || {
        bin()
            .args(["schema", "--schema", arg(&schema)])
            .assert()
            .success()
            .stdout(predicate::str::contains("fingerprint: "))
            .stdout(predicate::str::contains("by reference: 1"))
            .get_output()
            .stdout
            .clone()
    };
    assert_eq!(run(), run());
}

#[test]
fn bad_input_fails_with_context() {
    let ws = Workspace::new();
    let schema = ws.path("schema.json");

    bin()
        .args(["encode", "--schema", arg(&schema)])
        .write_stdin("{ not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("input is not valid JSON"));

    bin()
        .args(["decode", "--schema", arg(&schema)])
        .write_stdin(vec![0x01, 0xa5, 0x00])
        .assert()
        .failure();

    bin()
        .args(["schema", "--schema", arg(&ws.path("missing.json"))])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read schema"));
}
