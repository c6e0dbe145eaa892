// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

use tilebrot::{RequestMessage, Wire};

fn tilebrot() -> Command {
    let mut cmd = Command::cargo_bin("tilebrot").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn dump_request_prints_the_wire_form() {
    let output = tilebrot()
        .args(&["--dump-request", "--size", "64x32", "--iterations", "77"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    let request = RequestMessage::decode(&text).unwrap();
    assert_eq!(request.identifier().len(), 32);
    assert_eq!(request.max_iterations, 77);
    assert_eq!(request.header.pixel_view.right, 64.0);
    assert_eq!(request.header.pixel_view.bottom, 32.0);
    assert_eq!(request.header.complex_view.bottom, 0.0);
}

#[test]
fn local_render_writes_a_ppm() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local.ppm");
    tilebrot()
        .args(&["--local", "--size", "48x32", "--tile", "16x16", "--iterations", "50"])
        .arg("--output")
        .arg(&path)
        .assert()
        .success();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("P3\n48 32\n255\n"));
    assert_eq!(text.lines().count(), 3 + 48 * 32);
}

#[test]
fn distributed_render_matches_local() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("local.ppm");
    let remote = dir.path().join("remote.ppm");
    let common = ["--size", "64x64", "--tile", "16x16", "--iterations", "40"];
    tilebrot().arg("--local").args(&common).arg("-o").arg(&local).assert().success();
    tilebrot()
        .args(&["--workers", "4"])
        .args(&common)
        .arg("-o")
        .arg(&remote)
        .assert()
        .success();
    assert_eq!(fs::read(&local).unwrap(), fs::read(&remote).unwrap());
}

#[test]
fn julia_with_a_negative_constant() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("julia.png");
    tilebrot()
        .args(&["--local", "--fractal", "julia", "--constant", "-0.4,0.6", "--size", "32x32"])
        .args(&["--upperleft", "-1.5,-1.5", "--right", "1.5"])
        .arg("-o")
        .arg(&path)
        .assert()
        .success();
    assert!(fs::metadata(&path).unwrap().len() > 0);
}

#[test]
fn bad_sizes_are_refused() {
    tilebrot()
        .args(&["--size", "wide"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not parse output image size"));
}

#[test]
fn unknown_fractals_are_refused() {
    tilebrot()
        .args(&["--fractal", "buddhabrot"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("buddhabrot"));
}
