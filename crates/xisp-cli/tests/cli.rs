// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Integration tests for the xisp CLI
//!
//! These tests run every command end-to-end against the built-in simulated
//! reference board or a topology file, so no hardware is required.

use assert_cmd::Command;
use predicates::prelude::*;
use std::{env, fs, path::PathBuf};

/// Helper to create a Command for the xisp binary
/// Uses XISP_BIN environment variable if set, otherwise the cargo-built binary
fn xisp_cmd() -> Command {
    match env::var("XISP_BIN") {
        Ok(bin_path) => Command::new(bin_path),
        Err(_) => Command::cargo_bin("xisp").unwrap(),
    }
}

/// Get the test data directory (target/testdata/xisp-cli)
/// Creates it if it doesn't exist
fn get_test_data_dir() -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("target")
        .join("testdata")
        .join("xisp-cli");

    fs::create_dir_all(&test_dir).expect("Failed to create test data directory");
    test_dir
}

fn write_topology(name: &str, contents: &str) -> PathBuf {
    let path = get_test_data_dir().join(name);
    fs::write(&path, contents).expect("Failed to write topology");
    path
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not valid JSON")
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

#[test]
fn test_cli_help() {
    xisp_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("xisp CLI"))
        .stdout(predicate::str::contains("sensors"))
        .stdout(predicate::str::contains("probe"))
        .stdout(predicate::str::contains("configure"))
        .stdout(predicate::str::contains("capture"));
}

#[test]
fn test_cli_version() {
    xisp_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("xisp"));
}

#[test]
fn test_configure_help() {
    xisp_cmd()
        .args(["configure", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--topology"))
        .stdout(predicate::str::contains("--resolution"))
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("--role"));
}

#[test]
fn test_unknown_command() {
    xisp_cmd().arg("calibrate").assert().failure().code(2);
}

// =============================================================================
// Sensors
// =============================================================================

#[test]
fn test_sensors_table() {
    xisp_cmd()
        .arg("sensors")
        .assert()
        .success()
        .stdout(predicate::str::contains("imx219"))
        .stdout(predicate::str::contains("1920x1080"))
        .stdout(predicate::str::contains("imx500"))
        .stdout(predicate::str::contains("SRGGB10_1X10"));
}

#[test]
fn test_sensors_json() {
    let output = xisp_cmd()
        .args(["--json", "sensors"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let sensors = stdout_json(&output);
    let sensors = sensors.as_array().unwrap();
    assert_eq!(sensors.len(), 4);
    assert_eq!(sensors[1]["model"], "imx708");
    assert_eq!(sensors[1]["width"], 1536);
    assert_eq!(sensors[1]["height"], 864);
}

#[test]
fn test_sensors_unknown_entity() {
    xisp_cmd()
        .args(["sensors", "--entity", "ov5640 1-003c"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Unknown sensor"));
}

// =============================================================================
// Probe
// =============================================================================

#[test]
fn test_probe_reference_board() {
    xisp_cmd()
        .arg("probe")
        .assert()
        .success()
        .stdout(predicate::str::contains("imx219 1-0010"))
        .stdout(predicate::str::contains("dw9807 2-000c"))
        .stdout(predicate::str::contains("vcap_mipi_3_v_proc output 0"));
}

#[test]
fn test_probe_json() {
    let output = xisp_cmd()
        .args(["probe", "--json", "--candidates", "2"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let cameras = stdout_json(&output);
    let cameras = cameras.as_array().unwrap();
    assert_eq!(cameras.len(), 2);
    assert_eq!(cameras[0]["id"], "imx219 1-0010");
    assert_eq!(cameras[1]["candidate"], 1);
    assert_eq!(cameras[1]["entities"].as_array().unwrap().len(), 6);
}

#[test]
fn test_probe_wrong_driver() {
    xisp_cmd()
        .args(["probe", "--driver", "imx-media"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_probe_topology_file() {
    let path = write_topology(
        "single.json",
        r#"{
            "graphs": [{
                "model": "vcap_mipi_0",
                "entities": [
                    { "name": "vcap_mipi_0_v_proc output 0", "function": "io-v4l" },
                    { "name": "imx477 4-001a", "function": "cam-sensor" },
                    { "name": "80053000.mipi_csi2_rx_subsystem", "function": "vid-if-bridge" },
                    { "name": "a00b0000.ISPPipeline_accel", "function": "proc-video-isp" },
                    { "name": "a0180000.v_proc_ss", "function": "proc-video-scaler" }
                ]
            }]
        }"#,
    );

    xisp_cmd()
        .arg("probe")
        .arg("--topology")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("imx477 4-001a"))
        .stdout(predicate::str::contains("1332x990"));
}

#[test]
fn test_probe_missing_topology_file() {
    xisp_cmd()
        .args(["probe", "--topology", "/nonexistent/board.json"])
        .assert()
        .failure()
        .code(2);
}

// =============================================================================
// Configure
// =============================================================================

#[test]
fn test_configure_default_stream() {
    xisp_cmd()
        .arg("configure")
        .assert()
        .success()
        .stdout(predicate::str::contains("640x480 RBG888"))
        .stdout(predicate::str::contains("[VCAP]"))
        .stdout(predicate::str::contains("RBG888_1X24"));
}

#[test]
fn test_configure_json() {
    let output = xisp_cmd()
        .args([
            "configure",
            "--json",
            "--camera",
            "1",
            "--format",
            "YUYV",
            "--resolution",
            "1280x720",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result = stdout_json(&output);
    assert_eq!(result["camera"], "imx708");
    assert_eq!(result["status"], "Valid");
    assert_eq!(result["streams"][0]["size"], "1280x720");
    assert_eq!(result["streams"][0]["stride"], 2560);
    assert_eq!(result["stages"].as_array().unwrap().len(), 8);
}

#[test]
fn test_configure_adjusts_out_of_range_size() {
    let output = xisp_cmd()
        .args(["--json", "configure", "--resolution", "8192x16"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result = stdout_json(&output);
    assert_eq!(result["status"], "Adjusted");
    assert_eq!(result["streams"][0]["size"], "4096x64");
}

#[test]
fn test_configure_records_device_adjustment() {
    let path = write_topology(
        "limited.json",
        r#"{
            "graphs": [{
                "driver": "xilinx-video",
                "model": "vcap_mipi_0",
                "entities": [
                    { "name": "vcap_mipi_0_v_proc output 0", "function": "io-v4l" },
                    { "name": "imx219 1-0010", "function": "cam-sensor" },
                    { "name": "80050000.mipi_csi2_rx_subsystem", "function": "vid-if-bridge" },
                    { "name": "a0010000.ISPPipeline_accel", "function": "proc-video-isp" },
                    { "name": "a0040000.v_proc_ss", "function": "proc-video-scaler", "max_size": [1280, 720] }
                ]
            }]
        }"#,
    );

    let output = xisp_cmd()
        .arg("--json")
        .arg("configure")
        .arg("--topology")
        .arg(&path)
        .args(["--resolution", "1920x1080"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result = stdout_json(&output);
    let stages = result["stages"].as_array().unwrap();
    assert!(stages
        .iter()
        .any(|stage| stage.as_str().unwrap().contains("1280x720-RBG888_1X24")));
}

#[test]
fn test_configure_invalid_arguments() {
    xisp_cmd()
        .args(["configure", "--resolution", "big"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Invalid resolution"));

    xisp_cmd()
        .args(["configure", "--format", "NV12"])
        .assert()
        .failure()
        .code(2);

    xisp_cmd()
        .args(["configure", "--role", "preview"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_configure_missing_camera() {
    xisp_cmd()
        .args(["configure", "--camera", "7"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Camera 7 not found"));
}

// =============================================================================
// Capture
// =============================================================================

#[test]
fn test_capture_frames() {
    xisp_cmd()
        .args(["capture", "--frames", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Capture Metrics"))
        .stdout(predicate::str::contains("Frames captured:   10"));
}

#[test]
fn test_capture_json_metrics() {
    let output = xisp_cmd()
        .args([
            "--json",
            "capture",
            "--frames",
            "12",
            "--camera",
            "2",
            "--resolution",
            "320x240",
            "--buffers",
            "3",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let metrics = stdout_json(&output);
    assert_eq!(metrics["frames_captured"], 12);
    assert_eq!(metrics["error_frames"], 0);
    assert_eq!(metrics["dropped_frames"], 0);
    assert_eq!(metrics["bytes_captured"], 12 * 320 * 240 * 3);
}

#[test]
fn test_capture_rejects_zero_timeout() {
    xisp_cmd()
        .args(["capture", "--timeout", "0"])
        .assert()
        .failure()
        .code(2);
}
