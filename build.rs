//! Build script for detecting system dependencies and providing installation guidance.
//!
//! The native libraries are only needed with the `runtime` feature, so the
//! checks are skipped otherwise.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    if env::var_os("CARGO_FEATURE_RUNTIME").is_none() {
        return;
    }

    check_pkg_config();
    check_opencv();
    check_onnxruntime();
}

fn pkg_config_version(name: &str) -> Option<String> {
    let output = Command::new("pkg-config").args(["--modversion", name]).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn check_opencv() {
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");
    println!("cargo:rerun-if-env-changed=OPENCV_LINK_PATHS");
    println!("cargo:rerun-if-env-changed=OPENCV_INCLUDE_PATHS");

    match pkg_config_version("opencv4").or_else(|| pkg_config_version("opencv")) {
        Some(version) => println!("cargo:warning=Found OpenCV version: {version}"),
        None => {
            println!("cargo:warning=OpenCV not found via pkg-config. Make sure OpenCV is installed.");
            println!("cargo:warning=On Ubuntu: sudo apt-get install libopencv-dev");
            println!("cargo:warning=On macOS: brew install opencv");
            println!("cargo:warning=On NixOS: Use the provided shell.nix");
        }
    }
}

fn check_onnxruntime() {
    println!("cargo:rerun-if-env-changed=ORT_LIB_LOCATION");
    if env::var_os("ORT_LIB_LOCATION").is_none() && pkg_config_version("libonnxruntime").is_none() {
        println!("cargo:warning=ONNX Runtime will be downloaded by the ort crate.");
        println!("cargo:warning=Set ORT_LIB_LOCATION to use a system installation instead.");
    }
}

fn check_pkg_config() {
    let output = Command::new("pkg-config").arg("--version").output();

    match output {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            println!("cargo:warning=Found pkg-config version: {}", version.trim());
        }
        _ => {
            println!("cargo:warning=pkg-config not found. This is required to find system libraries.");
            println!("cargo:warning=On Ubuntu: sudo apt-get install pkg-config");
            println!("cargo:warning=On macOS: brew install pkg-config");
        }
    }
}
