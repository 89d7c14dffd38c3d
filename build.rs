// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

/// Stamp the binary with a version string
///
/// `INTERVAL_CAMERA_VERSION` wins (distro builds without a git checkout).
/// Otherwise `git describe` is used, reduced to `<tag>` or `<tag>+<hash>`,
/// and the crate version is the last resort.
fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=INTERVAL_CAMERA_VERSION");

    let version = std::env::var("INTERVAL_CAMERA_VERSION")
        .ok()
        .or_else(describe)
        .unwrap_or_else(|| env_or_unknown("CARGO_PKG_VERSION"));

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

fn describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let described = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let described = described.strip_prefix('v').unwrap_or(&described);

    // "1.2.0-7-gabc1234" -> "1.2.0+abc1234"
    let mut parts = described.rsplitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(hash), Some(_commits), Some(tag)) => Some(format!(
            "{}+{}",
            tag,
            hash.strip_prefix('g').unwrap_or(hash)
        )),
        _ => Some(described.to_string()),
    }
}

fn env_or_unknown(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| "unknown".to_string())
}
