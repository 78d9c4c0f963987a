// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=K4A_COMBO_VERSION");

    // Packagers can pin the version without a git checkout
    let version = std::env::var("K4A_COMBO_VERSION").unwrap_or_else(|_| git_version());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version derived from the nearest `v*` tag
///
/// - on a tag: "0.2.0-abcdef1"
/// - past a tag: "0.2.0-dirty-abcdef1"
/// - no tag or no git: the package version
fn git_version() -> String {
    let fallback = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".to_string());

    let Some(described) = git(&["describe", "--tags", "--match", "v*"]) else {
        return match commit_hash() {
            Some(hash) => format!("{}-{}", fallback, hash),
            None => fallback,
        };
    };
    let described = described.strip_prefix('v').unwrap_or(&described).to_string();

    // "<version>-<commits>-g<hash>"
    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    if parts.len() == 3 && parts[0].starts_with('g') {
        return format!("{}-dirty-{}", parts[2], &parts[0][1..]);
    }

    let hash = commit_hash().unwrap_or_else(|| "unknown".to_string());
    format!("{}-{}", described, hash)
}

fn commit_hash() -> Option<String> {
    git(&["rev-parse", "--short", "HEAD"])
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
