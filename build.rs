use std::process::Command;

/// Build identifier reported by `/api/v1/health`.
///
/// `E_LIBRARY_BUILD` wins (container builds have no `.git`), then the short
/// commit hash, then the package version.
fn build_id() -> String {
    if let Ok(id) = std::env::var("E_LIBRARY_BUILD") {
        if !id.trim().is_empty() {
            return id.trim().to_string();
        }
    }

    let commit = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string());

    match commit {
        Some(hash) => {
            let dirty = Command::new("git")
                .args(["diff", "--quiet"])
                .status()
                .map(|s| !s.success())
                .unwrap_or(false);
            if dirty { format!("{}-dirty", hash) } else { hash }
        }
        None => format!("v{}", std::env::var("CARGO_PKG_VERSION").unwrap_or_default()),
    }
}

fn main() {
    println!("cargo:rustc-env=GIT_HASH={}", build_id());
    println!("cargo:rerun-if-env-changed=E_LIBRARY_BUILD");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
