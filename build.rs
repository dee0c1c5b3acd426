use std::process::Command;
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    // revision logged at startup, e.g. v0.1.0-3-gdeadbee-dirty
    let revision = Command::new("git")
        .args(["describe", "--always", "--dirty", "--tags"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|revision| revision.trim().to_string())
        .filter(|revision| !revision.is_empty())
        .unwrap_or_else(|| "UNKNOWN".to_string());
    println!("cargo:rustc-env=GIT_HASH={revision}");
}
