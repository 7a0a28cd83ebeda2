use std::process::Command;

fn main() {
    // Embed the current commit hash when building inside a git checkout.
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success());

    if let Some(out) = output {
        let hash = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if !hash.is_empty() {
            println!("cargo:rustc-env=GIT_COMMIT_HASH={hash}");
        }
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
}
