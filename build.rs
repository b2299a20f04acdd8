use std::process::Command;

fn main() {
    let commit = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .unwrap_or_else(|| "unknown".into());
    println!("cargo:rustc-env=RDBJSON_GIT_COMMIT={}", commit.trim());

    let build_date = chrono::Utc::now().format("%Y-%m-%d");
    println!("cargo:rustc-env=RDBJSON_BUILD_DATE={build_date}");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
