// build.rs — Stamp the zv binary with the commit it was built from.
//
// Sets ZV_BUILD_INFO at compile time to "<short hash>[-dirty] <YYYY-MM-DD>",
// shown by `zv --version`. Outside a git checkout the hash is "unknown".

use std::process::Command;

fn command_output(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}

fn main() {
    let hash = command_output("git", &["rev-parse", "--short", "HEAD"])
        .unwrap_or_else(|| "unknown".to_string());
    let dirty = command_output("git", &["status", "--porcelain"])
        .map(|out| !out.is_empty())
        .unwrap_or(false);
    let date = command_output("date", &["+%Y-%m-%d"]).unwrap_or_else(|| "unknown".to_string());

    println!(
        "cargo:rustc-env=ZV_BUILD_INFO={}{} {}",
        hash,
        if dirty { "-dirty" } else { "" },
        date
    );
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs/");
}
