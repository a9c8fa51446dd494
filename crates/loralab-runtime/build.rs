//! Build script for loralab-runtime.
//!
//! Sets `LORALAB_WORKSPACE_ROOT` so development builds can find the compute
//! service sources without any configuration.

use std::env;
use std::path::PathBuf;

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());

    // crates/loralab-runtime -> workspace root
    let workspace_root = manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .map_or_else(|| manifest_dir.clone(), PathBuf::from);

    println!(
        "cargo:rustc-env=LORALAB_WORKSPACE_ROOT={}",
        workspace_root.display()
    );
    println!("cargo:rerun-if-changed=build.rs");
}
