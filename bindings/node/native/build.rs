/*
Purpose: Link the Node binding against libzengate.
Exports: None (build script only).
Role: Resolve the libzengate search path for the N-API addon.
Invariants: Uses ZENGATE_LIB_DIR or repo-local target/ outputs.
Notes: Fails fast when libzengate cannot be located.
*/

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=ZENGATE_LIB_DIR");

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let repo_root = crate_dir
        .ancestors()
        .nth(3)
        .expect("bindings/node/native should be three levels below repo root")
        .to_path_buf();

    let lib_dir = env::var("ZENGATE_LIB_DIR")
        .ok()
        .map(PathBuf::from)
        .into_iter()
        .chain([
            repo_root.join("target").join("debug"),
            repo_root.join("target").join("release"),
        ])
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| {
            panic!("libzengate not found; set ZENGATE_LIB_DIR or build target/debug/libzengate.*")
        });

    println!("cargo:rustc-link-search=native={}", lib_dir.display());
    println!("cargo:rustc-link-lib=zengate");
}
