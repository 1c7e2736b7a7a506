//! Purpose: Compile the C test fixtures that stand in for libzenroom and `zencode-exec`.
//! Role: Cargo build-script; drives the `cc`-selected compiler and exports fixture paths.
//! Invariants: Fixtures are built only for unix targets; their paths reach tests via `cargo:rustc-env`.
//! Invariants: `ZENGATE_FIXTURE_LIB_{EXTENDED,CLASSIC}` are shared libraries exporting both `*_exec_tobuf` symbols.
//! Invariants: `ZENGATE_FIXTURE_RUNNER` is an executable that polls stdin once, like `zencode-exec`.
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=c/fixtures/fake_zenroom.c");
    println!("cargo:rerun-if-changed=c/fixtures/poll_runner.c");

    if env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default() != "unix" {
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let fixtures = manifest_dir.join("c").join("fixtures");
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));

    let extended = out_dir.join("libzgt_fixture_extended.so");
    compile(
        &fixtures.join("fake_zenroom.c"),
        &extended,
        &["-shared", "-fPIC"],
    );
    let classic = out_dir.join("libzgt_fixture_classic.so");
    compile(
        &fixtures.join("fake_zenroom.c"),
        &classic,
        &["-shared", "-fPIC", "-DZGT_FIXTURE_CLASSIC"],
    );
    let runner = out_dir.join("zgt-poll-runner");
    compile(&fixtures.join("poll_runner.c"), &runner, &[]);

    println!("cargo:rustc-env=ZENGATE_FIXTURE_LIB_EXTENDED={}", extended.display());
    println!("cargo:rustc-env=ZENGATE_FIXTURE_LIB_CLASSIC={}", classic.display());
    println!("cargo:rustc-env=ZENGATE_FIXTURE_RUNNER={}", runner.display());
}

fn compile(source: &Path, output: &Path, flags: &[&str]) {
    let compiler = cc::Build::new().warnings(false).get_compiler();
    let mut command: Command = compiler.to_command();
    command.args(flags).arg("-o").arg(output).arg(source);
    let status = command.status().unwrap_or_else(|err| {
        panic!(
            "failed to run the C compiler for test fixture {}: {err}\n\
             Fix: install a C compiler (set `CC` to override) and retry.",
            source.display()
        )
    });
    if !status.success() {
        panic!(
            "C compiler failed ({status}) building test fixture {}",
            source.display()
        );
    }
}
