//! Purpose: Library crate for zengate, an execution gateway in front of the Zenroom engine.
//! Exports: `api` (Rust surface), `abi` (C surface), `mcp`, `notice`, `core`.
//! Role: Everything the `zengate` binary and foreign bindings link against.
//! Invariants: Callers should go through `api` or `abi`; `core` layout may change.
pub mod abi;
pub mod api;
pub mod core;
pub mod mcp;
pub mod notice;
