//! Purpose: Define the stable public Rust API boundary for zengate.
//! Exports: Gateway, engine adapters, request/response values and errors.
//! Role: Public, additive-only surface used by the CLI, the C ABI and the MCP server.
//! Invariants: This module is the only public path to the core types.

mod select;

pub use crate::core::conf::{ConfDirective, ConfKey, ConfValue, EngineConf};
pub use crate::core::engine::ScriptEngine;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::gateway::{ConfPolicy, Gateway, GatewayOptions};
pub use crate::core::logs::{diagnostic, log_lines};
pub use crate::core::native::{EntryAbi, NativeEngine, NativeOptions, default_library_name};
pub use crate::core::process::{ProcessEngine, ProcessOptions};
pub use crate::core::recording::RecordingEngine;
pub use crate::core::request::{ExecOutput, ExecRequest, ExtendedInputs, ScriptKind};
pub use select::EngineSelect;
