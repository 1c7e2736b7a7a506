//! Purpose: Pick and build an engine adapter from caller-facing options.
//! Exports: `EngineSelect`.
//! Role: Shared by the CLI and the MCP server so both resolve engines the same way.
use crate::core::engine::ScriptEngine;
use crate::core::native::{NativeEngine, NativeOptions};
use crate::core::process::{ProcessEngine, ProcessOptions};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EngineSelect {
    Native(NativeOptions),
    Process(ProcessOptions),
}

impl Default for EngineSelect {
    fn default() -> Self {
        EngineSelect::Native(NativeOptions::default())
    }
}

impl EngineSelect {
    pub fn build(self) -> Box<dyn ScriptEngine> {
        match self {
            EngineSelect::Native(options) => Box::new(NativeEngine::new(options)),
            EngineSelect::Process(options) => Box::new(ProcessEngine::new(options)),
        }
    }
}
