//! Purpose: The single engine capability every adapter implements.
//! Exports: `ScriptEngine`.
//! Invariants: `initialize` is idempotent once it has succeeded.
//! Invariants: `execute` forwards the request fields verbatim and blocks until the engine returns.
use crate::core::error::Error;
use crate::core::request::{ExecOutput, ExecRequest};

pub trait ScriptEngine: Send + Sync {
    /// Short adapter name used in logs and CLI reports.
    fn name(&self) -> &'static str;

    fn initialize(&self) -> Result<(), Error>;

    fn execute(&self, request: &ExecRequest) -> Result<ExecOutput, Error>;
}

impl<E: ScriptEngine + ?Sized> ScriptEngine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn initialize(&self) -> Result<(), Error> {
        (**self).initialize()
    }

    fn execute(&self, request: &ExecRequest) -> Result<ExecOutput, Error> {
        (**self).execute(request)
    }
}

impl<E: ScriptEngine + ?Sized> ScriptEngine for std::sync::Arc<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn initialize(&self) -> Result<(), Error> {
        (**self).initialize()
    }

    fn execute(&self, request: &ExecRequest) -> Result<ExecOutput, Error> {
        (**self).execute(request)
    }
}
