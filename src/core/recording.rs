//! Purpose: In-process engine double that records what crosses the boundary.
//! Exports: `RecordingEngine`, `Responder`.
//! Role: Makes forwarding behaviour observable without a native engine.
//! Invariants: Requests are recorded before the responder runs, in call order.
use std::sync::Mutex;

use crate::core::engine::ScriptEngine;
use crate::core::error::{Error, ErrorKind};
use crate::core::request::{ExecOutput, ExecRequest};

pub type Responder = Box<dyn Fn(&ExecRequest) -> Result<ExecOutput, Error> + Send + Sync>;

pub struct RecordingEngine {
    calls: Mutex<Vec<ExecRequest>>,
    init_failure: Option<String>,
    init_calls: Mutex<usize>,
    responder: Responder,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEngine {
    /// Answers every call with an empty successful output.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            init_failure: None,
            init_calls: Mutex::new(0),
            responder: Box::new(|_| Ok(ExecOutput::default())),
        }
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ExecRequest) -> Result<ExecOutput, Error> + Send + Sync + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    /// Answers every call with the same output string.
    pub fn returning(output: impl Into<String>) -> Self {
        let output = output.into();
        Self::new().with_responder(move |_| Ok(ExecOutput::new(output.clone())))
    }

    /// Makes `initialize` and `execute` fail the way an unloadable library does.
    pub fn failing_initialize(mut self, message: impl Into<String>) -> Self {
        self.init_failure = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<ExecRequest> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn initialize_calls(&self) -> usize {
        self.init_calls.lock().map(|count| *count).unwrap_or(0)
    }

    fn load_error(&self) -> Option<Error> {
        self.init_failure
            .as_ref()
            .map(|message| Error::new(ErrorKind::Load).with_message(message.clone()))
    }
}

impl ScriptEngine for RecordingEngine {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn initialize(&self) -> Result<(), Error> {
        if let Ok(mut count) = self.init_calls.lock() {
            *count += 1;
        }
        match self.load_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn execute(&self, request: &ExecRequest) -> Result<ExecOutput, Error> {
        if let Some(err) = self.load_error() {
            return Err(err);
        }
        self.calls
            .lock()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("recording lock poisoned"))?
            .push(request.clone());
        (self.responder)(request)
    }
}
