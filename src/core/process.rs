//! Purpose: Engine adapter that drives the `zencode-exec` runner over its stdin protocol.
//! Exports: `ProcessEngine`, `ProcessOptions`, `encode_stdin`.
//! Role: Out-of-process alternative to the shared library; one child per call.
//! Invariants: Line protocol is conf, base64(script), base64(keys), base64(data).
//! Invariants: Empty inputs are empty lines; a conf containing a newline is rejected.
//! Invariants: Non-empty extra or context is rejected; the runner has no slot for them.
//! Invariants: The whole input is on stdin before the child starts (the runner polls stdin once, without waiting).
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::core::engine::ScriptEngine;
use crate::core::error::{Error, ErrorKind};
use crate::core::logs;
use crate::core::request::{ExecOutput, ExecRequest, ScriptKind};

pub const DEFAULT_PROGRAM: &str = "zencode-exec";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessOptions {
    pub program: PathBuf,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
        }
    }
}

impl ProcessOptions {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

pub struct ProcessEngine {
    options: ProcessOptions,
}

impl ProcessEngine {
    pub fn new(options: ProcessOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    fn resolve_program(&self) -> Result<PathBuf, Error> {
        let program = &self.options.program;
        let explicit = program.components().count() > 1 || program.is_absolute();
        let found = if explicit {
            program.is_file().then(|| program.clone())
        } else {
            search_path(program)
        };
        found.ok_or_else(|| {
            Error::new(ErrorKind::Load)
                .with_message(format!("cannot find engine runner {}", program.display()))
                .with_hint("Install zencode-exec or set --exec-bin (or ZENGATE_EXEC_BIN).")
        })
    }
}

impl ScriptEngine for ProcessEngine {
    fn name(&self) -> &'static str {
        "process"
    }

    fn initialize(&self) -> Result<(), Error> {
        self.resolve_program().map(|_| ())
    }

    fn execute(&self, request: &ExecRequest) -> Result<ExecOutput, Error> {
        let program = self.resolve_program()?;
        let stdin = staged_stdin(&encode_stdin(request)?)?;

        let started = Instant::now();
        let child = Command::new(&program)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                Error::new(ErrorKind::Load)
                    .with_message(format!("failed to start {}", program.display()))
                    .with_source(err)
            })?;
        let output = child.wait_with_output().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to collect engine output")
                .with_source(err)
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let log_text = String::from_utf8_lossy(&output.stderr).into_owned();
        let status = output.status.code().unwrap_or(-1);
        debug!(
            program = %program.display(),
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            output_len = stdout.len(),
            "engine runner exited"
        );
        if !output.status.success() {
            return Err(Error::new(ErrorKind::Invocation)
                .with_message(logs::diagnostic(&log_text, status))
                .with_status(status)
                .with_logs(log_text));
        }
        Ok(ExecOutput {
            output: stdout,
            logs: log_text,
        })
    }
}

/// Serialises a request into the runner's stdin lines.
pub fn encode_stdin(request: &ExecRequest) -> Result<Vec<u8>, Error> {
    if request.kind != ScriptKind::Zencode {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("the engine runner only executes zencode scripts")
            .with_hint("Use --engine native for lua scripts."));
    }
    if request.conf.contains(['\n', '\r']) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("conf must be a single line")
            .with_field("conf"));
    }
    check_extended(request)?;

    let mut input = Vec::with_capacity(request.script.len() * 2 + 64);
    input.extend_from_slice(request.conf.as_bytes());
    input.push(b'\n');
    push_b64_line(&mut input, &request.script);
    push_b64_line(&mut input, &request.keys);
    push_b64_line(&mut input, &request.data);
    Ok(input)
}

fn check_extended(request: &ExecRequest) -> Result<(), Error> {
    let Some(extended) = &request.extended else {
        return Ok(());
    };
    for (field, value) in [("extra", &extended.extra), ("context", &extended.context)] {
        if !value.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("the engine runner accepts no {field} input"))
                .with_field(field)
                .with_hint("Use --engine native with a library that exports the six-input entry point."));
        }
    }
    Ok(())
}

/// Unlinked temp file holding the encoded request, rewound for the child to read.
fn staged_stdin(input: &[u8]) -> Result<std::fs::File, Error> {
    let mut file = tempfile::tempfile().map_err(io_error("failed to stage engine input"))?;
    file.write_all(input)
        .map_err(io_error("failed to write engine input"))?;
    file.seek(SeekFrom::Start(0))
        .map_err(io_error("failed to rewind engine input"))?;
    Ok(file)
}

fn io_error(message: &'static str) -> impl FnOnce(std::io::Error) -> Error {
    move |err| {
        Error::new(ErrorKind::Io)
            .with_message(message)
            .with_source(err)
    }
}

fn push_b64_line(buf: &mut Vec<u8>, value: &str) {
    if !value.is_empty() {
        buf.extend_from_slice(STANDARD.encode(value).as_bytes());
    }
    buf.push(b'\n');
}

fn search_path(program: &Path) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
