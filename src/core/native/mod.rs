//! Purpose: Engine adapter over the `*_exec_tobuf` symbols of a shared libzenroom.
//! Exports: `NativeEngine`, `NativeOptions`, `EntryAbi`, `default_library_name`.
//! Role: Replaces load-on-first-use with an explicit `initialize` that reports load failures.
//! Invariants: All FFI interaction is confined to this module + `sys`.
//! Invariants: Fields cross the boundary as NUL-terminated copies; empty stays empty, never NULL.
//! Invariants: Calls on one instance are serialised; the library keeps global VM state.
use std::ffi::CString;
use std::os::raw::c_char;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::debug;

use crate::core::engine::ScriptEngine;
use crate::core::error::{Error, ErrorKind};
use crate::core::logs;
use crate::core::request::{ExecOutput, ExecRequest, ScriptKind};

pub mod sys;

use sys::{ClassicExecFn, ExtendedExecFn, Library, ZENCODE_EXEC_TOBUF, ZENROOM_EXEC_TOBUF};

pub const DEFAULT_STDOUT_CAPACITY: usize = 2 * 1024 * 1024;
pub const DEFAULT_STDERR_CAPACITY: usize = 64 * 1024;

/// C signature of the exported entry points.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EntryAbi {
    /// Four inputs: script, conf, keys, data.
    Classic,
    /// Six inputs: script, conf, keys, data, extra, context.
    #[default]
    Extended,
}

pub fn default_library_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "libzenroom.dylib"
    } else if cfg!(windows) {
        "zenroom.dll"
    } else {
        "libzenroom.so"
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NativeOptions {
    pub library: PathBuf,
    pub abi: EntryAbi,
    pub stdout_capacity: usize,
    pub stderr_capacity: usize,
}

impl Default for NativeOptions {
    fn default() -> Self {
        Self {
            library: PathBuf::from(default_library_name()),
            abi: EntryAbi::default(),
            stdout_capacity: DEFAULT_STDOUT_CAPACITY,
            stderr_capacity: DEFAULT_STDERR_CAPACITY,
        }
    }
}

impl NativeOptions {
    pub fn new(library: impl Into<PathBuf>) -> Self {
        Self {
            library: library.into(),
            ..Self::default()
        }
    }

    pub fn with_abi(mut self, abi: EntryAbi) -> Self {
        self.abi = abi;
        self
    }

    pub fn with_capacities(mut self, stdout_capacity: usize, stderr_capacity: usize) -> Self {
        self.stdout_capacity = stdout_capacity.max(1);
        self.stderr_capacity = stderr_capacity.max(1);
        self
    }
}

#[derive(Clone, Copy)]
enum Entry {
    Classic(ClassicExecFn),
    Extended(ExtendedExecFn),
}

struct Bindings {
    zencode: Option<Entry>,
    lua: Option<Entry>,
    // Keeps the entry points mapped; dropped last.
    _library: Library,
}

pub struct NativeEngine {
    options: NativeOptions,
    state: Mutex<Option<Arc<Bindings>>>,
    call_lock: Mutex<()>,
}

impl NativeEngine {
    pub fn new(options: NativeOptions) -> Self {
        Self {
            options,
            state: Mutex::new(None),
            call_lock: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &NativeOptions {
        &self.options
    }

    pub fn is_loaded(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.is_some())
            .unwrap_or(false)
    }

    fn bindings(&self) -> Result<Arc<Bindings>, Error> {
        let mut state = self.state.lock().map_err(|_| poisoned("loader"))?;
        if let Some(bindings) = state.as_ref() {
            return Ok(Arc::clone(bindings));
        }
        let bindings = Arc::new(load(&self.options)?);
        *state = Some(Arc::clone(&bindings));
        Ok(bindings)
    }
}

impl ScriptEngine for NativeEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    fn initialize(&self) -> Result<(), Error> {
        self.bindings().map(|_| ())
    }

    fn execute(&self, request: &ExecRequest) -> Result<ExecOutput, Error> {
        let bindings = self.bindings()?;
        let (entry, symbol) = match request.kind {
            ScriptKind::Zencode => (bindings.zencode, ZENCODE_EXEC_TOBUF),
            ScriptKind::Lua => (bindings.lua, ZENROOM_EXEC_TOBUF),
        };
        let entry = entry.ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "{} does not export {symbol}",
                    self.options.library.display()
                ))
                .with_hint("Run the script with the other script kind or use a full libzenroom build.")
        })?;
        check_abi(self.options.abi, request)?;
        let args = CArgs::new(request)?;

        let mut stdout = vec![0u8; self.options.stdout_capacity];
        let mut stderr = vec![0u8; self.options.stderr_capacity];
        let started = Instant::now();
        let code = {
            let _guard = self.call_lock.lock().map_err(|_| poisoned("call"))?;
            let stdout_ptr = stdout.as_mut_ptr() as *mut c_char;
            let stderr_ptr = stderr.as_mut_ptr() as *mut c_char;
            unsafe {
                match entry {
                    Entry::Classic(f) => f(
                        args.ptr(0),
                        args.ptr(1),
                        args.ptr(2),
                        args.ptr(3),
                        stdout_ptr,
                        stdout.len(),
                        stderr_ptr,
                        stderr.len(),
                    ),
                    Entry::Extended(f) => f(
                        args.ptr(0),
                        args.ptr(1),
                        args.ptr(2),
                        args.ptr(3),
                        args.ptr(4),
                        args.ptr(5),
                        stdout_ptr,
                        stdout.len(),
                        stderr_ptr,
                        stderr.len(),
                    ),
                }
            }
        };

        let output = read_c_buffer(&stdout);
        let log_text = read_c_buffer(&stderr);
        debug!(
            symbol,
            code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            output_len = output.len(),
            "native engine returned"
        );
        if code != 0 {
            return Err(Error::new(ErrorKind::Invocation)
                .with_message(logs::diagnostic(&log_text, code))
                .with_status(code)
                .with_logs(log_text));
        }
        Ok(ExecOutput {
            output,
            logs: log_text,
        })
    }
}

fn load(options: &NativeOptions) -> Result<Bindings, Error> {
    let library = Library::open(&options.library).inspect_err(|err| {
        debug!(library = %options.library.display(), error = %err, "failed to load engine library");
    })?;
    let resolve = |name: &str| {
        library.symbol(name).map(|addr| unsafe {
            match options.abi {
                EntryAbi::Classic => {
                    Entry::Classic(std::mem::transmute::<*mut std::ffi::c_void, ClassicExecFn>(
                        addr,
                    ))
                }
                EntryAbi::Extended => Entry::Extended(std::mem::transmute::<
                    *mut std::ffi::c_void,
                    ExtendedExecFn,
                >(addr)),
            }
        })
    };
    let zencode = resolve(ZENCODE_EXEC_TOBUF);
    let lua = resolve(ZENROOM_EXEC_TOBUF);
    if zencode.is_none() && lua.is_none() {
        return Err(Error::new(ErrorKind::Load)
            .with_message(format!(
                "{} exports neither {ZENCODE_EXEC_TOBUF} nor {ZENROOM_EXEC_TOBUF}",
                options.library.display()
            ))
            .with_hint("Point --lib at a libzenroom shared library."));
    }
    debug!(
        library = %options.library.display(),
        abi = ?options.abi,
        zencode = zencode.is_some(),
        lua = lua.is_some(),
        "engine library loaded"
    );
    Ok(Bindings {
        zencode,
        lua,
        _library: library,
    })
}

fn check_abi(abi: EntryAbi, request: &ExecRequest) -> Result<(), Error> {
    let (EntryAbi::Classic, Some(extended)) = (abi, &request.extended) else {
        return Ok(());
    };
    for (field, value) in [("extra", &extended.extra), ("context", &extended.context)] {
        if !value.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("the classic entry point accepts no {field} input"))
                .with_field(field)
                .with_hint("Use --abi extended with a library that exports the six-input entry point."));
        }
    }
    Ok(())
}

/// Owned C copies of the request fields; extended slots are empty for four-input requests.
struct CArgs {
    values: Vec<CString>,
}

impl CArgs {
    fn new(request: &ExecRequest) -> Result<Self, Error> {
        let mut values = Vec::with_capacity(6);
        for (field, value) in request.forwarded_fields() {
            values.push(c_string(field, value)?);
        }
        while values.len() < 6 {
            values.push(CString::default());
        }
        Ok(Self { values })
    }

    fn ptr(&self, index: usize) -> *const c_char {
        self.values[index].as_ptr()
    }
}

fn c_string(field: &'static str, value: &str) -> Result<CString, Error> {
    CString::new(value).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{field} contains a nul byte"))
            .with_field(field)
            .with_source(err)
    })
}

fn read_c_buffer(buf: &[u8]) -> String {
    let end = buf.iter().position(|byte| *byte == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn poisoned(what: &str) -> Error {
    Error::new(ErrorKind::Internal).with_message(format!("native engine {what} lock poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_a_load_error() {
        let engine = NativeEngine::new(NativeOptions::new("/nonexistent/libzenroom-missing.so"));
        let err = engine.initialize().expect_err("load fails");
        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(err.message().is_some());
        assert!(!engine.is_loaded());

        // Failures are not cached; a second attempt reports again.
        let err = engine.initialize().expect_err("still fails");
        assert_eq!(err.kind(), ErrorKind::Load);

        let err = engine
            .execute(&ExecRequest::classic("print(1)", "", "", ""))
            .expect_err("execute reports the load failure");
        assert_eq!(err.kind(), ErrorKind::Load);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn library_without_entry_points_is_rejected() {
        let engine = NativeEngine::new(NativeOptions::new("libc.so.6"));
        let err = engine.initialize().expect_err("libc exports no engine");
        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(err.message().unwrap_or("").contains(ZENCODE_EXEC_TOBUF));
    }

    #[test]
    fn c_args_keep_order_and_pad_classic_requests() {
        let request = ExecRequest::classic("s", "debug=1", "", "{}");
        let args = CArgs::new(&request).expect("args");
        let texts = args
            .values
            .iter()
            .map(|value| value.to_str().expect("utf8"))
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["s", "debug=1", "", "{}", "", ""]);
    }

    #[test]
    fn interior_nul_names_the_field() {
        let request = ExecRequest::classic("s", "", "k\0k", "");
        let err = CArgs::new(&request).err().expect("nul rejected");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.field(), Some("keys"));
    }

    #[test]
    fn classic_abi_rejects_non_empty_extended_inputs() {
        let empty = ExecRequest::extended("s", "", "", "", "", "");
        assert!(check_abi(EntryAbi::Classic, &empty).is_ok());

        let extra = ExecRequest::extended("s", "", "", "", "x", "");
        let err = check_abi(EntryAbi::Classic, &extra).expect_err("extra rejected");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.field(), Some("extra"));
        assert!(check_abi(EntryAbi::Extended, &extra).is_ok());
    }

    #[test]
    fn c_buffer_stops_at_first_nul() {
        assert_eq!(read_c_buffer(b"{\"ok\":1}\0garbage"), "{\"ok\":1}");
        assert_eq!(read_c_buffer(b"full"), "full");
        assert_eq!(read_c_buffer(&[0u8; 8]), "");
    }

    #[test]
    fn capacities_are_never_zero() {
        let options = NativeOptions::default().with_capacities(0, 0);
        assert_eq!(options.stdout_capacity, 1);
        assert_eq!(options.stderr_capacity, 1);
    }

    #[cfg(unix)]
    mod fixture {
        use super::*;
        use serde_json::Value;

        fn engine(abi: EntryAbi) -> NativeEngine {
            let library = match abi {
                EntryAbi::Classic => env!("ZENGATE_FIXTURE_LIB_CLASSIC"),
                EntryAbi::Extended => env!("ZENGATE_FIXTURE_LIB_EXTENDED"),
            };
            NativeEngine::new(NativeOptions::new(library).with_abi(abi))
        }

        fn echoed(output: &ExecOutput) -> Value {
            serde_json::from_str(&output.output).expect("fixture output is json")
        }

        #[test]
        fn four_inputs_on_the_extended_entry_point_pad_with_empty_strings() {
            let engine = engine(EntryAbi::Extended);
            engine.initialize().expect("load");
            assert!(engine.is_loaded());
            let output = engine
                .execute(&ExecRequest::classic("Given nothing", "debug=1", "", "{}"))
                .expect("execute");
            let value = echoed(&output);
            assert_eq!(value["entry"], "zencode");
            assert_eq!(value["conf"], "debug=1");
            assert_eq!(value["keys"], "");
            assert_eq!(value["extra"], "");
            assert_eq!(value["context"], "");
            assert!(!output.output.contains("(null)"));
            assert_eq!(output.logs, "[*] fixture ok\n");
        }

        #[test]
        fn six_inputs_reach_the_extended_entry_point_in_order() {
            let output = engine(EntryAbi::Extended)
                .execute(&ExecRequest::extended("s", "c", "k", "d", "e", "x"))
                .expect("execute");
            let value = echoed(&output);
            let fields = ["script", "conf", "keys", "data", "extra", "context"]
                .map(|name| value[name].as_str().unwrap_or_default().to_string());
            assert_eq!(fields, ["s", "c", "k", "d", "e", "x"].map(String::from));
        }

        #[test]
        fn classic_entry_point_runs_four_inputs() {
            let engine = engine(EntryAbi::Classic);
            let output = engine
                .execute(&ExecRequest::extended("s", "", "k", "", "", ""))
                .expect("empty extended inputs fit the classic call");
            assert_eq!(echoed(&output)["keys"], "k");

            let err = engine
                .execute(&ExecRequest::extended("s", "", "", "", "e", ""))
                .expect_err("extra does not fit");
            assert_eq!(err.field(), Some("extra"));
        }

        #[test]
        fn lua_kind_uses_the_lua_entry_point() {
            let output = engine(EntryAbi::Extended)
                .execute(&ExecRequest::new("print(1)").with_kind(ScriptKind::Lua))
                .expect("execute");
            assert_eq!(echoed(&output)["entry"], "lua");
        }

        #[test]
        fn nonzero_return_is_an_invocation_error_with_logs() {
            let err = engine(EntryAbi::Extended)
                .execute(&ExecRequest::classic("fail", "", "", ""))
                .expect_err("fixture fails");
            assert_eq!(err.kind(), ErrorKind::Invocation);
            assert_eq!(err.message(), Some("[!] fixture rejected the script"));
            assert_eq!(err.status(), Some(2));
            assert!(err.logs().unwrap_or("").starts_with("[W] fixture starting"));
        }

        #[test]
        fn small_output_buffer_truncates_at_capacity() {
            let engine = NativeEngine::new(
                NativeOptions::new(env!("ZENGATE_FIXTURE_LIB_EXTENDED")).with_capacities(8, 64),
            );
            let output = engine
                .execute(&ExecRequest::new("Given nothing"))
                .expect("execute");
            assert_eq!(output.output, "{\"entry");
        }
    }
}
