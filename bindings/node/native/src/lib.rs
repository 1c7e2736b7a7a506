/*
Purpose: Provide a Node N-API binding over the libzengate C ABI.
Key Exports: Zenroom, EntryAbi, ErrorKind, ExecResult.
Role: Node/TypeScript binding exposing the four- and six-input execute contract.
Invariants: `execute*`/`run*` run Zencode; `executeLua*`/`runLua*` run Lua through the same gateway.
Invariants: Calls into C ABI only; strings in, strings out; explicit close().
Invariants: Omitted optional inputs are sent as NULL, which the ABI treats as "".
Invariants: Errors carry the stable kind, the engine status and the engine logs.
*/

use libc::{c_char, c_int};
use napi::bindgen_prelude::Status;
use napi::{Error, Result};
use napi_derive::napi;
use std::ffi::{CStr, CString};
use std::ptr;

#[repr(C)]
struct zgt_gateway_t {
    _private: [u8; 0],
}

#[repr(C)]
struct zgt_buf_t {
    data: *mut u8,
    len: usize,
}

#[repr(C)]
struct zgt_error_t {
    kind: i32,
    message: *mut c_char,
    field: *mut c_char,
    status: i32,
    has_status: u8,
}

unsafe extern "C" {
    fn zgt_gateway_new(
        library_path: *const c_char,
        abi: u32,
        out_gateway: *mut *mut zgt_gateway_t,
        out_err: *mut *mut zgt_error_t,
    ) -> c_int;
    fn zgt_gateway_free(gateway: *mut zgt_gateway_t);

    fn zgt_execute(
        gateway: *mut zgt_gateway_t,
        script: *const c_char,
        conf: *const c_char,
        keys: *const c_char,
        data: *const c_char,
        out_output: *mut zgt_buf_t,
        out_logs: *mut zgt_buf_t,
        out_err: *mut *mut zgt_error_t,
    ) -> c_int;

    fn zgt_execute_ext(
        gateway: *mut zgt_gateway_t,
        script: *const c_char,
        conf: *const c_char,
        keys: *const c_char,
        data: *const c_char,
        extra: *const c_char,
        context: *const c_char,
        out_output: *mut zgt_buf_t,
        out_logs: *mut zgt_buf_t,
        out_err: *mut *mut zgt_error_t,
    ) -> c_int;

    fn zgt_execute_lua(
        gateway: *mut zgt_gateway_t,
        script: *const c_char,
        conf: *const c_char,
        keys: *const c_char,
        data: *const c_char,
        out_output: *mut zgt_buf_t,
        out_logs: *mut zgt_buf_t,
        out_err: *mut *mut zgt_error_t,
    ) -> c_int;

    fn zgt_execute_lua_ext(
        gateway: *mut zgt_gateway_t,
        script: *const c_char,
        conf: *const c_char,
        keys: *const c_char,
        data: *const c_char,
        extra: *const c_char,
        context: *const c_char,
        out_output: *mut zgt_buf_t,
        out_logs: *mut zgt_buf_t,
        out_err: *mut *mut zgt_error_t,
    ) -> c_int;

    fn zgt_buf_free(buf: *mut zgt_buf_t);
    fn zgt_error_free(err: *mut zgt_error_t);
}

type ExecFn = unsafe extern "C" fn(
    *mut zgt_gateway_t,
    *const c_char,
    *const c_char,
    *const c_char,
    *const c_char,
    *mut zgt_buf_t,
    *mut zgt_buf_t,
    *mut *mut zgt_error_t,
) -> c_int;

type ExecExtFn = unsafe extern "C" fn(
    *mut zgt_gateway_t,
    *const c_char,
    *const c_char,
    *const c_char,
    *const c_char,
    *const c_char,
    *const c_char,
    *mut zgt_buf_t,
    *mut zgt_buf_t,
    *mut *mut zgt_error_t,
) -> c_int;

#[napi]
#[derive(Debug, PartialEq, Eq)]
pub enum EntryAbi {
    Classic = 0,
    Extended = 1,
}

#[napi]
#[derive(Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Internal = 1,
    Usage = 2,
    Load = 3,
    Invocation = 4,
    Config = 5,
    Io = 6,
}

#[napi(object)]
pub struct ExecResult {
    pub output: String,
    pub logs: String,
}

#[napi]
pub struct Zenroom {
    ptr: *mut zgt_gateway_t,
}

#[napi]
impl Zenroom {
    /// Loads the engine library; a missing library raises a `Load` error here, not at first use.
    #[napi(constructor)]
    pub fn new(library_path: Option<String>, abi: Option<EntryAbi>) -> Result<Self> {
        let library_path = OptionalCString::new(library_path.as_deref(), "library_path")?;
        let abi = abi.unwrap_or(EntryAbi::Extended) as u32;
        let mut out = ptr::null_mut();
        let mut err = ptr::null_mut();
        let rc = unsafe { zgt_gateway_new(library_path.as_ptr(), abi, &mut out, &mut err) };
        if rc != 0 {
            return Err(take_error(err, None));
        }
        Ok(Self { ptr: out })
    }

    #[napi]
    pub fn execute(
        &self,
        script: String,
        conf: Option<String>,
        keys: Option<String>,
        data: Option<String>,
    ) -> Result<String> {
        self.run(script, conf, keys, data).map(|result| result.output)
    }

    #[napi]
    pub fn execute_extended(
        &self,
        script: String,
        conf: Option<String>,
        keys: Option<String>,
        data: Option<String>,
        extra: Option<String>,
        context: Option<String>,
    ) -> Result<String> {
        self.run_extended(script, conf, keys, data, extra, context)
            .map(|result| result.output)
    }

    /// Four-input call that also returns the engine logs.
    #[napi]
    pub fn run(
        &self,
        script: String,
        conf: Option<String>,
        keys: Option<String>,
        data: Option<String>,
    ) -> Result<ExecResult> {
        self.call(zgt_execute, script, conf, keys, data)
    }

    /// Six-input call that also returns the engine logs.
    #[napi]
    pub fn run_extended(
        &self,
        script: String,
        conf: Option<String>,
        keys: Option<String>,
        data: Option<String>,
        extra: Option<String>,
        context: Option<String>,
    ) -> Result<ExecResult> {
        self.call_extended(zgt_execute_ext, script, conf, keys, data, extra, context)
    }

    /// Runs a Lua script through the engine's `zenroom_exec_tobuf` entry point.
    #[napi]
    pub fn execute_lua(
        &self,
        script: String,
        conf: Option<String>,
        keys: Option<String>,
        data: Option<String>,
    ) -> Result<String> {
        self.run_lua(script, conf, keys, data).map(|result| result.output)
    }

    #[napi]
    pub fn execute_lua_extended(
        &self,
        script: String,
        conf: Option<String>,
        keys: Option<String>,
        data: Option<String>,
        extra: Option<String>,
        context: Option<String>,
    ) -> Result<String> {
        self.run_lua_extended(script, conf, keys, data, extra, context)
            .map(|result| result.output)
    }

    #[napi]
    pub fn run_lua(
        &self,
        script: String,
        conf: Option<String>,
        keys: Option<String>,
        data: Option<String>,
    ) -> Result<ExecResult> {
        self.call(zgt_execute_lua, script, conf, keys, data)
    }

    #[napi]
    pub fn run_lua_extended(
        &self,
        script: String,
        conf: Option<String>,
        keys: Option<String>,
        data: Option<String>,
        extra: Option<String>,
        context: Option<String>,
    ) -> Result<ExecResult> {
        self.call_extended(zgt_execute_lua_ext, script, conf, keys, data, extra, context)
    }

    #[napi]
    pub fn close(&mut self) {
        if !self.ptr.is_null() {
            unsafe { zgt_gateway_free(self.ptr) };
            self.ptr = ptr::null_mut();
        }
    }

    fn call(
        &self,
        entry: ExecFn,
        script: String,
        conf: Option<String>,
        keys: Option<String>,
        data: Option<String>,
    ) -> Result<ExecResult> {
        let gateway = self.handle()?;
        let script = to_cstring(script, "script")?;
        let conf = OptionalCString::new(conf.as_deref(), "conf")?;
        let keys = OptionalCString::new(keys.as_deref(), "keys")?;
        let data = OptionalCString::new(data.as_deref(), "data")?;
        let mut output = empty_buf();
        let mut logs = empty_buf();
        let mut err = ptr::null_mut();
        let rc = unsafe {
            entry(
                gateway,
                script.as_ptr(),
                conf.as_ptr(),
                keys.as_ptr(),
                data.as_ptr(),
                &mut output,
                &mut logs,
                &mut err,
            )
        };
        finish(rc, output, logs, err)
    }

    #[allow(clippy::too_many_arguments)]
    fn call_extended(
        &self,
        entry: ExecExtFn,
        script: String,
        conf: Option<String>,
        keys: Option<String>,
        data: Option<String>,
        extra: Option<String>,
        context: Option<String>,
    ) -> Result<ExecResult> {
        let gateway = self.handle()?;
        let script = to_cstring(script, "script")?;
        let conf = OptionalCString::new(conf.as_deref(), "conf")?;
        let keys = OptionalCString::new(keys.as_deref(), "keys")?;
        let data = OptionalCString::new(data.as_deref(), "data")?;
        let extra = OptionalCString::new(extra.as_deref(), "extra")?;
        let context = OptionalCString::new(context.as_deref(), "context")?;
        let mut output = empty_buf();
        let mut logs = empty_buf();
        let mut err = ptr::null_mut();
        let rc = unsafe {
            entry(
                gateway,
                script.as_ptr(),
                conf.as_ptr(),
                keys.as_ptr(),
                data.as_ptr(),
                extra.as_ptr(),
                context.as_ptr(),
                &mut output,
                &mut logs,
                &mut err,
            )
        };
        finish(rc, output, logs, err)
    }

    fn handle(&self) -> Result<*mut zgt_gateway_t> {
        if self.ptr.is_null() {
            return Err(Error::new(Status::GenericFailure, "zenroom: gateway is closed"));
        }
        Ok(self.ptr)
    }
}

impl Drop for Zenroom {
    fn drop(&mut self) {
        self.close();
    }
}

struct OptionalCString {
    value: Option<CString>,
}

impl OptionalCString {
    fn new(value: Option<&str>, name: &str) -> Result<Self> {
        let value = value
            .map(|value| {
                CString::new(value)
                    .map_err(|_| Error::new(Status::InvalidArg, format!("{name} contains NUL")))
            })
            .transpose()?;
        Ok(Self { value })
    }

    fn as_ptr(&self) -> *const c_char {
        self.value.as_ref().map_or(ptr::null(), |value| value.as_ptr())
    }
}

fn to_cstring(value: String, name: &str) -> Result<CString> {
    CString::new(value).map_err(|_| Error::new(Status::InvalidArg, format!("{name} contains NUL")))
}

fn empty_buf() -> zgt_buf_t {
    zgt_buf_t {
        data: ptr::null_mut(),
        len: 0,
    }
}

fn finish(rc: c_int, output: zgt_buf_t, logs: zgt_buf_t, err: *mut zgt_error_t) -> Result<ExecResult> {
    let output = copy_and_free_buf(output);
    let logs = copy_and_free_buf(logs);
    if rc != 0 {
        return Err(take_error(err, Some(&logs)));
    }
    Ok(ExecResult { output, logs })
}

fn copy_and_free_buf(mut buf: zgt_buf_t) -> String {
    let text = if buf.data.is_null() || buf.len == 0 {
        String::new()
    } else {
        String::from_utf8_lossy(unsafe { std::slice::from_raw_parts(buf.data, buf.len) })
            .into_owned()
    };
    unsafe { zgt_buf_free(&mut buf) };
    text
}

fn take_error(err: *mut zgt_error_t, logs: Option<&str>) -> Error {
    if err.is_null() {
        return Error::new(Status::GenericFailure, "zenroom: unknown error");
    }
    let owned = unsafe { &*err };
    let mut message = unsafe { cstring_to_string(owned.message) };
    let field = unsafe { cstring_to_string(owned.field) };
    let kind_label = error_kind_label(owned.kind);
    if message.is_empty() {
        message = default_error_message(kind_label).to_string();
    }
    let mut details = vec![format!("kind={kind_label}"), format!("message={message}")];
    if !field.is_empty() {
        details.push(format!("field={field}"));
    }
    if owned.has_status != 0 {
        details.push(format!("status={}", owned.status));
    }
    if let Some(logs) = logs.filter(|logs| !logs.is_empty()) {
        details.push(format!("logs={}", logs.trim_end()));
    }
    let status = if owned.kind == ErrorKind::Usage as i32 {
        Status::InvalidArg
    } else {
        Status::GenericFailure
    };
    unsafe { zgt_error_free(err) };
    Error::new(status, format!("zenroom error: {}", details.join("; ")))
}

fn default_error_message(kind: &str) -> &'static str {
    match kind {
        "Usage" => "usage error",
        "Load" => "engine library could not be loaded",
        "Invocation" => "script execution failed",
        "Config" => "invalid engine configuration",
        "Io" => "io error",
        _ => "internal error",
    }
}

fn error_kind_label(kind: i32) -> &'static str {
    match kind {
        2 => "Usage",
        3 => "Load",
        4 => "Invocation",
        5 => "Config",
        6 => "Io",
        _ => "Internal",
    }
}

unsafe fn cstring_to_string(ptr: *mut c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().to_string()
}
