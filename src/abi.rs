//! Purpose: C ABI bridge for foreign bindings (libzengate).
//! Exports: C-callable gateway/execute functions and buffer/error helpers.
//! Role: Stable ABI surface that managed runtimes bind to instead of per-language stubs.
//! Invariants: UTF-8 strings in; owned byte buffers out; explicit free functions.
//! Invariants: Error kinds map 1:1 with core error kinds.
//! Invariants: A NULL optional field is the empty string; a NULL script is a usage error.
//! Invariants: `zgt_execute_lua*` run the Lua entry point; the other execute calls run Zencode.
#![allow(clippy::result_large_err)]
#![allow(clippy::too_many_arguments)]
#![allow(non_camel_case_types)]

use crate::core::error::{Error, ErrorKind, to_exit_code};
use crate::core::gateway::Gateway;
use crate::core::native::{EntryAbi, NativeEngine, NativeOptions};
use crate::core::request::{ExecOutput, ExecRequest, ScriptKind};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;

pub const ZGT_ABI_CLASSIC: u32 = 0;
pub const ZGT_ABI_EXTENDED: u32 = 1;

#[repr(C)]
pub struct zgt_gateway {
    gateway: Gateway<NativeEngine>,
}

#[repr(C)]
pub struct zgt_buf {
    data: *mut u8,
    len: usize,
}

#[repr(C)]
pub struct zgt_error {
    kind: i32,
    message: *mut c_char,
    field: *mut c_char,
    status: i32,
    has_status: u8,
}

#[unsafe(no_mangle)]
pub extern "C" fn zgt_gateway_new(
    library_path: *const c_char,
    abi: u32,
    out_gateway: *mut *mut zgt_gateway,
    out_err: *mut *mut zgt_error,
) -> i32 {
    if out_gateway.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_gateway is null"),
        );
    }
    let abi = match abi {
        ZGT_ABI_CLASSIC => EntryAbi::Classic,
        ZGT_ABI_EXTENDED => EntryAbi::Extended,
        _ => {
            return fail(
                out_err,
                Error::new(ErrorKind::Usage).with_message("invalid abi"),
            );
        }
    };
    let mut options = NativeOptions::default().with_abi(abi);
    if !library_path.is_null() {
        match read_str(library_path, "library_path") {
            Ok(path) => options.library = PathBuf::from(path),
            Err(err) => return fail(out_err, err),
        }
    }
    let gateway = Gateway::new(NativeEngine::new(options));
    if let Err(err) = gateway.initialize() {
        return fail(out_err, err);
    }
    let handle = Box::new(zgt_gateway { gateway });
    unsafe {
        *out_gateway = Box::into_raw(handle);
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn zgt_gateway_free(gateway: *mut zgt_gateway) {
    if gateway.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(gateway));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn zgt_execute(
    gateway: *mut zgt_gateway,
    script: *const c_char,
    conf: *const c_char,
    keys: *const c_char,
    data: *const c_char,
    out_output: *mut zgt_buf,
    out_logs: *mut zgt_buf,
    out_err: *mut *mut zgt_error,
) -> i32 {
    let fields = [script, conf, keys, data];
    execute_kind(ScriptKind::Zencode, gateway, fields, None, out_output, out_logs, out_err)
}

#[unsafe(no_mangle)]
pub extern "C" fn zgt_execute_ext(
    gateway: *mut zgt_gateway,
    script: *const c_char,
    conf: *const c_char,
    keys: *const c_char,
    data: *const c_char,
    extra: *const c_char,
    context: *const c_char,
    out_output: *mut zgt_buf,
    out_logs: *mut zgt_buf,
    out_err: *mut *mut zgt_error,
) -> i32 {
    let fields = [script, conf, keys, data];
    let extended = Some((extra, context));
    execute_kind(ScriptKind::Zencode, gateway, fields, extended, out_output, out_logs, out_err)
}

/// Same as `zgt_execute`, but runs a Lua script through `zenroom_exec_tobuf`.
#[unsafe(no_mangle)]
pub extern "C" fn zgt_execute_lua(
    gateway: *mut zgt_gateway,
    script: *const c_char,
    conf: *const c_char,
    keys: *const c_char,
    data: *const c_char,
    out_output: *mut zgt_buf,
    out_logs: *mut zgt_buf,
    out_err: *mut *mut zgt_error,
) -> i32 {
    let fields = [script, conf, keys, data];
    execute_kind(ScriptKind::Lua, gateway, fields, None, out_output, out_logs, out_err)
}

#[unsafe(no_mangle)]
pub extern "C" fn zgt_execute_lua_ext(
    gateway: *mut zgt_gateway,
    script: *const c_char,
    conf: *const c_char,
    keys: *const c_char,
    data: *const c_char,
    extra: *const c_char,
    context: *const c_char,
    out_output: *mut zgt_buf,
    out_logs: *mut zgt_buf,
    out_err: *mut *mut zgt_error,
) -> i32 {
    let fields = [script, conf, keys, data];
    let extended = Some((extra, context));
    execute_kind(ScriptKind::Lua, gateway, fields, extended, out_output, out_logs, out_err)
}

#[unsafe(no_mangle)]
pub extern "C" fn zgt_buf_free(buf: *mut zgt_buf) {
    if buf.is_null() {
        return;
    }
    unsafe {
        let buf = &mut *buf;
        if !buf.data.is_null() && buf.len != 0 {
            drop(Vec::from_raw_parts(buf.data, buf.len, buf.len));
        }
        buf.data = ptr::null_mut();
        buf.len = 0;
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn zgt_error_free(err: *mut zgt_error) {
    if err.is_null() {
        return;
    }
    unsafe {
        let err = Box::from_raw(err);
        if !err.message.is_null() {
            drop(CString::from_raw(err.message));
        }
        if !err.field.is_null() {
            drop(CString::from_raw(err.field));
        }
    }
}

fn finish(
    gateway: &zgt_gateway,
    request: &ExecRequest,
    out_output: *mut zgt_buf,
    out_logs: *mut zgt_buf,
    out_err: *mut *mut zgt_error,
) -> i32 {
    if out_output.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_output is null"),
        );
    }
    match gateway.gateway.run(request) {
        Ok(ExecOutput { output, logs }) => {
            write_buf(out_output, output.into_bytes());
            if !out_logs.is_null() {
                write_buf(out_logs, logs.into_bytes());
            }
            0
        }
        Err(err) => {
            if !out_logs.is_null() {
                write_buf(out_logs, err.logs().unwrap_or("").as_bytes().to_vec());
            }
            fail(out_err, err)
        }
    }
}

fn execute_kind(
    kind: ScriptKind,
    gateway: *mut zgt_gateway,
    [script, conf, keys, data]: [*const c_char; 4],
    extended: Option<(*const c_char, *const c_char)>,
    out_output: *mut zgt_buf,
    out_logs: *mut zgt_buf,
    out_err: *mut *mut zgt_error,
) -> i32 {
    let gateway = match borrow_gateway(gateway, out_err) {
        Ok(gateway) => gateway,
        Err(code) => return code,
    };
    let request = classic_request(script, conf, keys, data).and_then(|request| {
        let request = request.with_kind(kind);
        match extended {
            None => Ok(request),
            Some((extra, context)) => Ok(request.with_extended(
                read_optional(extra, "extra")?,
                read_optional(context, "context")?,
            )),
        }
    });
    match request {
        Ok(request) => finish(gateway, &request, out_output, out_logs, out_err),
        Err(err) => fail(out_err, err),
    }
}

fn borrow_gateway<'a>(
    gateway: *mut zgt_gateway,
    out_err: *mut *mut zgt_error,
) -> Result<&'a zgt_gateway, i32> {
    if gateway.is_null() {
        return Err(fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("gateway is null"),
        ));
    }
    unsafe { Ok(&*gateway) }
}

fn classic_request(
    script: *const c_char,
    conf: *const c_char,
    keys: *const c_char,
    data: *const c_char,
) -> Result<ExecRequest, Error> {
    if script.is_null() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("script is null")
            .with_field("script"));
    }
    Ok(ExecRequest::classic(
        read_str(script, "script")?,
        read_optional(conf, "conf")?,
        read_optional(keys, "keys")?,
        read_optional(data, "data")?,
    ))
}

fn read_optional(input: *const c_char, field: &'static str) -> Result<String, Error> {
    if input.is_null() {
        return Ok(String::new());
    }
    read_str(input, field)
}

fn read_str(input: *const c_char, field: &'static str) -> Result<String, Error> {
    unsafe { CStr::from_ptr(input) }
        .to_str()
        .map(ToString::to_string)
        .map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("{field} is not valid UTF-8"))
                .with_field(field)
                .with_source(err)
        })
}

fn write_buf(out: *mut zgt_buf, bytes: Vec<u8>) {
    unsafe {
        let buf = &mut *out;
        let mut data = bytes.into_boxed_slice();
        buf.len = data.len();
        buf.data = if buf.len == 0 {
            ptr::null_mut()
        } else {
            data.as_mut_ptr()
        };
        std::mem::forget(data);
    }
}

fn fail(out_err: *mut *mut zgt_error, err: Error) -> i32 {
    if out_err.is_null() {
        return -1;
    }
    let error = Box::new(zgt_error {
        kind: to_exit_code(err.kind()),
        message: to_c_string(err.message().unwrap_or("")),
        field: err.field().map(to_c_string).unwrap_or(ptr::null_mut()),
        status: err.status().unwrap_or(0),
        has_status: if err.status().is_some() { 1 } else { 0 },
    });
    unsafe {
        *out_err = Box::into_raw(error);
    }
    -1
}

fn to_c_string(input: &str) -> *mut c_char {
    CString::new(input.replace('\0', " "))
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take_error(err: *mut zgt_error) -> (i32, String) {
        assert!(!err.is_null());
        let (kind, message) = unsafe {
            let e = &*err;
            (
                e.kind,
                CStr::from_ptr(e.message).to_string_lossy().into_owned(),
            )
        };
        zgt_error_free(err);
        (kind, message)
    }

    #[test]
    fn load_failure_is_reported_through_out_err() {
        let path = CString::new("/nonexistent/libzenroom.so").expect("path");
        let mut gateway: *mut zgt_gateway = ptr::null_mut();
        let mut err: *mut zgt_error = ptr::null_mut();
        let rc = zgt_gateway_new(path.as_ptr(), ZGT_ABI_EXTENDED, &mut gateway, &mut err);
        assert_eq!(rc, -1);
        assert!(gateway.is_null());
        let (kind, message) = take_error(err);
        assert_eq!(kind, to_exit_code(ErrorKind::Load));
        assert!(!message.is_empty());
    }

    #[test]
    fn invalid_abi_and_null_outputs_are_usage_errors() {
        let mut gateway: *mut zgt_gateway = ptr::null_mut();
        let mut err: *mut zgt_error = ptr::null_mut();
        assert_eq!(zgt_gateway_new(ptr::null(), 9, &mut gateway, &mut err), -1);
        assert_eq!(take_error(err).0, to_exit_code(ErrorKind::Usage));

        let mut err: *mut zgt_error = ptr::null_mut();
        assert_eq!(
            zgt_gateway_new(ptr::null(), ZGT_ABI_CLASSIC, ptr::null_mut(), &mut err),
            -1
        );
        assert_eq!(take_error(err).1, "out_gateway is null");
    }

    #[test]
    fn execute_rejects_null_gateway_and_script() {
        let mut out = zgt_buf {
            data: ptr::null_mut(),
            len: 0,
        };
        let mut err: *mut zgt_error = ptr::null_mut();
        let script = CString::new("Given nothing").expect("script");
        let rc = zgt_execute(
            ptr::null_mut(),
            script.as_ptr(),
            ptr::null(),
            ptr::null(),
            ptr::null(),
            &mut out,
            ptr::null_mut(),
            &mut err,
        );
        assert_eq!(rc, -1);
        assert_eq!(take_error(err).1, "gateway is null");

        let request = classic_request(ptr::null(), ptr::null(), ptr::null(), ptr::null());
        let err = request.expect_err("null script");
        assert_eq!(err.field(), Some("script"));
    }

    #[test]
    fn null_optional_fields_become_empty_strings() {
        let script = CString::new("s").expect("script");
        let keys = CString::new("").expect("keys");
        let request =
            classic_request(script.as_ptr(), ptr::null(), keys.as_ptr(), ptr::null()).expect("ok");
        assert_eq!(request, ExecRequest::classic("s", "", "", ""));
    }

    #[test]
    fn buffers_round_trip_and_free() {
        let mut buf = zgt_buf {
            data: ptr::null_mut(),
            len: 0,
        };
        write_buf(&mut buf, b"{\"ok\":true}".to_vec());
        let bytes = unsafe { std::slice::from_raw_parts(buf.data, buf.len) };
        assert_eq!(bytes, b"{\"ok\":true}");
        zgt_buf_free(&mut buf);
        assert!(buf.data.is_null());
        assert_eq!(buf.len, 0);

        write_buf(&mut buf, Vec::new());
        assert!(buf.data.is_null());
        zgt_buf_free(&mut buf);
    }

    #[cfg(unix)]
    mod fixture {
        use super::*;
        use serde_json::Value;

        fn open(abi: u32) -> *mut zgt_gateway {
            let library = match abi {
                ZGT_ABI_CLASSIC => env!("ZENGATE_FIXTURE_LIB_CLASSIC"),
                _ => env!("ZENGATE_FIXTURE_LIB_EXTENDED"),
            };
            let path = CString::new(library).expect("path");
            let mut gateway: *mut zgt_gateway = ptr::null_mut();
            let mut err: *mut zgt_error = ptr::null_mut();
            assert_eq!(zgt_gateway_new(path.as_ptr(), abi, &mut gateway, &mut err), 0);
            assert!(err.is_null());
            assert!(!gateway.is_null());
            gateway
        }

        fn empty_buf() -> zgt_buf {
            zgt_buf {
                data: ptr::null_mut(),
                len: 0,
            }
        }

        fn take_text(buf: &mut zgt_buf) -> String {
            let text = if buf.len == 0 {
                String::new()
            } else {
                let bytes = unsafe { std::slice::from_raw_parts(buf.data, buf.len) };
                String::from_utf8_lossy(bytes).into_owned()
            };
            zgt_buf_free(buf);
            text
        }

        fn c(text: &str) -> CString {
            CString::new(text).expect("c string")
        }

        #[test]
        fn execute_returns_engine_output_and_logs() {
            let gateway = open(ZGT_ABI_EXTENDED);
            let (script, keys) = (c("Given nothing"), c("k1"));
            let (mut output, mut logs) = (empty_buf(), empty_buf());
            let mut err: *mut zgt_error = ptr::null_mut();
            let rc = zgt_execute(
                gateway,
                script.as_ptr(),
                ptr::null(),
                keys.as_ptr(),
                ptr::null(),
                &mut output,
                &mut logs,
                &mut err,
            );
            assert_eq!(rc, 0);
            assert!(err.is_null());

            let value: Value = serde_json::from_str(&take_text(&mut output)).expect("json");
            assert_eq!(value["entry"], "zencode");
            assert_eq!(value["script"], "Given nothing");
            assert_eq!(value["keys"], "k1");
            assert_eq!(value["conf"], "");
            assert_eq!(value["extra"], "");
            assert_eq!(value["context"], "");
            assert_eq!(take_text(&mut logs), "[*] fixture ok\n");
            zgt_gateway_free(gateway);
        }

        #[test]
        fn engine_failure_carries_status_message_and_logs() {
            let gateway = open(ZGT_ABI_EXTENDED);
            let script = c("fail please");
            let (mut output, mut logs) = (empty_buf(), empty_buf());
            let mut err: *mut zgt_error = ptr::null_mut();
            let rc = zgt_execute(
                gateway,
                script.as_ptr(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                &mut output,
                &mut logs,
                &mut err,
            );
            assert_eq!(rc, -1);
            assert!(output.data.is_null());
            let (status, has_status) = unsafe { ((*err).status, (*err).has_status) };
            assert_eq!((status, has_status), (2, 1));
            let (kind, message) = take_error(err);
            assert_eq!(kind, to_exit_code(ErrorKind::Invocation));
            assert_eq!(message, "[!] fixture rejected the script");
            assert!(take_text(&mut logs).contains("[W] fixture starting"));
            zgt_gateway_free(gateway);
        }

        #[test]
        fn lua_calls_reach_the_lua_entry_point() {
            let gateway = open(ZGT_ABI_EXTENDED);
            let (script, extra) = (c("print(1)"), c("x"));
            let mut output = empty_buf();
            let mut err: *mut zgt_error = ptr::null_mut();
            let rc = zgt_execute_lua_ext(
                gateway,
                script.as_ptr(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                extra.as_ptr(),
                ptr::null(),
                &mut output,
                ptr::null_mut(),
                &mut err,
            );
            assert_eq!(rc, 0);
            let value: Value = serde_json::from_str(&take_text(&mut output)).expect("json");
            assert_eq!(value["entry"], "lua");
            assert_eq!(value["extra"], "x");

            let mut output = empty_buf();
            let rc = zgt_execute_lua(
                gateway,
                script.as_ptr(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                &mut output,
                ptr::null_mut(),
                &mut err,
            );
            assert_eq!(rc, 0);
            let value: Value = serde_json::from_str(&take_text(&mut output)).expect("json");
            assert_eq!(value["entry"], "lua");
            zgt_gateway_free(gateway);
        }

        #[test]
        fn classic_library_refuses_extended_inputs() {
            let gateway = open(ZGT_ABI_CLASSIC);
            let (script, context) = (c("Given nothing"), c("ctx"));
            let mut output = empty_buf();
            let mut err: *mut zgt_error = ptr::null_mut();
            let rc = zgt_execute(
                gateway,
                script.as_ptr(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                &mut output,
                ptr::null_mut(),
                &mut err,
            );
            assert_eq!(rc, 0);
            let value: Value = serde_json::from_str(&take_text(&mut output)).expect("json");
            assert_eq!(value["extra"], "-");

            let rc = zgt_execute_ext(
                gateway,
                script.as_ptr(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                context.as_ptr(),
                &mut output,
                ptr::null_mut(),
                &mut err,
            );
            assert_eq!(rc, -1);
            let field = unsafe { CStr::from_ptr((*err).field) }
                .to_string_lossy()
                .into_owned();
            assert_eq!(field, "context");
            assert_eq!(take_error(err).0, to_exit_code(ErrorKind::Usage));
            zgt_gateway_free(gateway);
        }
    }
}
