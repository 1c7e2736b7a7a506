// Raw entry-point signatures and the dynamic loader shim.
use std::ffi::c_void;
use std::os::raw::{c_char, c_int};
use std::path::Path;

use crate::core::error::{Error, ErrorKind};

pub const ZENCODE_EXEC_TOBUF: &str = "zencode_exec_tobuf";
pub const ZENROOM_EXEC_TOBUF: &str = "zenroom_exec_tobuf";

/// `int f(script, conf, keys, data, stdout_buf, stdout_len, stderr_buf, stderr_len)`
pub type ClassicExecFn = unsafe extern "C" fn(
    script: *const c_char,
    conf: *const c_char,
    keys: *const c_char,
    data: *const c_char,
    stdout_buf: *mut c_char,
    stdout_len: usize,
    stderr_buf: *mut c_char,
    stderr_len: usize,
) -> c_int;

/// `int f(script, conf, keys, data, extra, context, stdout_buf, stdout_len, stderr_buf, stderr_len)`
pub type ExtendedExecFn = unsafe extern "C" fn(
    script: *const c_char,
    conf: *const c_char,
    keys: *const c_char,
    data: *const c_char,
    extra: *const c_char,
    context: *const c_char,
    stdout_buf: *mut c_char,
    stdout_len: usize,
    stderr_buf: *mut c_char,
    stderr_len: usize,
) -> c_int;

pub struct Library {
    #[cfg_attr(not(unix), allow(dead_code))]
    handle: *mut c_void,
}

// The handle is only used for symbol lookup and close; libdl is thread-safe for both.
unsafe impl Send for Library {}
unsafe impl Sync for Library {}

#[cfg(unix)]
impl Library {
    pub fn open(path: &Path) -> Result<Self, Error> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("library path contains a nul byte")
                .with_source(err)
        })?;
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(Error::new(ErrorKind::Load)
                .with_message(
                    last_dl_error()
                        .unwrap_or_else(|| format!("cannot load {}", path.display())),
                )
                .with_hint("Set --lib (or ZENGATE_LIB) to the path of libzenroom."));
        }
        Ok(Self { handle })
    }

    /// Address of `name`, or `None` when the library does not export it.
    pub fn symbol(&self, name: &str) -> Option<*mut c_void> {
        let c_name = std::ffi::CString::new(name).ok()?;
        unsafe {
            libc::dlerror();
            let addr = libc::dlsym(self.handle, c_name.as_ptr());
            if addr.is_null() { None } else { Some(addr) }
        }
    }
}

#[cfg(not(unix))]
impl Library {
    pub fn open(path: &Path) -> Result<Self, Error> {
        Err(Error::new(ErrorKind::Load).with_message(format!(
            "dynamic loading is not supported on this platform ({})",
            path.display()
        )))
    }

    pub fn symbol(&self, _name: &str) -> Option<*mut c_void> {
        None
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        #[cfg(unix)]
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

#[cfg(unix)]
fn last_dl_error() -> Option<String> {
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        return None;
    }
    let text = unsafe { std::ffi::CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned();
    Some(text)
}
