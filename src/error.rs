use std::borrow::Cow;
use std::ffi::{CStr, CString};

use thiserror::Error;

use crate::script::ScriptError;

#[derive(Error, Debug)]
pub enum ShimError {
    #[error("retro_script_init has not been called")]
    NotInitialized,
    #[error("no breakpoint callback supplied")]
    MissingCallback,
    #[error("core exposes no debugger interface")]
    NoDebugger,
    #[error("handle 0 is reserved")]
    InvalidHandle,
    #[error("handle {0} is already registered")]
    DuplicateHandle(u64),
    #[error("handle {0} is not registered")]
    UnknownHandle(u64),
    #[error("out of memory")]
    OutOfMemory,
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Fallback used when the message itself cannot be stored.
const OOM_MESSAGE: &CStr = c"Insufficient memory to allocate error description.";

/// Process-wide last-error text handed out through `retro_script_get_error`.
///
/// Messages are either owned by the store or borrowed from static storage;
/// the pointer returned by [`LastError::as_ptr`] stays valid until the next
/// `set`/`clear`.
#[derive(Debug, Default)]
pub struct LastError {
    text: Option<Cow<'static, CStr>>,
}

impl LastError {
    pub const fn new() -> Self {
        Self { text: None }
    }

    pub fn clear(&mut self) {
        self.text = None;
    }

    /// Store a copy of `message`. Interior NULs truncate the message.
    pub fn set(&mut self, message: &str) {
        let bytes = message.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());

        let mut owned = Vec::new();
        if owned.try_reserve_exact(end + 1).is_err() {
            self.set_static(OOM_MESSAGE);
            return;
        }
        owned.extend_from_slice(&bytes[..end]);

        match CString::new(owned) {
            Ok(text) => self.text = Some(Cow::Owned(text)),
            Err(_) => self.set_static(OOM_MESSAGE),
        }
    }

    pub fn set_static(&mut self, message: &'static CStr) {
        self.text = Some(Cow::Borrowed(message));
    }

    pub fn get(&self) -> Option<&CStr> {
        self.text.as_deref()
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.text, Some(Cow::Owned(_)))
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        self.get().map_or(std::ptr::null(), CStr::as_ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_clear() {
        let mut err = LastError::new();
        assert!(err.get().is_none());
        assert!(err.as_ptr().is_null());

        err.set("script failed to load");
        assert_eq!(err.get(), Some(c"script failed to load"));
        assert!(err.is_owned());

        err.clear();
        assert!(err.get().is_none());
    }

    #[test]
    fn static_messages_are_not_owned() {
        let mut err = LastError::new();
        err.set_static(c"static text");
        assert_eq!(err.get(), Some(c"static text"));
        assert!(!err.is_owned());
    }

    #[test]
    fn interior_nul_truncates() {
        let mut err = LastError::new();
        err.set("before\0after");
        assert_eq!(err.get(), Some(c"before"));
    }
}
