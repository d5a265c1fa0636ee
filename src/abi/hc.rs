use std::ffi::{CStr, c_uint, c_void};

use super::libretro::ProcAddressFn;

/// Frontend API version the shim announces during negotiation.
pub const API_VERSION: c_uint = 1;

pub const SET_DEBUGGER_SYMBOL: &CStr = c"hc_set_debugger";
/// Misspelled name exported by cores implementing the first API revision.
pub const SET_DEBUGGER_SYMBOL_LEGACY: &CStr = c"hc_set_debuggger";

pub type SubscriptionId = u64;

/// Debugger event payload. Only ever handled by pointer.
#[repr(C)]
pub struct Event {
    _opaque: [u8; 0],
}

/// Core-side debugger API. Only ever handled by pointer.
#[repr(C)]
pub struct Core {
    _opaque: [u8; 0],
}

pub type HandleEventFn =
    unsafe extern "C" fn(user_data: *mut c_void, id: SubscriptionId, event: *const Event);

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DebuggerV1 {
    pub handle_event: Option<HandleEventFn>,
}

/// `hc_DebuggerIf`: filled in by the frontend, completed by the core.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DebuggerIf {
    pub frontend_api_version: c_uint,
    pub core_api_version: c_uint,
    pub core: *const Core,
    pub user_data: *mut c_void,
    pub v1: DebuggerV1,
}

impl DebuggerIf {
    pub fn frontend(handle_event: HandleEventFn, user_data: *mut c_void) -> Self {
        Self {
            frontend_api_version: API_VERSION,
            core_api_version: 0,
            core: std::ptr::null(),
            user_data,
            v1: DebuggerV1 {
                handle_event: Some(handle_event),
            },
        }
    }
}

pub type SetDebuggerFn = unsafe extern "C" fn(debugger: *mut DebuggerIf);

/// Reinterpret a resolved proc address as the `hc_set_debugger` setter.
///
/// # Safety
///
/// `f` must have been resolved for one of the set-debugger symbols.
pub unsafe fn set_debugger_from_proc(f: ProcAddressFn) -> SetDebuggerFn {
    unsafe { std::mem::transmute::<ProcAddressFn, SetDebuggerFn>(f) }
}

pub fn set_debugger_as_proc(f: SetDebuggerFn) -> ProcAddressFn {
    // SAFETY: function pointers share one representation; callers cast it back
    // through `set_debugger_from_proc` before invoking it.
    unsafe { std::mem::transmute::<SetDebuggerFn, ProcAddressFn>(f) }
}
