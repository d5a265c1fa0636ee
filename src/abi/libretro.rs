use std::ffi::{c_char, c_uint, c_void};

/// `RETRO_ENVIRONMENT_SET_PROC_ADDRESS_CALLBACK`
pub const ENVIRONMENT_SET_PROC_ADDRESS_CALLBACK: c_uint = 33;

pub const MEMORY_SAVE_RAM: c_uint = 0;
pub const MEMORY_RTC: c_uint = 1;
pub const MEMORY_SYSTEM_RAM: c_uint = 2;
pub const MEMORY_VIDEO_RAM: c_uint = 3;

pub type EnvironmentFn = unsafe extern "C" fn(cmd: c_uint, data: *mut c_void) -> bool;
pub type InputPollFn = unsafe extern "C" fn();
pub type InputStateFn =
    unsafe extern "C" fn(port: c_uint, device: c_uint, index: c_uint, id: c_uint) -> i16;

pub type ProcAddressFn = unsafe extern "C" fn();
pub type GetProcAddressFn = unsafe extern "C" fn(sym: *const c_char) -> Option<ProcAddressFn>;

/// `struct retro_get_proc_address_interface`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GetProcAddressInterface {
    pub get_proc_address: Option<GetProcAddressFn>,
}

// Core entry points that can be intercepted.
pub type SetEnvironmentFn = unsafe extern "C" fn(cb: Option<EnvironmentFn>);
pub type GetMemoryDataFn = unsafe extern "C" fn(id: c_uint) -> *mut c_void;
pub type GetMemorySizeFn = unsafe extern "C" fn(id: c_uint) -> usize;
pub type InitFn = unsafe extern "C" fn();
pub type DeinitFn = unsafe extern "C" fn();
pub type RunFn = unsafe extern "C" fn();
pub type SetInputPollFn = unsafe extern "C" fn(cb: Option<InputPollFn>);
pub type SetInputStateFn = unsafe extern "C" fn(cb: Option<InputStateFn>);
