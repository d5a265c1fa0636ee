//! C entry points and the process-wide state behind them.
//!
//! The frontend sees one shim per process. Its state lives in three statics,
//! each behind its own mutex, and no two are held at once. The shim lock is
//! never held across a call into the core or the frontend; scripts run under
//! the script table's lock and reach the core only through `CoreView`.

pub mod debugger;
pub mod intercept;
pub mod script;

use std::ffi::{c_char, c_uint};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use env_logger::Env;
use log::{error, info};

use crate::config::ShimConfig;
use crate::error::LastError;
use crate::script::Scripts;
use crate::script::lua::LuaEngine;
use crate::shim::Shim;

pub const API_VERSION: c_uint = 1;

static SHIM: Mutex<Option<Shim>> = Mutex::new(None);
static SCRIPTS: LazyLock<Mutex<Scripts<LuaEngine>>> =
    LazyLock::new(|| Mutex::new(Scripts::new(LuaEngine::new())));
static LAST_ERROR: Mutex<LastError> = Mutex::new(LastError::new());

/// Lock ignoring poison: a panic caught at the boundary must not wedge the
/// shim for the rest of the process.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `f` on the live shim. `None` before `retro_script_init`.
pub(crate) fn with_shim<R>(f: impl FnOnce(&mut Shim) -> R) -> Option<R> {
    lock(&SHIM).as_mut().map(f)
}

pub(crate) fn with_scripts<R>(f: impl FnOnce(&mut Scripts<LuaEngine>) -> R) -> R {
    f(&mut lock(&SCRIPTS))
}

pub(crate) fn set_error(message: &str) {
    lock(&LAST_ERROR).set(message);
}

pub(crate) fn clear_error() {
    lock(&LAST_ERROR).clear();
}

/// Keep panics from unwinding into the caller.
pub(crate) fn guard<R>(fallback: R, f: impl FnOnce() -> R) -> R {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error!("panic caught at the C boundary");
            fallback
        }
    }
}

/// Reset all state for a new core. Returns the API version.
#[unsafe(no_mangle)]
pub extern "C" fn retro_script_init() -> c_uint {
    guard(API_VERSION, || {
        let config = ShimConfig::from_env();
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or(&config.log_level))
            .try_init();

        let previous = lock(&SHIM).replace(Shim::new(config, debugger::on_breakpoint_event));
        if let Some(previous) = previous {
            previous.retire();
        }
        with_scripts(|scripts| scripts.reset());
        clear_error();
        info!("retro_script_init: api version {API_VERSION}");
        API_VERSION
    })
}

/// Release everything. Only needed once, before the frontend exits.
#[unsafe(no_mangle)]
pub extern "C" fn retro_script_deinit() {
    guard((), || {
        let previous = lock(&SHIM).take();
        if let Some(previous) = previous {
            previous.retire();
        }
        with_scripts(|scripts| scripts.reset());
        clear_error();
        info!("retro_script_deinit");
    })
}

/// Text of the last user-facing failure, or null. Valid until the next
/// failure or init.
#[unsafe(no_mangle)]
pub extern "C" fn retro_script_get_error() -> *const c_char {
    guard(std::ptr::null(), || lock(&LAST_ERROR).as_ptr())
}
