//! Script loading and handler entry points, plus the hook fan-out used by
//! the intercept wrappers.

use std::ffi::{CStr, c_char, c_int};
use std::path::Path;

use log::{info, warn};

use super::{clear_error, guard, set_error, with_scripts, with_shim};
use crate::error::ShimError;
use crate::script::lua::{LuaErrorHandler, LuaSetup, SetupLuaFn};
use crate::script::{Hook, INVALID_SCRIPT, ScriptFailure, ScriptId, UncaughtErrorFn};

fn report(failures: &[ScriptFailure], handler: Option<UncaughtErrorFn>) {
    for failure in failures {
        failure.report(handler);
    }
}

/// Run `hook` in every script. Failures are reported after the script
/// table is released.
pub(crate) fn run_hook(hook: Hook) {
    let Some(view) = with_shim(|shim| shim.view()) else {
        return;
    };
    let (failures, handler) =
        with_scripts(|scripts| (scripts.dispatch(hook, &view), scripts.uncaught_handler()));
    report(&failures, handler);
}

/// The core is being unloaded: scripts get `on_unload` and go, then the
/// breakpoint registry is emptied.
pub(crate) fn unload_core() {
    let Some(view) = with_shim(|shim| shim.view()) else {
        return;
    };
    let (failures, handler) =
        with_scripts(|scripts| (scripts.unload_all(&view), scripts.uncaught_handler()));
    report(&failures, handler);
    with_shim(|shim| shim.unload_core());
    info!("core unloaded, scripts and breakpoints cleared");
}

fn load(path: *const c_char, setup: Option<LuaSetup>) -> ScriptId {
    clear_error();
    if path.is_null() {
        set_error("script path is null");
        return INVALID_SCRIPT;
    }
    // SAFETY: the frontend passes a NUL-terminated path.
    let path = unsafe { CStr::from_ptr(path) };
    let Ok(path) = path.to_str() else {
        set_error("script path is not valid UTF-8");
        return INVALID_SCRIPT;
    };
    let Some(view) = with_shim(|shim| shim.view()) else {
        set_error(&ShimError::NotInitialized.to_string());
        return INVALID_SCRIPT;
    };

    match with_scripts(|scripts| scripts.load(Path::new(path), setup, &view)) {
        Ok(id) => id,
        Err(err) => {
            let err = ShimError::from(err);
            warn!("{err}");
            set_error(&err.to_string());
            INVALID_SCRIPT
        }
    }
}

/// Load and run a Lua script. Returns its handle, or 0 on failure with the
/// reason available from `retro_script_get_error`.
///
/// # Safety
///
/// `path` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_script_load_lua(path: *const c_char) -> ScriptId {
    guard(INVALID_SCRIPT, || load(path, None))
}

/// As [`retro_script_load_lua`], calling `setup` with the `retro` table on
/// the stack before the script body runs. `setup` returns 1 to go ahead.
///
/// # Safety
///
/// As [`retro_script_load_lua`]. `setup` runs while the script table is
/// locked and must not call back into `retro_script_*`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_script_load_lua_special(
    path: *const c_char,
    setup: Option<SetupLuaFn>,
) -> ScriptId {
    guard(INVALID_SCRIPT, || load(path, setup.map(LuaSetup::Raw)))
}

/// Stop one script. Returns 0 on success, 1 for an unknown handle.
#[unsafe(no_mangle)]
pub extern "C" fn retro_script_unload(id: ScriptId) -> c_int {
    guard(1, || {
        let view = with_shim(|shim| shim.view()).unwrap_or_default();
        let result = with_scripts(|scripts| {
            scripts
                .unload(id, &view)
                .map(|failure| (failure, scripts.uncaught_handler()))
        });
        match result {
            Ok((failure, handler)) => {
                report(failure.as_slice(), handler);
                0
            }
            Err(err) => {
                warn!("{err}");
                1
            }
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn retro_script_set_lua_error_handler(handler: Option<LuaErrorHandler>) {
    guard((), || with_scripts(|scripts| scripts.engine_mut().set_error_handler(handler)))
}

#[unsafe(no_mangle)]
pub extern "C" fn retro_script_get_lua_error_handler() -> Option<LuaErrorHandler> {
    guard(None, || with_scripts(|scripts| scripts.engine().error_handler()))
}

/// Handler for script errors nothing else caught. Null restores logging.
#[unsafe(no_mangle)]
pub extern "C" fn retro_script_set_lua_uncaught_error_handler(handler: Option<UncaughtErrorFn>) {
    guard((), || with_scripts(|scripts| scripts.set_uncaught_handler(handler)))
}
