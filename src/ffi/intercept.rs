//! `retro_script_intercept_*` and the wrappers they hand back.
//!
//! Usage from the frontend, before `retro_init`:
//! `core.retro_run = retro_script_intercept_retro_run(core.retro_run);`

use std::ffi::{CStr, c_char, c_uint, c_void};

use log::{trace, warn};

use super::{debugger, guard, script, with_shim};
use crate::abi::hc;
use crate::abi::libretro::{
    ENVIRONMENT_SET_PROC_ADDRESS_CALLBACK, EnvironmentFn, GetMemoryDataFn, GetMemorySizeFn,
    GetProcAddressInterface, InputPollFn, InputStateFn, ProcAddressFn, RunFn, SetEnvironmentFn,
    SetInputPollFn, SetInputStateFn,
};
use crate::hooks::{EntryPoint, Intercepts, Layer, Slot};
use crate::script::Hook;

type SlotFn<F> = fn(&mut Intercepts) -> &mut Slot<F>;

/// Leaves the entered layer when the forwarded call returns or unwinds.
struct Entered<F: EntryPoint> {
    slot: SlotFn<F>,
}

impl<F: EntryPoint> Drop for Entered<F> {
    fn drop(&mut self) {
        with_shim(|shim| (self.slot)(shim.intercepts_mut()).leave());
    }
}

fn enter<F: EntryPoint>(slot: SlotFn<F>) -> Option<(Layer<F>, Entered<F>)> {
    let layer = with_shim(|shim| slot(shim.intercepts_mut()).enter()).flatten()?;
    Some((layer, Entered { slot }))
}

macro_rules! intercept {
    ($export:ident, $slot:ident, $ty:ty, $wrapper:ident) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn $export(original: Option<$ty>) -> Option<$ty> {
            guard(original, || {
                let installed =
                    with_shim(|shim| $slot(shim.intercepts_mut()).install(original, $wrapper));
                installed.unwrap_or_else(|| {
                    warn!("{} called before retro_script_init", stringify!($export));
                    original
                })
            })
        }
    };
}

fn set_environment_slot(intercepts: &mut Intercepts) -> &mut Slot<SetEnvironmentFn> {
    &mut intercepts.set_environment
}

fn get_memory_data_slot(intercepts: &mut Intercepts) -> &mut Slot<GetMemoryDataFn> {
    &mut intercepts.get_memory_data
}

fn get_memory_size_slot(intercepts: &mut Intercepts) -> &mut Slot<GetMemorySizeFn> {
    &mut intercepts.get_memory_size
}

fn init_slot(intercepts: &mut Intercepts) -> &mut Slot<RunFn> {
    &mut intercepts.init
}

fn deinit_slot(intercepts: &mut Intercepts) -> &mut Slot<RunFn> {
    &mut intercepts.deinit
}

fn run_slot(intercepts: &mut Intercepts) -> &mut Slot<RunFn> {
    &mut intercepts.run
}

fn set_input_poll_slot(intercepts: &mut Intercepts) -> &mut Slot<SetInputPollFn> {
    &mut intercepts.set_input_poll
}

fn set_input_state_slot(intercepts: &mut Intercepts) -> &mut Slot<SetInputStateFn> {
    &mut intercepts.set_input_state
}

intercept!(
    retro_script_intercept_retro_set_environment,
    set_environment_slot,
    SetEnvironmentFn,
    wrap_set_environment
);
intercept!(
    retro_script_intercept_retro_get_memory_data,
    get_memory_data_slot,
    GetMemoryDataFn,
    wrap_get_memory_data
);
intercept!(
    retro_script_intercept_retro_get_memory_size,
    get_memory_size_slot,
    GetMemorySizeFn,
    wrap_get_memory_size
);
intercept!(
    retro_script_intercept_retro_init,
    init_slot,
    RunFn,
    wrap_init
);
intercept!(
    retro_script_intercept_retro_deinit,
    deinit_slot,
    RunFn,
    wrap_deinit
);
intercept!(
    retro_script_intercept_retro_run,
    run_slot,
    RunFn,
    wrap_run
);
intercept!(
    retro_script_intercept_retro_set_input_poll,
    set_input_poll_slot,
    SetInputPollFn,
    wrap_set_input_poll
);
intercept!(
    retro_script_intercept_retro_set_input_state,
    set_input_state_slot,
    SetInputStateFn,
    wrap_set_input_state
);

unsafe extern "C" fn wrap_set_environment(cb: Option<EnvironmentFn>) {
    guard((), || {
        let Some((layer, _entered)) = enter(set_environment_slot) else {
            return;
        };
        let forwarded = if layer.outermost {
            with_shim(|shim| shim.core_mut().set_host_environment(cb));
            cb.map(|_| environment_trampoline as EnvironmentFn)
        } else {
            cb
        };
        // SAFETY: the entry point the frontend handed to intercept.
        unsafe { (layer.target)(forwarded) }
    })
}

unsafe extern "C" fn wrap_get_memory_data(id: c_uint) -> *mut c_void {
    guard(std::ptr::null_mut(), || match enter(get_memory_data_slot) {
        // SAFETY: as above.
        Some((layer, _entered)) => unsafe { (layer.target)(id) },
        None => std::ptr::null_mut(),
    })
}

unsafe extern "C" fn wrap_get_memory_size(id: c_uint) -> usize {
    guard(0, || match enter(get_memory_size_slot) {
        // SAFETY: as above.
        Some((layer, _entered)) => unsafe { (layer.target)(id) },
        None => 0,
    })
}

unsafe extern "C" fn wrap_init() {
    guard((), || {
        let Some((layer, _entered)) = enter(init_slot) else {
            return;
        };
        // SAFETY: as above.
        unsafe { (layer.target)() };
        if layer.outermost {
            script::run_hook(Hook::Init);
        }
    })
}

unsafe extern "C" fn wrap_deinit() {
    guard((), || {
        let Some((layer, _entered)) = enter(deinit_slot) else {
            return;
        };
        if layer.outermost {
            script::unload_core();
        }
        // SAFETY: as above.
        unsafe { (layer.target)() };
    })
}

unsafe extern "C" fn wrap_run() {
    guard((), || {
        let Some((layer, _entered)) = enter(run_slot) else {
            return;
        };
        if layer.outermost {
            script::run_hook(Hook::RunBegin);
        }
        // SAFETY: as above.
        unsafe { (layer.target)() };
        if layer.outermost {
            script::run_hook(Hook::RunEnd);
        }
    })
}

unsafe extern "C" fn wrap_set_input_poll(cb: Option<InputPollFn>) {
    guard((), || {
        let Some((layer, _entered)) = enter(set_input_poll_slot) else {
            return;
        };
        if layer.outermost {
            with_shim(|shim| shim.core_mut().set_input_poll(cb));
        }
        // SAFETY: as above.
        unsafe { (layer.target)(cb) };
    })
}

unsafe extern "C" fn wrap_set_input_state(cb: Option<InputStateFn>) {
    guard((), || {
        let Some((layer, _entered)) = enter(set_input_state_slot) else {
            return;
        };
        if layer.outermost {
            with_shim(|shim| shim.core_mut().set_input_state(cb));
        }
        // SAFETY: as above.
        unsafe { (layer.target)(cb) };
    })
}

/// Environment callback the core sees in place of the frontend's.
unsafe extern "C" fn environment_trampoline(cmd: c_uint, data: *mut c_void) -> bool {
    guard(false, || {
        let Some(host) = with_shim(|shim| shim.core().host_environment()).flatten() else {
            return false;
        };

        if cmd == ENVIRONMENT_SET_PROC_ADDRESS_CALLBACK && !data.is_null() {
            // SAFETY: libretro defines the payload of this command.
            let published = unsafe { *data.cast::<GetProcAddressInterface>() };
            if let Some(lookup) = published.get_proc_address {
                with_shim(|shim| shim.core_mut().set_proc_address(Some(lookup)));
                let mut substitute = GetProcAddressInterface {
                    get_proc_address: Some(host_get_proc_address),
                };
                // SAFETY: frontend callback; `substitute` outlives the call.
                return unsafe { host(cmd, (&raw mut substitute).cast()) };
            }
        }

        trace!("environment command {cmd} forwarded");
        // SAFETY: frontend callback, arguments passed through unchanged.
        unsafe { host(cmd, data) }
    })
}

/// Proc-address lookup the frontend sees in place of the core's. With
/// negotiation switched off the core's own setter is handed out unchanged.
unsafe extern "C" fn host_get_proc_address(sym: *const c_char) -> Option<ProcAddressFn> {
    guard(None, || {
        if sym.is_null() {
            return None;
        }
        let (lookup, negotiating) =
            with_shim(|shim| (shim.core().proc_address(), shim.config().debugger))?;
        // SAFETY: the frontend passes a NUL-terminated symbol name.
        let name = unsafe { CStr::from_ptr(sym) };
        if negotiating
            && (name == hc::SET_DEBUGGER_SYMBOL || name == hc::SET_DEBUGGER_SYMBOL_LEGACY)
        {
            return Some(hc::set_debugger_as_proc(debugger::host_set_debugger));
        }
        let lookup = lookup?;
        // SAFETY: the core's own lookup, called with the frontend's argument.
        unsafe { lookup(sym) }
    })
}
