//! Debugger negotiation and breakpoint entry points.

use std::ffi::{c_int, c_void};

use log::{debug, warn};

use super::{guard, with_shim};
use crate::abi::hc::{DebuggerIf, Event, SubscriptionId};
use crate::binding::{self, HostDebugger, NegotiationStep};
use crate::error::ShimError;
use crate::hooks::{BreakpointCallback, BreakpointUserdata};

const OK: c_int = 0;
const FAILED: c_int = 1;

/// Bring the debugger up if it is not yet. The core is called without any
/// shim lock held.
pub(crate) fn negotiate() -> Option<*mut DebuggerIf> {
    match with_shim(|shim| shim.begin_negotiation())? {
        NegotiationStep::Ready(debugger) => Some(debugger),
        NegotiationStep::Busy | NegotiationStep::Unavailable => None,
        NegotiationStep::Resolve(request) => {
            let result = binding::handshake(request, on_breakpoint_event);
            with_shim(|shim| shim.finish_negotiation(result)).flatten()
        }
    }
}

/// Event handler installed in the core's debugger interface.
pub(crate) unsafe extern "C" fn on_breakpoint_event(
    user_data: *mut c_void,
    id: SubscriptionId,
    event: *const Event,
) {
    guard((), || {
        if let Some(dispatch) = with_shim(|shim| shim.route_event(user_data, id)) {
            // SAFETY: arguments come straight from the core.
            unsafe { dispatch.deliver(id, event) };
        }
    })
}

/// `hc_set_debugger` as the frontend sees it through the substitute lookup.
pub(crate) unsafe extern "C" fn host_set_debugger(debugger: *mut DebuggerIf) {
    guard((), || {
        if debugger.is_null() {
            return;
        }
        // SAFETY: the frontend passes its own interface, valid for this call.
        let host = unsafe { &mut *debugger };
        with_shim(|shim| {
            shim.attach_host(HostDebugger {
                handle_event: host.v1.handle_event,
                user_data: host.user_data,
            })
        });
        match negotiate() {
            Some(bound) => {
                // SAFETY: the negotiated interface lives until process reset.
                let bound = unsafe { &*bound };
                host.core_api_version = bound.core_api_version;
                host.core = bound.core;
            }
            None => debug!("frontend asked for a debugger the core does not provide"),
        }
    })
}

fn status(result: Result<(), ShimError>) -> c_int {
    match result {
        Ok(()) => OK,
        Err(err) => {
            warn!("{err}");
            FAILED
        }
    }
}

/// Claim `id` for a script. Returns 0 on success, 1 on failure.
///
/// # Safety
///
/// `userdata` must be null or point to a readable `BreakpointUserdata`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn retro_script_hc_register_breakpoint(
    userdata: *const BreakpointUserdata,
    id: SubscriptionId,
    callback: Option<BreakpointCallback>,
) -> c_int {
    guard(FAILED, || {
        if callback.is_none() {
            return status(Err(ShimError::MissingCallback));
        }
        if negotiate().is_none() {
            return status(Err(ShimError::NoDebugger));
        }
        // SAFETY: checked non-null, caller guarantees it is readable.
        let userdata = unsafe { userdata.as_ref() }.copied().unwrap_or_default();
        let result = with_shim(|shim| shim.register_breakpoint(userdata, id, callback));
        status(result.unwrap_or(Err(ShimError::NotInitialized)))
    })
}

/// Release `id`. Returns 0 on success, 1 on failure.
#[unsafe(no_mangle)]
pub extern "C" fn retro_script_hc_unregister_breakpoint(id: SubscriptionId) -> c_int {
    guard(FAILED, || {
        if negotiate().is_none() {
            return status(Err(ShimError::NoDebugger));
        }
        let result = with_shim(|shim| shim.unregister_breakpoint(id));
        status(result.unwrap_or(Err(ShimError::NotInitialized)))
    })
}

/// The negotiated debugger interface, or null when the core has none.
#[unsafe(no_mangle)]
pub extern "C" fn retro_script_hc_get_debugger() -> *mut DebuggerIf {
    guard(std::ptr::null_mut(), || negotiate().unwrap_or(std::ptr::null_mut()))
}
