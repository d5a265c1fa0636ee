//! State recorded about the loaded core: its intercepted entry points, the
//! callbacks the frontend handed it, and the debugger negotiation.
//!
//! Negotiation moves `Unbound -> Negotiating -> Bound`. A failed attempt drops
//! back to `Unbound` and is retried on the next access. The handshake itself
//! calls into the core, so it is split into [`CoreBinding::begin_negotiation`]
//! and [`CoreBinding::finish_negotiation`] around [`handshake`], letting the
//! caller release any lock it holds in between.

use std::ffi::{c_uint, c_void};

use log::{debug, info};

use crate::abi::hc::{self, DebuggerIf, HandleEventFn, SetDebuggerFn};
use crate::abi::libretro::{
    EnvironmentFn, GetMemoryDataFn, GetMemorySizeFn, GetProcAddressFn, InputPollFn, InputStateFn,
};
use crate::hooks::Intercepts;

/// The frontend's own debugger attachment, captured when it resolves
/// `hc_set_debugger` through the shim.
#[derive(Debug, Clone, Copy)]
pub struct HostDebugger {
    pub handle_event: Option<HandleEventFn>,
    pub user_data: *mut c_void,
}

// SAFETY: `user_data` is opaque to the shim and only handed back to the
// frontend's own callback on the thread delivering events.
unsafe impl Send for HostDebugger {}

/// Heap-pinned interface handed to the core's `hc_set_debugger`.
#[derive(Debug)]
pub struct BoundDebugger(Box<DebuggerIf>);

// SAFETY: the interface is written once during the handshake and read-only
// afterwards; its raw pointers belong to the core and the frontend.
unsafe impl Send for BoundDebugger {}

impl BoundDebugger {
    pub fn as_ptr(&mut self) -> *mut DebuggerIf {
        &mut *self.0
    }
}

#[derive(Debug, Default)]
pub enum Negotiation {
    #[default]
    Unbound,
    Negotiating,
    Bound(BoundDebugger),
}

/// What a caller of [`CoreBinding::begin_negotiation`] has to do next.
#[derive(Debug)]
pub enum NegotiationStep {
    Ready(*mut DebuggerIf),
    /// Another caller is mid-handshake.
    Busy,
    /// Debugging is disabled or the core has no proc-address lookup.
    Unavailable,
    Resolve(HandshakeRequest),
}

#[derive(Debug, Clone, Copy)]
pub struct HandshakeRequest {
    pub get_proc_address: GetProcAddressFn,
    pub user_data: *mut c_void,
}

#[derive(Debug, Default)]
pub struct CoreBinding {
    intercepts: Intercepts,
    host_environment: Option<EnvironmentFn>,
    proc_address: Option<GetProcAddressFn>,
    input_poll: Option<InputPollFn>,
    input_state: Option<InputStateFn>,
    host_debugger: Option<HostDebugger>,
    debugger: Negotiation,
}

// SAFETY: the only non-Send members are the raw pointers inside
// `host_debugger` and `debugger`, covered above.
unsafe impl Send for CoreBinding {}

impl CoreBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intercepts_mut(&mut self) -> &mut Intercepts {
        &mut self.intercepts
    }

    pub fn host_environment(&self) -> Option<EnvironmentFn> {
        self.host_environment
    }

    pub fn set_host_environment(&mut self, cb: Option<EnvironmentFn>) {
        self.host_environment = cb;
    }

    pub fn proc_address(&self) -> Option<GetProcAddressFn> {
        self.proc_address
    }

    pub fn set_proc_address(&mut self, lookup: Option<GetProcAddressFn>) {
        let state = if lookup.is_some() { "recorded" } else { "cleared" };
        debug!("core proc-address lookup {state}");
        self.proc_address = lookup;
    }

    pub fn set_input_poll(&mut self, cb: Option<InputPollFn>) {
        self.input_poll = cb;
    }

    pub fn set_input_state(&mut self, cb: Option<InputStateFn>) {
        self.input_state = cb;
    }

    pub fn host_debugger(&self) -> Option<HostDebugger> {
        self.host_debugger
    }

    pub fn attach_host(&mut self, host: HostDebugger) {
        info!("frontend attached its own debugger");
        self.host_debugger = Some(host);
    }

    pub fn host_handler(&self) -> Option<HandleEventFn> {
        self.host_debugger.and_then(|host| host.handle_event)
    }

    pub fn negotiation(&self) -> &Negotiation {
        &self.debugger
    }

    /// The negotiated interface, if the handshake has completed.
    pub fn debugger(&mut self) -> Option<*mut DebuggerIf> {
        match &mut self.debugger {
            Negotiation::Bound(bound) => Some(bound.as_ptr()),
            _ => None,
        }
    }

    pub fn begin_negotiation(&mut self, enabled: bool) -> NegotiationStep {
        match &mut self.debugger {
            Negotiation::Bound(bound) => NegotiationStep::Ready(bound.as_ptr()),
            Negotiation::Negotiating => NegotiationStep::Busy,
            Negotiation::Unbound => {
                let Some(get_proc_address) = self.proc_address.filter(|_| enabled) else {
                    return NegotiationStep::Unavailable;
                };
                self.debugger = Negotiation::Negotiating;
                NegotiationStep::Resolve(HandshakeRequest {
                    get_proc_address,
                    user_data: self
                        .host_debugger
                        .map_or(std::ptr::null_mut(), |host| host.user_data),
                })
            }
        }
    }

    /// Record the result of [`handshake`]. A result arriving after the
    /// binding was reset is discarded.
    pub fn finish_negotiation(
        &mut self,
        result: Option<Box<DebuggerIf>>,
    ) -> Option<*mut DebuggerIf> {
        if !matches!(self.debugger, Negotiation::Negotiating) {
            return None;
        }
        match result {
            Some(debugger) => {
                info!("debugger negotiated with core");
                let mut bound = BoundDebugger(debugger);
                let ptr = bound.as_ptr();
                self.debugger = Negotiation::Bound(bound);
                Some(ptr)
            }
            None => {
                debug!("core exposes no debugger");
                self.debugger = Negotiation::Unbound;
                None
            }
        }
    }

    /// The core is being unloaded. Its entry points and proc-address lookup
    /// stop being reachable; the frontend's callbacks and the negotiated
    /// debugger stay for the next core.
    pub fn unload_core(&mut self) {
        self.intercepts.detach();
        self.proc_address = None;
    }

    /// Tear the binding down. A negotiated interface is leaked rather than
    /// freed: the core keeps the pointer it was handed.
    pub fn retire(self) {
        if let Negotiation::Bound(BoundDebugger(debugger)) = self.debugger {
            let _ = Box::leak(debugger);
        }
    }

    pub fn view(&self) -> CoreView {
        CoreView {
            get_memory_data: self.intercepts.get_memory_data.original(),
            get_memory_size: self.intercepts.get_memory_size.original(),
            input_poll: self.input_poll,
            input_state: self.input_state,
        }
    }
}

/// Look up the core's set-debugger entry point, falling back to the legacy
/// spelling.
pub fn resolve_set_debugger(get_proc_address: GetProcAddressFn) -> Option<SetDebuggerFn> {
    [hc::SET_DEBUGGER_SYMBOL, hc::SET_DEBUGGER_SYMBOL_LEGACY]
        .into_iter()
        .find_map(|symbol| {
            // SAFETY: the lookup was published by the core for exactly this use.
            let resolved = unsafe { get_proc_address(symbol.as_ptr()) }?;
            debug!("resolved {:?}", symbol);
            // SAFETY: the symbol names the set-debugger entry point.
            Some(unsafe { hc::set_debugger_from_proc(resolved) })
        })
}

/// Resolve the core's setter and hand it a freshly initialised interface.
/// Calls into the core.
pub fn handshake(
    request: HandshakeRequest,
    handle_event: HandleEventFn,
) -> Option<Box<DebuggerIf>> {
    let set_debugger = resolve_set_debugger(request.get_proc_address)?;
    let mut debugger = Box::new(DebuggerIf::frontend(handle_event, request.user_data));
    // SAFETY: the boxed interface outlives the call and keeps its address
    // once moved into the binding.
    unsafe { set_debugger(&mut *debugger) };
    Some(debugger)
}

/// Copy of the core and frontend functions scripts are allowed to call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreView {
    pub get_memory_data: Option<GetMemoryDataFn>,
    pub get_memory_size: Option<GetMemorySizeFn>,
    pub input_poll: Option<InputPollFn>,
    pub input_state: Option<InputStateFn>,
}

impl CoreView {
    pub fn memory_size(&self, region: c_uint) -> usize {
        // SAFETY: core entry point recorded through interception.
        self.get_memory_size.map_or(0, |f| unsafe { f(region) })
    }

    fn memory(&self, region: c_uint) -> Option<(*mut u8, usize)> {
        let data = self.get_memory_data?;
        // SAFETY: core entry point recorded through interception.
        let ptr = unsafe { data(region) }.cast::<u8>();
        let size = self.memory_size(region);
        (!ptr.is_null() && size > 0).then_some((ptr, size))
    }

    pub fn read_byte(&self, region: c_uint, offset: usize) -> Option<u8> {
        let (ptr, size) = self.memory(region)?;
        // SAFETY: the core guarantees `size` readable bytes behind `ptr`.
        (offset < size).then(|| unsafe { ptr.add(offset).read() })
    }

    pub fn write_byte(&self, region: c_uint, offset: usize, value: u8) -> bool {
        match self.memory(region) {
            Some((ptr, size)) if offset < size => {
                // SAFETY: as above; libretro memory regions are writable.
                unsafe { ptr.add(offset).write(value) };
                true
            }
            _ => false,
        }
    }

    pub fn poll_input(&self) -> bool {
        match self.input_poll {
            Some(poll) => {
                // SAFETY: frontend callback recorded from retro_set_input_poll.
                unsafe { poll() };
                true
            }
            None => false,
        }
    }

    pub fn input_state(&self, port: c_uint, device: c_uint, index: c_uint, id: c_uint) -> i16 {
        // SAFETY: frontend callback recorded from retro_set_input_state.
        self.input_state
            .map_or(0, |f| unsafe { f(port, device, index, id) })
    }
}
