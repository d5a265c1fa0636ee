//! The shim's owned context: configuration, the core binding and the
//! breakpoint registry.
//!
//! A [`Shim`] is a plain value. The C entry points keep one in a process-wide
//! slot; tests build as many as they like.

use std::ffi::c_void;

use log::{debug, info, warn};

use crate::abi::hc::{DebuggerIf, Event, HandleEventFn, SubscriptionId};
use crate::config::ShimConfig;
use crate::binding::{self, CoreBinding, CoreView, HostDebugger, NegotiationStep};
use crate::error::ShimError;
use crate::hooks::{BreakpointCallback, BreakpointUserdata, Breakpoints, Intercepts, Route};

/// A routed event together with the user data to hand a host handler.
#[derive(Debug, Clone, Copy)]
pub struct Dispatch {
    pub route: Route,
    pub user_data: *mut c_void,
}

impl Dispatch {
    /// # Safety
    ///
    /// `event` must be the payload the core delivered for `id`.
    pub unsafe fn deliver(self, id: SubscriptionId, event: *const Event) {
        unsafe { self.route.deliver(self.user_data, id, event) }
    }
}

pub struct Shim {
    config: ShimConfig,
    core: CoreBinding,
    breakpoints: Breakpoints,
    /// Installed into the core's debugger interface during negotiation.
    event_handler: HandleEventFn,
}

impl Shim {
    pub fn new(config: ShimConfig, event_handler: HandleEventFn) -> Self {
        let negotiation = if config.debugger { "on" } else { "off" };
        info!("shim initialised (debugger negotiation {negotiation})");
        Self {
            config,
            core: CoreBinding::new(),
            breakpoints: Breakpoints::new(),
            event_handler,
        }
    }

    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    pub fn core(&self) -> &CoreBinding {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut CoreBinding {
        &mut self.core
    }

    pub fn intercepts_mut(&mut self) -> &mut Intercepts {
        self.core.intercepts_mut()
    }

    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    pub fn view(&self) -> CoreView {
        self.core.view()
    }

    pub fn attach_host(&mut self, host: HostDebugger) {
        self.core.attach_host(host);
    }

    pub fn begin_negotiation(&mut self) -> NegotiationStep {
        self.core.begin_negotiation(self.config.debugger)
    }

    pub fn finish_negotiation(
        &mut self,
        result: Option<Box<DebuggerIf>>,
    ) -> Option<*mut DebuggerIf> {
        self.core.finish_negotiation(result)
    }

    /// Negotiate in one go. The handshake calls into the core while `self`
    /// is borrowed, so shared instances go through the split steps instead.
    pub fn negotiate(&mut self) -> Option<*mut DebuggerIf> {
        match self.begin_negotiation() {
            NegotiationStep::Ready(debugger) => Some(debugger),
            NegotiationStep::Busy | NegotiationStep::Unavailable => None,
            NegotiationStep::Resolve(request) => {
                let result = binding::handshake(request, self.event_handler);
                self.finish_negotiation(result)
            }
        }
    }

    pub fn debugger(&mut self) -> Option<*mut DebuggerIf> {
        self.core.debugger()
    }

    pub fn register_breakpoint(
        &mut self,
        userdata: BreakpointUserdata,
        id: SubscriptionId,
        callback: Option<BreakpointCallback>,
    ) -> Result<(), ShimError> {
        if callback.is_none() {
            return Err(ShimError::MissingCallback);
        }
        if self.core.debugger().is_none() {
            return Err(ShimError::NoDebugger);
        }
        self.breakpoints.register(userdata, id, callback)
    }

    pub fn unregister_breakpoint(&mut self, id: SubscriptionId) -> Result<(), ShimError> {
        if self.core.debugger().is_none() {
            return Err(ShimError::NoDebugger);
        }
        self.breakpoints.unregister(id)
    }

    /// Decide who handles an event. A host that attached its own debugger
    /// gets back the user data it supplied.
    pub fn route_event(&self, user_data: *mut c_void, id: SubscriptionId) -> Dispatch {
        let route = self.breakpoints.route(id, self.core.host_handler());
        let user_data = match (route, self.core.host_debugger()) {
            (Route::Host(_), Some(host)) => host.user_data,
            _ => user_data,
        };
        debug!("breakpoint {id} routed to {route:?}");
        Dispatch { route, user_data }
    }

    /// The core is going away: registrations and intercepted entry points
    /// die with it, negotiation stays.
    pub fn unload_core(&mut self) {
        self.breakpoints.clear();
        self.core.unload_core();
        debug!("core unloaded");
    }

    /// Consume the shim at process-wide reset.
    pub fn retire(self) {
        if !self.breakpoints.is_empty() {
            warn!("{} breakpoint registrations dropped at reset", self.breakpoints.len());
        }
        self.core.retire();
    }
}
