//! Breakpoint ownership and event routing.
//!
//! A subscription handle belongs to at most one script. Events for owned
//! handles go to the owner only; everything else is forwarded to the
//! frontend's own handler, or dropped when it has none.

use std::ffi::c_void;

use log::{debug, trace};

use crate::abi::hc::{Event, HandleEventFn, SubscriptionId};
use crate::error::ShimError;
use crate::registry::{Handle, HandleMap};
use crate::script::ScriptId;

/// Opaque context copied in at registration and passed back on every event.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BreakpointUserdata {
    pub script_id: ScriptId,
    pub data: *mut c_void,
}

impl Default for BreakpointUserdata {
    fn default() -> Self {
        Self {
            script_id: 0,
            data: std::ptr::null_mut(),
        }
    }
}

pub type BreakpointCallback =
    unsafe extern "C" fn(userdata: BreakpointUserdata, id: SubscriptionId, event: *const Event);

#[derive(Debug, Clone, Copy)]
pub struct BreakpointEntry {
    pub userdata: BreakpointUserdata,
    pub callback: BreakpointCallback,
}

// SAFETY: `userdata.data` is never dereferenced by the shim, only passed back
// to the callback that supplied it.
unsafe impl Send for BreakpointEntry {}

/// Where one event goes.
#[derive(Debug, Clone, Copy)]
pub enum Route {
    Script(BreakpointEntry),
    Host(HandleEventFn),
    Drop,
}

impl Route {
    /// Invoke the chosen handler.
    ///
    /// # Safety
    ///
    /// `user_data` and `event` must be the values the core passed to the
    /// shim's event handler.
    pub unsafe fn deliver(self, user_data: *mut c_void, id: SubscriptionId, event: *const Event) {
        match self {
            Route::Script(entry) => unsafe { (entry.callback)(entry.userdata, id, event) },
            Route::Host(handle_event) => unsafe { handle_event(user_data, id, event) },
            Route::Drop => trace!("breakpoint {id} has no handler, dropped"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Breakpoints {
    entries: HandleMap<SubscriptionId, BreakpointEntry>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        userdata: BreakpointUserdata,
        id: SubscriptionId,
        callback: Option<BreakpointCallback>,
    ) -> Result<(), ShimError> {
        let callback = callback.ok_or(ShimError::MissingCallback)?;
        if !id.is_valid() {
            return Err(ShimError::InvalidHandle);
        }
        if self.entries.contains(id) {
            return Err(ShimError::DuplicateHandle(id));
        }
        self.entries
            .add(id, BreakpointEntry { userdata, callback })
            .ok_or(ShimError::OutOfMemory)?;
        debug!("breakpoint {id} claimed by script {}", userdata.script_id);
        Ok(())
    }

    pub fn unregister(&mut self, id: SubscriptionId) -> Result<(), ShimError> {
        if self.entries.remove(id) {
            debug!("breakpoint {id} released");
            Ok(())
        } else {
            Err(ShimError::UnknownHandle(id))
        }
    }

    pub fn route(&self, id: SubscriptionId, host: Option<HandleEventFn>) -> Route {
        match (self.entries.get(id), host) {
            (Some(entry), _) => Route::Script(*entry),
            (None, Some(handle_event)) => Route::Host(handle_event),
            (None, None) => Route::Drop,
        }
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!("dropping {} breakpoint registrations", self.entries.len());
        }
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    unsafe extern "C" fn count_script(
        userdata: BreakpointUserdata,
        _: SubscriptionId,
        _: *const Event,
    ) {
        let counter = unsafe { &*(userdata.data as *const AtomicUsize) };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    unsafe extern "C" fn count_host(user_data: *mut c_void, _: SubscriptionId, _: *const Event) {
        let counter = unsafe { &*(user_data as *const AtomicUsize) };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn userdata(counter: &AtomicUsize) -> BreakpointUserdata {
        BreakpointUserdata {
            script_id: 1,
            data: counter as *const AtomicUsize as *mut c_void,
        }
    }

    #[test]
    fn owned_handles_never_reach_the_host() {
        let script_hits = AtomicUsize::new(0);
        let host_hits = AtomicUsize::new(0);
        let host_ud = &host_hits as *const AtomicUsize as *mut c_void;

        let mut breakpoints = Breakpoints::new();
        breakpoints
            .register(userdata(&script_hits), 42, Some(count_script))
            .expect("fresh handle");

        unsafe {
            breakpoints.route(42, Some(count_host)).deliver(host_ud, 42, std::ptr::null());
            breakpoints.route(43, Some(count_host)).deliver(host_ud, 43, std::ptr::null());
        }
        assert_eq!(script_hits.load(Ordering::SeqCst), 1);
        assert_eq!(host_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unowned_without_host_is_dropped() {
        let breakpoints = Breakpoints::new();
        assert!(matches!(breakpoints.route(9, None), Route::Drop));
    }

    #[test]
    fn missing_callback_leaves_state_unchanged() {
        let counter = AtomicUsize::new(0);
        let mut breakpoints = Breakpoints::new();
        let err = breakpoints.register(userdata(&counter), 5, None).unwrap_err();
        assert!(matches!(err, ShimError::MissingCallback));
        assert!(!breakpoints.contains(5));

        breakpoints.register(userdata(&counter), 5, Some(count_script)).expect("register");
        let err = breakpoints.register(userdata(&counter), 5, None).unwrap_err();
        assert!(matches!(err, ShimError::MissingCallback));
        assert!(breakpoints.contains(5));
        assert_eq!(breakpoints.len(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let first = AtomicUsize::new(0);
        let second = AtomicUsize::new(0);
        let mut breakpoints = Breakpoints::new();
        breakpoints.register(userdata(&first), 8, Some(count_script)).expect("register");
        let err = breakpoints.register(userdata(&second), 8, Some(count_script)).unwrap_err();
        assert!(matches!(err, ShimError::DuplicateHandle(8)));

        unsafe { breakpoints.route(8, None).deliver(std::ptr::null_mut(), 8, std::ptr::null()) };
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reserved_handle_is_rejected() {
        let counter = AtomicUsize::new(0);
        let mut breakpoints = Breakpoints::new();
        let err = breakpoints.register(userdata(&counter), 0, Some(count_script)).unwrap_err();
        assert!(matches!(err, ShimError::InvalidHandle));
    }

    #[test]
    fn unregister_unknown_fails() {
        let mut breakpoints = Breakpoints::new();
        assert!(matches!(breakpoints.unregister(3), Err(ShimError::UnknownHandle(3))));
        assert!(breakpoints.is_empty());
    }
}
