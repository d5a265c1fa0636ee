//! Per-entry-point interception slots.
//!
//! A C entry point has no user-data argument, so the shim installs one fixed
//! wrapper per entry point and keeps what it wrapped in a [`Slot`]. Every
//! distinct pointer handed to `intercept` becomes a layer; a call through the
//! wrapper enters the newest layer, and if that layer calls back into the
//! wrapper the next older one is entered, down to the core's own function.
//!
//! Unloading the core detaches every slot. A detached slot forwards nothing
//! from the frontend and starts a new chain on the next `intercept`.

use log::debug;

use crate::abi::libretro::{
    GetMemoryDataFn, GetMemorySizeFn, RunFn, SetEnvironmentFn, SetInputPollFn, SetInputStateFn,
};

/// Function pointer types that can be installed in a [`Slot`].
pub trait EntryPoint: Copy {
    fn addr(self) -> usize;
}

macro_rules! entry_points {
    ($($ty:ty),* $(,)?) => {
        $(
            impl EntryPoint for $ty {
                fn addr(self) -> usize {
                    self as usize
                }
            }
        )*
    };
}

// `RunFn` also covers retro_init, retro_deinit and the input poll callback.
entry_points!(
    SetEnvironmentFn,
    GetMemoryDataFn,
    GetMemorySizeFn,
    RunFn,
    SetInputPollFn,
    SetInputStateFn,
);

/// The layer a wrapper call has to forward to.
#[derive(Debug, Clone, Copy)]
pub struct Layer<F> {
    pub target: F,
    /// True when this call came straight from the frontend; shim logic only
    /// runs here.
    pub outermost: bool,
}

#[derive(Debug)]
pub struct Slot<F> {
    layers: Vec<F>,
    depth: usize,
    detached: bool,
}

impl<F> Default for Slot<F> {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            depth: 0,
            detached: false,
        }
    }
}

impl<F: EntryPoint> Slot<F> {
    /// Record `original` beneath `wrapper` and return what the frontend
    /// should install.
    ///
    /// A null original installs nothing and stays null. Re-intercepting the
    /// wrapper itself keeps the existing chain.
    pub fn install(&mut self, original: Option<F>, wrapper: F) -> Option<F> {
        let original = original?;
        if self.detached && self.depth == 0 {
            debug!("slot reset for a new core ({} stale layers)", self.layers.len());
            self.layers.clear();
            self.detached = false;
        }
        if original.addr() == wrapper.addr() {
            debug!("wrapper at {:#x} intercepted again, chain unchanged", wrapper.addr());
        } else {
            self.layers.push(original);
            debug!("slot layer {} -> {:#x}", self.layers.len(), original.addr());
        }
        Some(wrapper)
    }

    /// Step one layer down. Returns `None` once every layer is in use, or
    /// for a fresh call into a detached slot.
    pub fn enter(&mut self) -> Option<Layer<F>> {
        if self.detached && self.depth == 0 {
            return None;
        }
        let index = self.layers.len().checked_sub(self.depth + 1)?;
        let layer = Layer {
            target: self.layers[index],
            outermost: self.depth == 0,
        };
        self.depth += 1;
        Some(layer)
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// The current core's own entry point, before any interception.
    pub fn original(&self) -> Option<F> {
        self.layers.first().copied().filter(|_| !self.detached)
    }

    pub fn is_installed(&self) -> bool {
        !self.detached && !self.layers.is_empty()
    }

    pub fn layers(&self) -> usize {
        self.layers.len()
    }

    /// The core behind these layers is gone. Calls already inside the chain
    /// finish normally.
    pub fn detach(&mut self) {
        self.detached = true;
    }
}

/// One slot per whitelisted core entry point.
#[derive(Debug, Default)]
pub struct Intercepts {
    pub set_environment: Slot<SetEnvironmentFn>,
    pub get_memory_data: Slot<GetMemoryDataFn>,
    pub get_memory_size: Slot<GetMemorySizeFn>,
    pub init: Slot<RunFn>,
    pub deinit: Slot<RunFn>,
    pub run: Slot<RunFn>,
    pub set_input_poll: Slot<SetInputPollFn>,
    pub set_input_state: Slot<SetInputStateFn>,
}

impl Intercepts {
    pub fn detach(&mut self) {
        self.set_environment.detach();
        self.get_memory_data.detach();
        self.get_memory_size.detach();
        self.init.detach();
        self.deinit.detach();
        self.run.detach();
        self.set_input_poll.detach();
        self.set_input_state.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Distinct bodies so the three functions keep distinct addresses.
    static TOUCHED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn wrapper() {
        TOUCHED.fetch_add(1, Ordering::Relaxed);
    }
    unsafe extern "C" fn core_run() {
        TOUCHED.fetch_add(10, Ordering::Relaxed);
    }
    unsafe extern "C" fn outer_hook() {
        TOUCHED.fetch_add(100, Ordering::Relaxed);
    }

    #[test]
    fn null_original_installs_nothing() {
        let mut slot: Slot<RunFn> = Slot::default();
        assert!(slot.install(None, wrapper).is_none());
        assert!(!slot.is_installed());
        assert!(slot.enter().is_none());
    }

    #[test]
    fn reintercepting_the_wrapper_keeps_the_chain() {
        let mut slot: Slot<RunFn> = Slot::default();
        let installed = slot.install(Some(core_run), wrapper).expect("installed");
        assert_eq!(installed.addr(), (wrapper as RunFn).addr());

        let again = slot.install(Some(installed), wrapper).expect("installed");
        assert_eq!(again.addr(), (wrapper as RunFn).addr());
        assert_eq!(slot.layers(), 1);

        let layer = slot.enter().expect("core layer");
        assert!(layer.outermost);
        assert_eq!(layer.target.addr(), (core_run as RunFn).addr());
        assert!(slot.enter().is_none());
        slot.leave();
    }

    #[test]
    fn reentry_walks_down_the_layers() {
        let mut slot: Slot<RunFn> = Slot::default();
        slot.install(Some(core_run), wrapper);
        slot.install(Some(outer_hook), wrapper);
        assert_eq!(slot.original().map(EntryPoint::addr), Some((core_run as RunFn).addr()));

        let first = slot.enter().expect("newest layer");
        assert!(first.outermost);
        assert_eq!(first.target.addr(), (outer_hook as RunFn).addr());

        let second = slot.enter().expect("older layer");
        assert!(!second.outermost);
        assert_eq!(second.target.addr(), (core_run as RunFn).addr());

        slot.leave();
        slot.leave();
        let fresh = slot.enter().expect("depth restored");
        assert!(fresh.outermost);
        slot.leave();
    }

    #[test]
    fn detach_hides_the_old_core_until_reinstalled() {
        let mut intercepts = Intercepts::default();
        intercepts.run.install(Some(core_run), wrapper);
        intercepts.init.install(Some(core_run), wrapper);
        intercepts.detach();
        assert!(!intercepts.run.is_installed());
        assert!(!intercepts.init.is_installed());
        assert!(intercepts.run.original().is_none());
        assert!(intercepts.run.enter().is_none());

        intercepts.run.install(Some(outer_hook), wrapper);
        assert_eq!(intercepts.run.layers(), 1);
        assert_eq!(
            intercepts.run.original().map(EntryPoint::addr),
            Some((outer_hook as RunFn).addr())
        );
        let layer = intercepts.run.enter().expect("new core layer");
        assert!(layer.outermost);
        assert_eq!(layer.target.addr(), (outer_hook as RunFn).addr());
        intercepts.run.leave();
    }

    #[test]
    fn detach_during_a_call_lets_the_chain_finish() {
        let mut slot: Slot<RunFn> = Slot::default();
        slot.install(Some(core_run), wrapper);
        slot.install(Some(outer_hook), wrapper);

        let outer = slot.enter().expect("newest layer");
        assert!(outer.outermost);
        slot.detach();
        let inner = slot.enter().expect("older layer still reachable");
        assert_eq!(inner.target.addr(), (core_run as RunFn).addr());
        slot.leave();
        slot.leave();

        assert!(slot.enter().is_none());
    }
}
