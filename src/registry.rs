//! Handle-keyed record store.
//!
//! Every breakpoint event goes through [`HandleMap::get`], so lookups stay on
//! an `FxHashMap`. Insertion never overwrites: the first owner of a handle
//! keeps it until it is removed.

use std::hash::Hash;

use rustc_hash::FxHashMap;

/// Integer identifiers usable as registry keys. `INVALID` is never stored.
pub trait Handle: Copy + Eq + Hash + std::fmt::Debug {
    const INVALID: Self;

    fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Handle for u32 {
    const INVALID: Self = 0;
}

impl Handle for u64 {
    const INVALID: Self = 0;
}

#[derive(Debug)]
pub struct HandleMap<H: Handle, V> {
    entries: FxHashMap<H, V>,
}

impl<H: Handle, V> Default for HandleMap<H, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Handle, V> HandleMap<H, V> {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Insert `value` under `handle`.
    ///
    /// Returns `None` when the handle is the reserved invalid handle, is
    /// already present, or the table cannot grow.
    pub fn add(&mut self, handle: H, value: V) -> Option<&mut V> {
        if !handle.is_valid() || self.entries.contains_key(&handle) {
            return None;
        }
        self.entries.try_reserve(1).ok()?;
        Some(self.entries.entry(handle).or_insert(value))
    }

    pub fn get(&self, handle: H) -> Option<&V> {
        self.entries.get(&handle)
    }

    pub fn contains(&self, handle: H) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Remove `handle`, returning whether it was present.
    pub fn remove(&mut self, handle: H) -> bool {
        self.entries.remove(&handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = H> + '_ {
        self.entries.keys().copied()
    }

    /// Drop every entry, keeping the allocation for reuse.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (H, V)> + '_ {
        self.entries.drain()
    }
}
