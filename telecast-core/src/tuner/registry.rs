//! Process-global tuner session registry.
//!
//! Freeing a slot sets it to `None` ("tombstone") rather than removing it,
//! so other sessions' indices stay stable — the index doubles as the
//! session's public identifier.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub(super) struct RegistrySlot {
    pub nwtv_id: u32,
    pub locked: bool,
    /// Shared with the `TunerSession` this slot was `insert`ed for, so
    /// harvesting the slot in `allocate_nwtv_id` is visible to that
    /// session's own `is_delegated()` without the registry holding a
    /// back-reference to the session itself.
    pub delegated: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct TunerRegistry {
    slots: Mutex<Vec<Option<RegistrySlot>>>,
}

impl TunerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step 1 of: take over the first unlocked live session's
    /// `nwtv_id`, marking its session delegated and tombstoning its
    /// slot, or mint a fresh id past the registry's current length.
    pub(super) fn allocate_nwtv_id(&self) -> u32 {
        let mut slots = self.slots.lock();
        if let Some(idx) = slots
            .iter()
            .position(|s| matches!(s, Some(slot) if !slot.locked))
        {
            let slot = slots[idx].take().expect("position() found Some");
            slot.delegated.store(true, Ordering::Release);
            slot.nwtv_id
        } else {
            500 + slots.len() as u32
        }
    }

    /// Registers a newly opened session, returning its registry index
    /// (used as the session's identifier for lock/unlock/close) and the
    /// delegation flag the session must check via `is_delegated()`.
    pub(super) fn insert(&self, nwtv_id: u32) -> (usize, Arc<AtomicBool>) {
        let mut slots = self.slots.lock();
        let delegated = Arc::new(AtomicBool::new(false));
        slots.push(Some(RegistrySlot { nwtv_id, locked: false, delegated: delegated.clone() }));
        (slots.len() - 1, delegated)
    }

    pub(super) fn set_locked(&self, index: usize, locked: bool) {
        let mut slots = self.slots.lock();
        if let Some(Some(slot)) = slots.get_mut(index) {
            slot.locked = locked;
        }
    }

    /// Tombstones a slot on `Close()` — the index is never reused.
    pub(super) fn tombstone(&self, index: usize) {
        let mut slots = self.slots.lock();
        if index < slots.len() {
            slots[index] = None;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
