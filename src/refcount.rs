use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};
use heapless::{LinearMap, Vec};

use crate::queue::BindingQueue;
use crate::types::{BindingAction, KeyBinding};

/// Collapses overlapping presses of the same binding into one press/release pair.
///
/// Several encoders (or an encoder and a physical key) can hold the same binding at
/// once; only the first press and the last release reach the inner queue.
pub struct RefcountQueue<'a, M: RawMutex, const N: usize> {
    inner: &'a dyn BindingQueue,
    table: Mutex<M, RefCell<RefcountTable<N>>>,
}

struct RefcountTable<const N: usize> {
    counts: LinearMap<KeyBinding, u8, N>,
    /// Presses forwarded while `counts` was full; their releases must get through.
    untracked: Vec<KeyBinding, N>,
    /// Set once `untracked` overflowed too; unknown releases are then forwarded
    /// until the table drains.
    saturated: bool,
}

impl<const N: usize> RefcountTable<N> {
    const fn new() -> Self {
        Self {
            counts: LinearMap::new(),
            untracked: Vec::new(),
            saturated: false,
        }
    }

    fn on_press(&mut self, binding: KeyBinding) -> bool {
        if let Some(count) = self.counts.get_mut(&binding) {
            *count = count.saturating_add(1);
            return false;
        }
        if self.counts.insert(binding, 1).is_ok() {
            return true;
        }

        log::warn!("refcount table full, press passes untracked");
        if !self.untracked.contains(&binding) && self.untracked.push(binding).is_err() {
            self.saturated = true;
        }
        true
    }

    fn on_release(&mut self, binding: KeyBinding) -> bool {
        if let Some(count) = self.counts.get_mut(&binding) {
            *count -= 1;
            if *count > 0 {
                return false;
            }
            self.counts.remove(&binding);
            self.settle();
            return true;
        }

        if let Some(index) = self.untracked.iter().position(|held| *held == binding) {
            self.untracked.swap_remove(index);
            self.settle();
            return true;
        }

        // Stray release, unless an untracked press may have been lost.
        self.saturated
    }

    fn settle(&mut self) {
        if self.counts.is_empty() && self.untracked.is_empty() {
            self.saturated = false;
        }
    }
}

impl<'a, M: RawMutex, const N: usize> RefcountQueue<'a, M, N> {
    pub const fn new(inner: &'a dyn BindingQueue) -> Self {
        Self {
            inner,
            table: Mutex::new(RefCell::new(RefcountTable::new())),
        }
    }

    pub fn count(&self, binding: &KeyBinding) -> u8 {
        self.table
            .lock(|table| table.borrow().counts.get(binding).copied().unwrap_or(0))
    }
}

impl<M, const N: usize> BindingQueue for RefcountQueue<'_, M, N>
where
    M: RawMutex + Sync,
{
    fn enqueue(&self, action: BindingAction) {
        self.table.lock(|table| {
            let mut table = table.borrow_mut();
            let forward = if action.pressed {
                table.on_press(action.binding)
            } else {
                table.on_release(action.binding)
            };
            if forward {
                self.inner.enqueue(action);
            }
        });
    }
}
