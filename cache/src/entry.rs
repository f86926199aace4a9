use crate::task::timer::TimerId;

use std::sync::{Arc, Weak};
use std::time::Duration;

use generational_arena::Index;

/// How the cache currently holds an entry's value.
#[derive(Debug)]
pub(crate) enum Slot<V> {
  /// The cache pins the value.
  Strong(Arc<V>),
  /// The value lives only as long as someone outside the cache holds it.
  Weak(Weak<V>),
}

/// A container for a value in the cache, holding all necessary metadata.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  slot: Slot<V>,
  /// Capability of the insertion that created this entry. Timers and
  /// reclamation records carrying another stamp are stale.
  pub(crate) stamp: u64,
  /// Position in the store's access-ordered list.
  pub(crate) node: Index,
  pub(crate) expire_timer: Option<TimerId>,
  pub(crate) demote_timer: Option<TimerId>,
}

impl<V> CacheEntry<V> {
  pub(crate) fn new(value: Arc<V>, stamp: u64, node: Index) -> Self {
    Self {
      slot: Slot::Strong(value),
      stamp,
      node,
      expire_timer: None,
      demote_timer: None,
    }
  }

  /// Returns the value if it is still alive.
  #[inline]
  pub(crate) fn value(&self) -> Option<Arc<V>> {
    match &self.slot {
      Slot::Strong(value) => Some(value.clone()),
      Slot::Weak(weak) => weak.upgrade(),
    }
  }

  #[inline]
  pub(crate) fn is_weak(&self) -> bool {
    matches!(self.slot, Slot::Weak(_))
  }

  /// True when the entry holds exactly this allocation.
  pub(crate) fn holds(&self, value: &Arc<V>) -> bool {
    match &self.slot {
      Slot::Strong(current) => Arc::ptr_eq(current, value),
      Slot::Weak(weak) => std::ptr::eq(weak.as_ptr(), Arc::as_ptr(value)),
    }
  }

  /// True when a weakly held value has been dropped by everyone else.
  #[inline]
  pub(crate) fn is_reclaimed(&self) -> bool {
    match &self.slot {
      Slot::Strong(_) => false,
      Slot::Weak(weak) => weak.strong_count() == 0,
    }
  }

  /// Checks the hard deadline against `now`.
  #[inline]
  pub(crate) fn is_expired(&self, now: Duration) -> bool {
    self
      .expire_timer
      .map_or(false, |timer| timer.deadline() <= now)
  }

  /// Stops pinning the value. Returns `false` if it was already weak.
  pub(crate) fn demote(&mut self) -> bool {
    match &self.slot {
      Slot::Strong(value) => {
        self.slot = Slot::Weak(Arc::downgrade(value));
        true
      }
      Slot::Weak(_) => false,
    }
  }

  /// Pins a value that was found still alive behind a weak slot.
  pub(crate) fn promote(&mut self, value: Arc<V>) {
    self.slot = Slot::Strong(value);
  }
}
