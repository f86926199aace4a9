//! The admission path and the two expiry timers.
//!
//! Every write into the store goes through [`Inner::admit_many`], which
//! replaces or creates entries, schedules their hard (max age) and soft (min
//! age) deadlines, and trims the store back to capacity once per call. Reads
//! go through [`Inner::lookup`], which applies the access-time refresh
//! policy and lazily drops entries that expired or were reclaimed.

use crate::coordinator::group::Closed;
use crate::entry::CacheEntry;
use crate::listener::EvictionReason;
use crate::shared::Inner;
use crate::store::Put;
use crate::task::timer::{Timer, TimerKind};

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

/// One entry that left the store, reported after the lock is released.
pub(crate) struct Eviction<K, V> {
  pub(crate) key: K,
  pub(crate) value: Option<Arc<V>>,
  pub(crate) reason: EvictionReason,
}

/// Side effects collected while the cache lock is held.
pub(crate) struct Sweep<K, V> {
  pub(crate) evicted: Vec<Eviction<K, V>>,
  pub(crate) inserted: u64,
  pub(crate) demoted: u64,
}

impl<K, V> Sweep<K, V> {
  pub(crate) fn new() -> Self {
    Self {
      evicted: Vec::new(),
      inserted: 0,
      demoted: 0,
    }
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.evicted.is_empty() && self.inserted == 0 && self.demoted == 0
  }
}

impl<K, V, H> Inner<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  fn next_stamp(&mut self) -> u64 {
    self.next_stamp += 1;
    self.next_stamp
  }

  /// Reads a value, refreshing its access position and, depending on the
  /// settings, its deadlines. Expired or reclaimed entries are removed and
  /// reported as absent.
  pub(crate) fn lookup<Q>(&mut self, key: &Q, now: Duration, sweep: &mut Sweep<K, V>) -> Option<Arc<V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.fire_due(now, sweep);
    let entry = self.store.entry(key)?;

    if entry.is_expired(now) {
      self.remove(key, EvictionReason::Expired, sweep);
      return None;
    }

    let value = match entry.value() {
      Some(value) => value,
      None => {
        self.remove(key, EvictionReason::Reclaimed, sweep);
        return None;
      }
    };

    self.store.touch(key);
    let settings = self.settings;

    if let (true, Some(max_age)) = (settings.retime_on_access, settings.max_age) {
      self.reschedule(key, TimerKind::Expire, now.checked_add(max_age));
    }

    if let (true, Some(min_age)) = (settings.relive_on_access, settings.min_age) {
      if let Some(entry) = self.store.entry_mut(key) {
        if entry.is_weak() {
          entry.promote(value.clone());
          self.demoted.remove(key);
        }
      }
      self.reschedule(key, TimerKind::Demote, now.checked_add(min_age));
    }

    Some(value)
  }

  /// Reads a value without refreshing anything or removing dead entries.
  pub(crate) fn peek<Q>(&self, key: &Q, now: Duration) -> Option<Arc<V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let entry = self.store.entry(key)?;
    if entry.is_expired(now) {
      return None;
    }
    entry.value()
  }

  // Moves one of the entry's deadlines, cancelling the previous timer. A
  // deadline past the end of the clock leaves the entry without one.
  fn reschedule<Q>(&mut self, key: &Q, kind: TimerKind, deadline: Option<Duration>)
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let Some(owned) = self.store.owned_key(key) else {
      return;
    };
    let Some(entry) = self.store.entry_mut(key) else {
      return;
    };
    let stamp = entry.stamp;
    let slot = match kind {
      TimerKind::Expire => &mut entry.expire_timer,
      TimerKind::Demote => &mut entry.demote_timer,
    };
    if let Some(old) = slot.take() {
      self.timers.cancel(old);
    }
    *slot = deadline.map(|deadline| self.timers.schedule(deadline, Timer { key: owned, stamp, kind }));
  }

  /// Writes a batch of values through the admission path. The capacity
  /// deficit is computed once for the whole batch.
  pub(crate) fn admit_many<I>(&mut self, items: I, now: Duration, sweep: &mut Sweep<K, V>)
  where
    I: IntoIterator<Item = (K, Arc<V>)>,
  {
    for (key, value) in items {
      self.insert(key, value, now, sweep);
    }
    self.trim_to_capacity(sweep);
  }

  fn insert(&mut self, key: K, value: Arc<V>, now: Duration, sweep: &mut Sweep<K, V>) {
    let stamp = self.next_stamp();
    match self.store.put(key.clone(), value, stamp) {
      Put::Unchanged => return,
      Put::Inserted => {}
      Put::Replaced(old) => {
        self.release(&key, old);
      }
    }
    sweep.inserted += 1;

    let settings = self.settings;
    let expire_timer = settings.max_age.and_then(|max_age| now.checked_add(max_age)).map(|deadline| {
      self.timers.schedule(
        deadline,
        Timer {
          key: key.clone(),
          stamp,
          kind: TimerKind::Expire,
        },
      )
    });
    let demote_timer = settings.min_age.and_then(|min_age| now.checked_add(min_age)).map(|deadline| {
      self.timers.schedule(
        deadline,
        Timer {
          key: key.clone(),
          stamp,
          kind: TimerKind::Demote,
        },
      )
    });

    if let Some(entry) = self.store.entry_mut(&key) {
      entry.expire_timer = expire_timer;
      entry.demote_timer = demote_timer;
    }
  }

  // Tears down the timers and reclamation record of an entry that left the
  // store.
  fn release<Q>(&mut self, key: &Q, entry: CacheEntry<V>) -> Option<Arc<V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    if let Some(id) = entry.expire_timer {
      self.timers.cancel(id);
    }
    if let Some(id) = entry.demote_timer {
      self.timers.cancel(id);
    }
    if self.demoted.get(key) == Some(&entry.stamp) {
      self.demoted.remove(key);
    }
    entry.value()
  }

  /// Deletes a key, reporting it with `reason`.
  pub(crate) fn remove<Q>(&mut self, key: &Q, reason: EvictionReason, sweep: &mut Sweep<K, V>) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let Some((key, entry)) = self.store.remove(key) else {
      return false;
    };
    let value = self.release::<K>(&key, entry);
    sweep.evicted.push(Eviction { key, value, reason });
    true
  }

  /// Deletes up to `count` entries, least recently accessed first.
  pub(crate) fn evict_oldest(&mut self, count: usize, reason: EvictionReason, sweep: &mut Sweep<K, V>) -> usize {
    let mut removed = 0;
    while removed < count {
      let Some(key) = self.store.oldest().cloned() else {
        break;
      };
      self.remove(&key, reason, sweep);
      removed += 1;
    }
    removed
  }

  fn trim_to_capacity(&mut self, sweep: &mut Sweep<K, V>) {
    let capacity = self.settings.capacity;
    if capacity == 0 {
      return;
    }
    let size = self.store.len();
    if size > capacity {
      self.evict_oldest(size - capacity, EvictionReason::Capacity, sweep);
    }
  }

  /// Fires every due timer, then drops weakly held entries whose value is
  /// gone.
  pub(crate) fn run_pending(&mut self, now: Duration, sweep: &mut Sweep<K, V>) {
    self.fire_due(now, sweep);
    self.sweep_reclaimed(sweep);
  }

  /// Fires the timers whose deadline has passed, so reads never see an
  /// entry that should already have been demoted.
  fn fire_due(&mut self, now: Duration, sweep: &mut Sweep<K, V>) {
    if self.timers.next_deadline().map_or(true, |deadline| deadline > now) {
      return;
    }
    for timer in self.timers.pop_due(now) {
      self.fire(timer, sweep);
    }
  }

  fn fire(&mut self, timer: Timer<K>, sweep: &mut Sweep<K, V>) {
    let Some(entry) = self.store.entry_mut(&timer.key) else {
      return;
    };
    if entry.stamp != timer.stamp {
      return;
    }

    match timer.kind {
      TimerKind::Expire => {
        entry.expire_timer = None;
        self.remove(&timer.key, EvictionReason::Expired, sweep);
      }
      TimerKind::Demote => {
        entry.demote_timer = None;
        if entry.demote() {
          sweep.demoted += 1;
          self.demoted.insert(timer.key, timer.stamp);
        }
      }
    }
  }

  /// Removes entries whose weakly held value has been dropped. A record
  /// only acts on the insertion that registered it.
  pub(crate) fn sweep_reclaimed(&mut self, sweep: &mut Sweep<K, V>) {
    if self.demoted.is_empty() {
      return;
    }

    let mut dead = Vec::new();
    let mut stale = Vec::new();
    for (key, stamp) in self.demoted.iter() {
      match self.store.entry(key) {
        Some(entry) if entry.stamp == *stamp && entry.is_weak() => {
          if entry.is_reclaimed() {
            dead.push(key.clone());
          }
        }
        _ => stale.push(key.clone()),
      }
    }

    for key in stale {
      self.demoted.remove(&key);
    }
    for key in dead {
      self.remove(&key, EvictionReason::Reclaimed, sweep);
    }
  }

  /// Unregisters and closes the generation in flight for a key, so its
  /// late result is never admitted.
  pub(crate) fn close_pending<Q>(&mut self, key: &Q) -> Option<Closed<V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.pending.remove(key)?.close()
  }

  /// Drops every entry, every timer and every generation in flight. The
  /// closed generations are returned for delivery outside the lock.
  pub(crate) fn clear(&mut self) -> Vec<Closed<V>> {
    self.store.clear();
    self.timers.clear();
    self.demoted.clear();
    self.pending.drain().filter_map(|(_, group)| group.close()).collect()
  }
}
