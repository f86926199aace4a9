use crate::coordinator::group::{Closed, Outcome, WaiterGroup};
use crate::error::GenerateError;
use crate::eviction::Sweep;
use crate::listener::EvictionListener;
use crate::metrics::Metrics;
use crate::store::Store;
use crate::task::janitor::Janitor;
use crate::task::timer::TimerQueue;
use crate::time;

use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// The validated, immutable configuration of one cache.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
  /// Zero means unbounded.
  pub(crate) capacity: usize,
  pub(crate) max_age: Option<Duration>,
  pub(crate) min_age: Option<Duration>,
  pub(crate) retime_on_access: bool,
  pub(crate) relive_on_access: bool,
}

/// Everything guarded by the cache lock.
pub(crate) struct Inner<K, V, H> {
  pub(crate) store: Store<K, V, H>,
  pub(crate) timers: TimerQueue<K>,
  /// Keys whose value was demoted to a weak reference, with the stamp of
  /// the insertion that was demoted.
  pub(crate) demoted: HashMap<K, u64, H>,
  /// In-flight generations. A registered group is always open.
  pub(crate) pending: HashMap<K, Arc<WaiterGroup<V>>, H>,
  pub(crate) settings: Settings,
  pub(crate) next_stamp: u64,
}

impl<K, V, H> Inner<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  pub(crate) fn new(settings: Settings, hasher: H) -> Self {
    Self {
      store: Store::new(hasher.clone()),
      timers: TimerQueue::new(),
      demoted: HashMap::with_hasher(hasher.clone()),
      pending: HashMap::with_hasher(hasher),
      settings,
      next_stamp: 0,
    }
  }
}

/// The internal, thread-safe core of the cache.
pub(crate) struct CacheShared<K, V, H> {
  pub(crate) inner: Mutex<Inner<K, V, H>>,
  pub(crate) metrics: Metrics,
  pub(crate) listener: Option<Arc<dyn EvictionListener<K, V>>>,
  pub(crate) janitor: Mutex<Option<Janitor>>,
}

impl<K, V, H> fmt::Debug for CacheShared<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.lock();
    f.debug_struct("CacheShared")
      .field("settings", &inner.settings)
      .field("store", &inner.store)
      .field("timers", &inner.timers.len())
      .field("next_deadline", &inner.timers.next_deadline())
      .field("pending", &inner.pending.len())
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<K, V, H> Drop for CacheShared<K, V, H> {
  fn drop(&mut self) {
    if let Some(janitor) = self.janitor.get_mut().take() {
      janitor.stop();
    }
  }
}

impl<K, V, H> CacheShared<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  pub(crate) fn new(inner: Inner<K, V, H>, listener: Option<Arc<dyn EvictionListener<K, V>>>) -> Self {
    Self {
      inner: Mutex::new(inner),
      metrics: Metrics::new(),
      listener,
      janitor: Mutex::new(None),
    }
  }

  /// Publishes what a critical section did. Must be called without the
  /// cache lock held, since the listener may re-enter the cache.
  pub(crate) fn notify(&self, sweep: Sweep<K, V>) {
    if sweep.is_empty() {
      return;
    }

    Metrics::add(&self.metrics.inserts, sweep.inserted);
    Metrics::add(&self.metrics.demoted, sweep.demoted);
    if sweep.demoted > 0 {
      tracing::debug!(count = sweep.demoted, "demoted entries to weak retention");
    }

    for eviction in sweep.evicted {
      self.metrics.record_eviction(eviction.reason);
      tracing::debug!(reason = %eviction.reason, alive = eviction.value.is_some(), "entry removed");
      if let Some(listener) = &self.listener {
        listener.on_evict(eviction.key, eviction.value, eviction.reason);
      }
    }
  }

  /// Fires due timers and drops reclaimed entries.
  pub(crate) fn run_pending_tasks(&self) {
    let mut sweep = Sweep::new();
    self.inner.lock().run_pending(time::now_duration(), &mut sweep);
    self.notify(sweep);
  }

  /// Writes values directly. A generation in flight for any written key is
  /// resolved with the written value and told to abort.
  pub(crate) fn write(&self, items: Vec<(K, Arc<V>)>) {
    let now = time::now_duration();
    let mut sweep = Sweep::new();
    let mut deliveries = Vec::new();

    {
      let mut inner = self.inner.lock();
      for (key, value) in &items {
        if let Some(group) = inner.pending.remove(key) {
          if let Some(closed) = group.close() {
            deliveries.push((closed, value.clone()));
          }
        }
      }
      inner.admit_many(items, now, &mut sweep);
    }

    self.notify(sweep);
    if !deliveries.is_empty() {
      tracing::trace!(count = deliveries.len(), "write resolved pending generations");
    }
    for (closed, value) in deliveries {
      closed.deliver(Ok(value), true);
    }
  }

  /// Fails generations whose key was deleted while they were in flight,
  /// and aborts their generators. Must be called without the cache lock.
  pub(crate) fn fail_deleted(&self, closed: Vec<Closed<V>>) {
    if closed.is_empty() {
      return;
    }
    tracing::trace!(count = closed.len(), "deletion canceled pending generations");
    Metrics::add(&self.metrics.generation_failures, closed.len() as u64);
    for group in closed {
      group.deliver(Err(GenerateError::Deleted), true);
    }
  }

  /// Resolves waiter groups. Groups that already resolved are skipped, so
  /// the first resolution of a group wins. Successful values are admitted
  /// in one batch unless another generation took over the key.
  ///
  /// Returns how many groups this call resolved.
  pub(crate) fn resolve_many(&self, resolutions: Vec<(K, Arc<WaiterGroup<V>>, Outcome<V>)>, abort: bool) -> usize {
    let now = time::now_duration();
    let mut sweep = Sweep::new();
    let mut deliveries: Vec<(Closed<V>, Outcome<V>)> = Vec::with_capacity(resolutions.len());

    {
      let mut inner = self.inner.lock();
      let mut admitted = Vec::new();

      for (key, group, outcome) in resolutions {
        let Some(closed) = group.close() else {
          continue;
        };
        if inner
          .pending
          .get(&key)
          .map_or(false, |registered| Arc::ptr_eq(registered, &group))
        {
          inner.pending.remove(&key);
        }
        if let Ok(value) = &outcome {
          if !inner.pending.contains_key(&key) {
            admitted.push((key, value.clone()));
          }
        }
        deliveries.push((closed, outcome));
      }

      if !admitted.is_empty() {
        inner.admit_many(admitted, now, &mut sweep);
      }
    }

    self.notify(sweep);

    let resolved = deliveries.len();
    let failures = deliveries.iter().filter(|(_, outcome)| outcome.is_err()).count();
    Metrics::add(&self.metrics.generation_failures, failures as u64);

    for (closed, outcome) in deliveries {
      closed.deliver(outcome, abort);
    }
    resolved
  }
}
