use crate::coordinator::group::{AbortHandle, Outcome};
use crate::coordinator::multi::{self, BatchCancelHandle, BatchCompleter, BatchOutcome};
use crate::coordinator::single::{self, CancelHandle, Completer};
use crate::eviction::Sweep;
use crate::iter::{Iter, Keys};
use crate::listener::EvictionReason;
use crate::loader::{Generation, GenerationSlot};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::shared::CacheShared;
use crate::time;

use core::fmt;
use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// A thread-safe cache handle. Clones share the same cache.
pub struct Cache<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
}

impl<K, V, H> Clone for Cache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, V, H> fmt::Debug for Cache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache").field("shared", &self.shared).finish()
  }
}

impl<K, V, H> Cache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Retrieves a value from the cache.
  ///
  /// A hit refreshes the entry's access position and, when configured, its
  /// deadlines. Entries past their max age or whose weakly held value was
  /// dropped are removed and reported as absent.
  pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let mut sweep = Sweep::new();
    let value = self
      .shared
      .inner
      .lock()
      .lookup(key, time::now_duration(), &mut sweep);
    self.shared.notify(sweep);

    let counter = if value.is_some() {
      &self.shared.metrics.hits
    } else {
      &self.shared.metrics.misses
    };
    Metrics::add(counter, 1);
    value
  }

  /// Retrieves a value without refreshing anything.
  pub fn peek<Q>(&self, key: &Q) -> Option<Arc<V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.shared.inner.lock().peek(key, time::now_duration())
  }

  /// Returns `true` if the cache holds a live value for the key. Does not
  /// refresh anything.
  pub fn contains_key<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.peek(key).is_some()
  }

  /// Inserts a value. A generation in flight for the key resolves with it.
  ///
  /// Writing the very allocation already stored is a no-op.
  pub fn set(&self, key: K, value: impl Into<Arc<V>>) {
    self.shared.write(vec![(key, value.into())]);
  }

  /// Inserts many values in one admission, trimming to capacity once.
  pub fn set_multi<I, T>(&self, items: I)
  where
    I: IntoIterator<Item = (K, T)>,
    T: Into<Arc<V>>,
  {
    let items: Vec<_> = items.into_iter().map(|(key, value)| (key, value.into())).collect();
    if !items.is_empty() {
      self.shared.write(items);
    }
  }

  /// Removes an entry from the cache, returning `true` if the key was found.
  ///
  /// A generation in flight for the key is canceled: its waiters fail with
  /// [`GenerateError::Deleted`], its generator is aborted and whatever it
  /// produces later is discarded.
  ///
  /// [`GenerateError::Deleted`]: crate::GenerateError::Deleted
  pub fn delete<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let mut sweep = Sweep::new();
    let (removed, canceled) = {
      let mut inner = self.shared.inner.lock();
      let removed = inner.remove(key, EvictionReason::Invalidated, &mut sweep);
      (removed, inner.close_pending(key))
    };
    self.shared.notify(sweep);
    self.shared.fail_deleted(canceled.into_iter().collect());
    removed
  }

  /// Removes all entries from the cache and cancels every generation in
  /// flight, as [`delete`](Self::delete) does. The listener is not called.
  pub fn clear(&self) {
    let canceled = self.shared.inner.lock().clear();
    self.shared.fail_deleted(canceled);
  }

  /// Removes the `count` least recently accessed entries. Returns how many
  /// were removed.
  pub fn trim(&self, count: usize) -> usize {
    let mut sweep = Sweep::new();
    let removed = self
      .shared
      .inner
      .lock()
      .evict_oldest(count, EvictionReason::Capacity, &mut sweep);
    self.shared.notify(sweep);
    removed
  }

  /// The number of live entries. Due timers are fired and reclaimed
  /// entries removed first, so the count is exact.
  pub fn len(&self) -> usize {
    let mut sweep = Sweep::new();
    let len = {
      let mut inner = self.shared.inner.lock();
      inner.run_pending(time::now_duration(), &mut sweep);
      inner.store.len()
    };
    self.shared.notify(sweep);
    len
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// The keys of all live entries, least recently accessed first.
  pub fn keys(&self) -> Keys<K> {
    let mut sweep = Sweep::new();
    let keys = {
      let mut inner = self.shared.inner.lock();
      inner.run_pending(time::now_duration(), &mut sweep);
      inner.store.keys_ordered_by_access().cloned().collect()
    };
    self.shared.notify(sweep);
    Keys::new(keys)
  }

  /// All live entries, least recently accessed first. Does not refresh
  /// anything.
  pub fn iter(&self) -> Iter<K, V> {
    let mut sweep = Sweep::new();
    let items = {
      let mut inner = self.shared.inner.lock();
      inner.run_pending(time::now_duration(), &mut sweep);
      inner
        .store
        .keys_ordered_by_access()
        .filter_map(|key| {
          let value = inner.store.entry(key)?.value()?;
          Some((key.clone(), value))
        })
        .collect()
    };
    self.shared.notify(sweep);
    Iter::new(items)
  }

  /// Gets the value for `key`, generating it at most once across all
  /// concurrent callers.
  ///
  /// On a hit `callback` runs immediately. Otherwise the caller joins the
  /// generation already in flight for the key, or starts one by calling
  /// `generator` with a [`Completer`]. The generator may finish the
  /// completer synchronously or hand it to another thread; it may return an
  /// [`AbortHandle`] that runs if the generation is resolved early.
  ///
  /// Neither `generator` nor `callback` runs while the cache is locked, so
  /// both may call back into the cache.
  pub fn generate<G, F>(&self, key: K, generator: G, callback: F) -> CancelHandle<K, V, H>
  where
    G: FnOnce(K, Completer<K, V, H>) -> Option<AbortHandle>,
    F: FnOnce(Outcome<V>) + Send + 'static,
  {
    single::generate(&self.shared, key, generator, callback)
  }

  /// Gets the values for many keys, generating the missing ones with at
  /// most one call of `generator`.
  ///
  /// Cached keys are answered from the store and keys being generated by
  /// someone else are joined; only the rest are passed to `generator`.
  /// `callback` runs once, after every key resolved.
  pub fn generate_multi<I, G, F>(&self, keys: I, generator: G, callback: F) -> BatchCancelHandle<K, V, H>
  where
    I: IntoIterator<Item = K>,
    G: FnOnce(Vec<K>, BatchCompleter<K, V, H>) -> Option<AbortHandle>,
    F: FnOnce(BatchOutcome<K, V>) + Send + 'static,
  {
    multi::generate_multi(&self.shared, keys, generator, callback)
  }

  /// Like [`generate`](Self::generate), but returns a [`Generation`] that
  /// can be awaited or waited on instead of taking a callback.
  pub fn fetch_with<G>(&self, key: K, generator: G) -> Generation<K, V, H>
  where
    G: FnOnce(K, Completer<K, V, H>) -> Option<AbortHandle>,
  {
    let slot = Arc::new(GenerationSlot::new());
    let cancel = {
      let slot = slot.clone();
      self.generate(key, generator, move |outcome| slot.complete(outcome))
    };
    Generation::new(slot, cancel)
  }

  /// Returns a snapshot of the cache's metrics.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// Fires due expiry timers and removes reclaimed entries now, instead of
  /// waiting for the janitor.
  pub fn run_pending_tasks(&self) {
    self.shared.run_pending_tasks();
  }
}
