use super::group::{AbortHandle, Outcome, Waiter, WaiterGroup};
use crate::error::GenerateError;
use crate::eviction::Sweep;
use crate::metrics::Metrics;
use crate::shared::CacheShared;
use crate::time;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// Looks `key` up and, on a miss, makes sure exactly one generator runs for
/// it. Every caller asking for the key while that generator runs joins its
/// waiter group and receives the same outcome.
pub(crate) fn generate<K, V, H, G, F>(
  shared: &Arc<CacheShared<K, V, H>>,
  key: K,
  generator: G,
  callback: F,
) -> CancelHandle<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
  G: FnOnce(K, Completer<K, V, H>) -> Option<AbortHandle>,
  F: FnOnce(Outcome<V>) + Send + 'static,
{
  let now = time::now_duration();
  let mut sweep = Sweep::new();
  let mut inner = shared.inner.lock();

  if let Some(value) = inner.lookup(&key, now, &mut sweep) {
    drop(inner);
    shared.notify(sweep);
    Metrics::add(&shared.metrics.hits, 1);
    callback(Ok(value));
    return CancelHandle::noop();
  }

  let mut waiter: Waiter<V> = Box::new(callback);
  if let Some(group) = inner.pending.get(&key).cloned() {
    match group.push_waiter(waiter) {
      Ok(()) => {
        drop(inner);
        shared.notify(sweep);
        Metrics::add(&shared.metrics.coalesced, 1);
        tracing::trace!("joined in-flight generation");
        return CancelHandle::new(shared.clone(), key, group);
      }
      Err(rejected) => waiter = rejected,
    }
  }

  let group = Arc::new(WaiterGroup::with_waiter(waiter));
  inner.pending.insert(key.clone(), group.clone());
  drop(inner);
  shared.notify(sweep);

  Metrics::add(&shared.metrics.misses, 1);
  Metrics::add(&shared.metrics.generations, 1);
  tracing::trace!("starting generation");

  let completer = Completer {
    key: key.clone(),
    target: Some((shared.clone(), group.clone())),
  };
  if let Some(abort) = generator(key.clone(), completer) {
    // Resolved while the generator ran; nothing left to abort.
    drop(group.attach_abort(abort));
  }

  CancelHandle::new(shared.clone(), key, group)
}

/// Handed to a generator; finishing it resolves every caller waiting on the
/// key.
///
/// Dropping a completer without finishing it resolves the waiters with
/// [`GenerateError::Abandoned`].
pub struct Completer<K, V, H = ahash::RandomState>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  key: K,
  target: Option<(Arc<CacheShared<K, V, H>>, Arc<WaiterGroup<V>>)>,
}

impl<K, V, H> Completer<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  /// The key being generated.
  pub fn key(&self) -> &K {
    &self.key
  }

  /// True once the waiters were resolved by someone else, e.g. a cancel
  /// handle or a direct `set`. Finishing afterwards has no effect.
  pub fn is_canceled(&self) -> bool {
    self
      .target
      .as_ref()
      .map_or(true, |(_, group)| !group.is_open())
  }

  /// Resolves the waiters with `outcome`. A successful value is stored.
  pub fn finish(mut self, outcome: Outcome<V>) {
    self.resolve(outcome);
  }

  pub fn succeed(self, value: impl Into<Arc<V>>) {
    self.finish(Ok(value.into()));
  }

  pub fn fail(self, error: GenerateError) {
    self.finish(Err(error));
  }

  fn resolve(&mut self, outcome: Outcome<V>) {
    if let Some((shared, group)) = self.target.take() {
      shared.resolve_many(vec![(self.key.clone(), group, outcome)], false);
    }
  }
}

impl<K, V, H> Drop for Completer<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  fn drop(&mut self) {
    self.resolve(Err(GenerateError::Abandoned));
  }
}

impl<K, V, H> fmt::Debug for Completer<K, V, H>
where
  K: Eq + Hash + Clone + fmt::Debug,
  H: BuildHasher,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Completer")
      .field("key", &self.key)
      .field("finished", &self.target.is_none())
      .finish()
  }
}

/// Resolves a pending generation early, for every caller waiting on it.
///
/// Returned by `generate`; a handle for a cache hit does nothing. All
/// operations are idempotent: only the first resolution of a generation
/// counts.
pub struct CancelHandle<K, V, H = ahash::RandomState> {
  target: Option<(Arc<CacheShared<K, V, H>>, K, Arc<WaiterGroup<V>>)>,
}

impl<K, V, H> CancelHandle<K, V, H> {
  pub(crate) fn noop() -> Self {
    Self { target: None }
  }

  fn new(shared: Arc<CacheShared<K, V, H>>, key: K, group: Arc<WaiterGroup<V>>) -> Self {
    Self {
      target: Some((shared, key, group)),
    }
  }

  /// True while the generation this handle points at is unresolved.
  pub fn is_pending(&self) -> bool {
    self
      .target
      .as_ref()
      .map_or(false, |(_, _, group)| group.is_open())
  }
}

impl<K, V, H> CancelHandle<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  /// Fails every waiter with `error` and aborts the generator. Returns
  /// `false` if the generation had already resolved.
  pub fn with_error(&self, error: GenerateError) -> bool {
    self.resolve(Err(error))
  }

  /// Resolves every waiter with `value`, stores it and aborts the
  /// generator. Returns `false` if the generation had already resolved.
  pub fn with_value(&self, value: impl Into<Arc<V>>) -> bool {
    self.resolve(Ok(value.into()))
  }

  fn resolve(&self, outcome: Outcome<V>) -> bool {
    match &self.target {
      Some((shared, key, group)) => shared.resolve_many(vec![(key.clone(), group.clone(), outcome)], true) > 0,
      None => false,
    }
  }
}

impl<K: Clone, V, H> Clone for CancelHandle<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      target: self
        .target
        .as_ref()
        .map(|(shared, key, group)| (shared.clone(), key.clone(), group.clone())),
    }
  }
}

impl<K, V, H> fmt::Debug for CancelHandle<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CancelHandle")
      .field("pending", &self.is_pending())
      .finish()
  }
}
