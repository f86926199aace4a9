use super::group::{AbortHandle, Outcome, Waiter, WaiterGroup};
use crate::error::GenerateError;
use crate::eviction::Sweep;
use crate::metrics::Metrics;
use crate::shared::CacheShared;
use crate::time;

use core::fmt;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use parking_lot::Mutex;

/// What a batch caller receives: every requested key with its value, or the
/// (folded) error of the keys that failed.
pub type BatchOutcome<K, V> = Result<HashMap<K, Arc<V>>, GenerateError>;

type BatchCallback<K, V> = Box<dyn FnOnce(BatchOutcome<K, V>) + Send>;

/// Requests many keys at once.
///
/// Keys already stored are answered from the store, keys with a generation
/// in flight join it, and only the remaining keys are handed to one call of
/// `generator`. `callback` fires once, after every key resolved.
pub(crate) fn generate_multi<K, V, H, I, G, F>(
  shared: &Arc<CacheShared<K, V, H>>,
  keys: I,
  generator: G,
  callback: F,
) -> BatchCancelHandle<K, V, H>
where
  K: Eq + Hash + Clone + Send + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher,
  I: IntoIterator<Item = K>,
  G: FnOnce(Vec<K>, BatchCompleter<K, V, H>) -> Option<AbortHandle>,
  F: FnOnce(BatchOutcome<K, V>) + Send + 'static,
{
  let mut seen = ahash::HashSet::default();
  let keys: Vec<K> = keys.into_iter().filter(|key| seen.insert(key.clone())).collect();

  if keys.is_empty() {
    callback(Ok(HashMap::new()));
    return BatchCancelHandle::noop();
  }

  let batch = Arc::new(Batch::new(keys.len(), Box::new(callback)));
  let now = time::now_duration();
  let mut sweep = Sweep::new();

  let mut hits = Vec::new();
  let mut touched = Vec::new();
  let mut fresh = Vec::new();
  let mut fresh_groups = Vec::new();
  let mut coalesced = 0;

  let batch_abort = Arc::new(SharedAbort::new());

  {
    let mut inner = shared.inner.lock();
    for key in keys {
      if let Some(value) = inner.lookup(&key, now, &mut sweep) {
        hits.push((key, value));
        continue;
      }

      let mut waiter = batch.waiter(key.clone());
      if let Some(group) = inner.pending.get(&key).cloned() {
        match group.push_waiter(waiter) {
          Ok(()) => {
            coalesced += 1;
            touched.push((key, group));
            continue;
          }
          Err(rejected) => waiter = rejected,
        }
      }

      let group = Arc::new(WaiterGroup::with_waiter(waiter));
      group.attach_abort(batch_abort.share());
      inner.pending.insert(key.clone(), group.clone());
      touched.push((key.clone(), group.clone()));
      fresh_groups.push(group);
      fresh.push(key);
    }
  }

  shared.notify(sweep);
  Metrics::add(&shared.metrics.hits, hits.len() as u64);
  Metrics::add(&shared.metrics.coalesced, coalesced);
  Metrics::add(&shared.metrics.misses, fresh.len() as u64);
  Metrics::add(&shared.metrics.generations, fresh.len() as u64);

  let handle = BatchCancelHandle {
    target: Some(Arc::new(BatchTarget {
      shared: shared.clone(),
      touched,
    })),
  };

  for (key, value) in hits {
    batch.record(key, Ok(value));
  }

  if !fresh.is_empty() {
    tracing::trace!(fresh = fresh.len(), coalesced, "starting batch generation");
    let completer = BatchCompleter {
      keys: fresh.clone(),
      target: Some((shared.clone(), fresh_groups)),
    };
    if let Some(abort) = generator(fresh, completer) {
      batch_abort.attach(abort);
    }
  }

  handle
}

// Collects the per-key outcomes of one `generate_multi` call.
struct Batch<K, V> {
  state: Mutex<BatchState<K, V>>,
}

struct BatchState<K, V> {
  order: Vec<K>,
  results: HashMap<K, Outcome<V>>,
  remaining: usize,
  callback: Option<BatchCallback<K, V>>,
}

impl<K, V> Batch<K, V>
where
  K: Eq + Hash + Clone + Send + 'static,
  V: Send + Sync + 'static,
{
  fn new(size: usize, callback: BatchCallback<K, V>) -> Self {
    Self {
      state: Mutex::new(BatchState {
        order: Vec::with_capacity(size),
        results: HashMap::with_capacity(size),
        remaining: size,
        callback: Some(callback),
      }),
    }
  }

  fn waiter(self: &Arc<Self>, key: K) -> Waiter<V> {
    let batch = self.clone();
    Box::new(move |outcome| batch.record(key, outcome))
  }

  // The first outcome recorded for a key wins.
  fn record(&self, key: K, outcome: Outcome<V>) {
    let finished = {
      let mut state = self.state.lock();
      if state.results.contains_key(&key) {
        return;
      }
      state.order.push(key.clone());
      state.results.insert(key, outcome);
      state.remaining = state.remaining.saturating_sub(1);
      if state.remaining > 0 {
        return;
      }
      state
        .callback
        .take()
        .map(|callback| (callback, std::mem::take(&mut state.order), std::mem::take(&mut state.results)))
    };

    if let Some((callback, order, results)) = finished {
      callback(fold(order, results));
    }
  }
}

/// Turns per-key outcomes into the batch outcome. Failures with the same
/// message collapse into one; distinct ones are folded into
/// [`GenerateError::Aggregate`] around the first.
fn fold<K, V>(order: Vec<K>, mut results: HashMap<K, Outcome<V>>) -> BatchOutcome<K, V>
where
  K: Eq + Hash,
{
  let mut values = HashMap::with_capacity(results.len());
  let mut errors: Vec<GenerateError> = Vec::new();

  for key in order {
    match results.remove(&key) {
      Some(Ok(value)) => {
        values.insert(key, value);
      }
      Some(Err(error)) => {
        let message = error.to_string();
        if !errors.iter().any(|seen| seen.to_string() == message) {
          errors.push(error);
        }
      }
      None => {}
    }
  }

  let mut errors = errors.into_iter();
  let Some(first) = errors.next() else {
    return Ok(values);
  };

  let suppressed: Vec<String> = errors.map(|error| error.to_string()).collect();
  if suppressed.is_empty() {
    return Err(first);
  }

  tracing::warn!(
    first = %first,
    suppressed = ?suppressed,
    "batch generation failed with distinct errors"
  );
  Err(GenerateError::Aggregate {
    first: Box::new(first),
    suppressed: suppressed.len(),
  })
}

/// The batch generator's abort hook, split into one share per fresh key.
/// The hook runs when the last share is released.
struct SharedAbort {
  state: Mutex<AbortState>,
}

struct AbortState {
  outstanding: usize,
  released: bool,
  hook: Option<AbortHandle>,
}

impl SharedAbort {
  fn new() -> Self {
    Self {
      state: Mutex::new(AbortState {
        outstanding: 0,
        released: false,
        hook: None,
      }),
    }
  }

  fn share(self: &Arc<Self>) -> AbortHandle {
    self.state.lock().outstanding += 1;
    let shared = self.clone();
    AbortHandle::new(move || shared.release())
  }

  fn release(&self) {
    let hook = {
      let mut state = self.state.lock();
      state.outstanding = state.outstanding.saturating_sub(1);
      if state.outstanding > 0 {
        return;
      }
      state.released = true;
      state.hook.take()
    };
    if let Some(hook) = hook {
      hook.abort();
    }
  }

  fn attach(&self, hook: AbortHandle) {
    {
      let mut state = self.state.lock();
      if !state.released {
        state.hook = Some(hook);
        return;
      }
    }
    hook.abort();
  }
}

/// Handed to a batch generator; resolves the keys it was asked for.
///
/// Dropping it without finishing resolves every key it still owns with
/// [`GenerateError::Abandoned`].
pub struct BatchCompleter<K, V, H = ahash::RandomState>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  keys: Vec<K>,
  target: Option<(Arc<CacheShared<K, V, H>>, Vec<Arc<WaiterGroup<V>>>)>,
}

impl<K, V, H> BatchCompleter<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  /// The keys this generator must produce.
  pub fn keys(&self) -> &[K] {
    &self.keys
  }

  /// True once every key was resolved by someone else.
  pub fn is_canceled(&self) -> bool {
    self
      .target
      .as_ref()
      .map_or(true, |(_, groups)| groups.iter().all(|group| !group.is_open()))
  }

  /// Resolves each key with its own outcome. Keys missing from `results`
  /// fail with [`GenerateError::Missing`]; keys that were not asked for are
  /// ignored. Every successful value is stored in one admission.
  pub fn finish<I>(mut self, results: I)
  where
    I: IntoIterator<Item = (K, Outcome<V>)>,
  {
    let results: HashMap<K, Outcome<V>> = results.into_iter().collect();
    self.resolve(move |key| results.get(key).cloned().unwrap_or(Err(GenerateError::Missing)));
  }

  /// Resolves with values only.
  pub fn succeed<I, T>(self, values: I)
  where
    I: IntoIterator<Item = (K, T)>,
    T: Into<Arc<V>>,
  {
    self.finish(values.into_iter().map(|(key, value)| (key, Ok(value.into()))));
  }

  /// Fails every key with `error`.
  pub fn fail(mut self, error: GenerateError) {
    self.resolve(move |_| Err(error.clone()));
  }

  fn resolve<F>(&mut self, mut outcome_for: F)
  where
    F: FnMut(&K) -> Outcome<V>,
  {
    let Some((shared, groups)) = self.target.take() else {
      return;
    };
    let resolutions = self
      .keys
      .iter()
      .zip(groups)
      .map(|(key, group)| (key.clone(), group, outcome_for(key)))
      .collect();
    shared.resolve_many(resolutions, false);
  }
}

impl<K, V, H> Drop for BatchCompleter<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  fn drop(&mut self) {
    self.resolve(|_| Err(GenerateError::Abandoned));
  }
}

impl<K, V, H> fmt::Debug for BatchCompleter<K, V, H>
where
  K: Eq + Hash + Clone + fmt::Debug,
  H: BuildHasher,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BatchCompleter")
      .field("keys", &self.keys)
      .field("finished", &self.target.is_none())
      .finish()
  }
}

struct BatchTarget<K, V, H> {
  shared: Arc<CacheShared<K, V, H>>,
  // Keys the batch generated or joined, with their groups.
  touched: Vec<(K, Arc<WaiterGroup<V>>)>,
}

/// Resolves the keys of a `generate_multi` call early.
///
/// Resolution reaches every caller waiting on those keys, not only this
/// batch. Keys answered from the store are already resolved and unaffected.
pub struct BatchCancelHandle<K, V, H = ahash::RandomState> {
  target: Option<Arc<BatchTarget<K, V, H>>>,
}

impl<K, V, H> BatchCancelHandle<K, V, H> {
  fn noop() -> Self {
    Self { target: None }
  }

  /// True while any key of the batch is unresolved.
  pub fn is_pending(&self) -> bool {
    self.target.as_ref().map_or(false, |target| {
      target.touched.iter().any(|(_, group)| group.is_open())
    })
  }
}

impl<K, V, H> BatchCancelHandle<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  /// Fails every unresolved key of the batch with `error` and aborts the
  /// generators feeding them. Returns `false` if nothing was left to
  /// resolve.
  pub fn with_error(&self, error: GenerateError) -> bool {
    let Some(target) = &self.target else {
      return false;
    };
    let resolutions = target
      .touched
      .iter()
      .map(|(key, group)| (key.clone(), group.clone(), Err(error.clone())))
      .collect();
    target.shared.resolve_many(resolutions, true) > 0
  }

  /// Resolves the listed keys with the supplied values. Unlisted keys keep
  /// waiting and keys outside the batch are ignored. Returns how many keys
  /// this call resolved.
  pub fn override_with<I, T>(&self, values: I) -> usize
  where
    I: IntoIterator<Item = (K, T)>,
    T: Into<Arc<V>>,
  {
    let Some(target) = &self.target else {
      return 0;
    };
    let resolutions: Vec<_> = values
      .into_iter()
      .filter_map(|(key, value)| {
        target
          .touched
          .iter()
          .find(|(touched, _)| *touched == key)
          .map(|(_, group)| (key, group.clone(), Ok(value.into())))
      })
      .collect();
    if resolutions.is_empty() {
      return 0;
    }
    target.shared.resolve_many(resolutions, true)
  }
}

impl<K, V, H> Clone for BatchCancelHandle<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      target: self.target.clone(),
    }
  }
}

impl<K, V, H> fmt::Debug for BatchCancelHandle<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BatchCancelHandle")
      .field("pending", &self.is_pending())
      .finish()
  }
}
