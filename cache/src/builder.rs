use crate::error::BuildError;
use crate::handles::Cache;
use crate::shared::{CacheShared, Inner, Settings};
use crate::task::janitor::Janitor;
use crate::EvictionListener;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_JANITOR_TICK: Duration = Duration::from_secs(1);

/// A builder for creating `Cache` instances.
///
/// With no options set the cache is unbounded and keeps entries until they
/// are deleted.
pub struct CacheBuilder<K, V, H = ahash::RandomState> {
  pub(crate) capacity: usize,
  pub(crate) max_age: Option<Duration>,
  pub(crate) min_age: Option<Duration>,
  pub(crate) retime_on_access: bool,
  pub(crate) relive_on_access: bool,
  pub(crate) hasher: H,
  pub(crate) janitor_tick_interval: Option<Duration>,
  listener: Option<Arc<dyn EvictionListener<K, V>>>,
  _key_marker: PhantomData<K>,
  _value_marker: PhantomData<V>,
}

// Manual Debug implementation for CacheBuilder.
impl<K, V, H> fmt::Debug for CacheBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("capacity", &self.capacity)
      .field("max_age", &self.max_age)
      .field("min_age", &self.min_age)
      .field("retime_on_access", &self.retime_on_access)
      .field("relive_on_access", &self.relive_on_access)
      .field("has_listener", &self.listener.is_some())
      .finish_non_exhaustive()
  }
}

// --- General Configuration Methods ---
// This impl block has no restrictive bounds on K or V.
impl<K, V, H> CacheBuilder<K, V, H> {
  /// Sets the maximum number of entries. Zero means unbounded.
  pub fn capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  /// Sets the cache to be "unbounded".
  pub fn unbounded(mut self) -> Self {
    self.capacity = 0;
    self
  }

  /// Deletes every entry this long after it was written. A zero duration
  /// disables hard expiry.
  pub fn max_age(mut self, duration: Duration) -> Self {
    self.max_age = Some(duration).filter(|age| !age.is_zero());
    self
  }

  /// Stops pinning every value this long after it was written. From then
  /// on the entry lives only as long as someone outside the cache holds the
  /// value. A zero duration disables soft expiry.
  ///
  /// Overdue demotions are applied by the janitor on its next tick, or
  /// earlier by any `get`.
  pub fn min_age(mut self, duration: Duration) -> Self {
    self.min_age = Some(duration).filter(|age| !age.is_zero());
    self
  }

  /// Restarts the max-age deadline whenever the entry is read.
  pub fn retime_on_access(mut self, enabled: bool) -> Self {
    self.retime_on_access = enabled;
    self
  }

  /// Pins a live value again whenever it is read, and restarts its min-age
  /// deadline.
  pub fn relive_on_access(mut self, enabled: bool) -> Self {
    self.relive_on_access = enabled;
    self
  }

  /// Shorthand for enabling both `retime_on_access` and `relive_on_access`.
  pub fn reset_timers_on_access(self, enabled: bool) -> Self {
    self.retime_on_access(enabled).relive_on_access(enabled)
  }

  /// Sets the eviction listener for the cache.
  pub fn eviction_listener<Listener>(mut self, listener: Listener) -> Self
  where
    Listener: EvictionListener<K, V> + 'static,
  {
    self.listener = Some(Arc::new(listener));
    self
  }

  /// Sets the tick interval for the background cleanup task (janitor).
  /// (Primarily for testing purposes).
  #[doc(hidden)]
  pub fn janitor_tick_interval(mut self, duration: Duration) -> Self {
    self.janitor_tick_interval = Some(duration);
    self
  }

  /// Sets the hasher for the cache.
  pub fn hasher<S>(self, hasher: S) -> CacheBuilder<K, V, S> {
    CacheBuilder {
      capacity: self.capacity,
      max_age: self.max_age,
      min_age: self.min_age,
      retime_on_access: self.retime_on_access,
      relive_on_access: self.relive_on_access,
      hasher,
      janitor_tick_interval: self.janitor_tick_interval,
      listener: self.listener,
      _key_marker: PhantomData,
      _value_marker: PhantomData,
    }
  }
}

// --- Default Constructor ---
impl<K, V, H: BuildHasher + Default> CacheBuilder<K, V, H> {
  /// Creates a new `CacheBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      capacity: 0,
      max_age: None,
      min_age: None,
      retime_on_access: false,
      relive_on_access: false,
      hasher: H::default(),
      janitor_tick_interval: None,
      listener: None,
      _key_marker: PhantomData,
      _value_marker: PhantomData,
    }
  }
}

impl<K, V> Default for CacheBuilder<K, V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

// --- Build Methods ---
// This impl block contains the full set of trait bounds required to actually
// construct the cache, including `Send + Sync` for the janitor.
impl<K, V, H> CacheBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Builds a `Cache`.
  pub fn build(self) -> Result<Cache<K, V, H>, BuildError> {
    self.validate()?;

    let settings = Settings {
      capacity: self.capacity,
      max_age: self.max_age,
      min_age: self.min_age,
      retime_on_access: self.retime_on_access,
      relive_on_access: self.relive_on_access,
    };
    if let (Some(min_age), Some(max_age)) = (settings.min_age, settings.max_age) {
      if min_age >= max_age {
        tracing::warn!(?min_age, ?max_age, "min age is not below max age; soft expiry never takes effect");
      }
    }

    let inner = Inner::new(settings, self.hasher);
    let shared = Arc::new(CacheShared::new(inner, self.listener));

    if settings.max_age.is_some() || settings.min_age.is_some() {
      let tick_interval = self.janitor_tick_interval.unwrap_or(DEFAULT_JANITOR_TICK);
      let janitor = Janitor::spawn(Arc::downgrade(&shared), tick_interval);
      *shared.janitor.lock() = Some(janitor);
    }

    tracing::debug!(?settings, "cache built");
    Ok(Cache { shared })
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.janitor_tick_interval.map_or(false, |tick| tick.is_zero()) {
      return Err(BuildError::ZeroTickInterval);
    }
    Ok(())
  }
}
