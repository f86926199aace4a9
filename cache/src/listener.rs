use std::fmt;
use std::sync::Arc;

/// Describes the reason an entry was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
  /// The entry was removed to keep the cache within its capacity, or by an
  /// explicit `trim`.
  Capacity,
  /// The entry reached its maximum age.
  Expired,
  /// The entry's value was only weakly held after its minimum age and every
  /// other owner dropped it.
  Reclaimed,
  /// The entry was removed with `delete`.
  Invalidated,
}

impl fmt::Display for EvictionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EvictionReason::Capacity => write!(f, "evicted due to capacity"),
      EvictionReason::Expired => write!(f, "evicted due to max age"),
      EvictionReason::Reclaimed => write!(f, "value reclaimed after min age"),
      EvictionReason::Invalidated => write!(f, "manually invalidated"),
    }
  }
}

/// A listener that can be registered with the cache to receive notifications
/// when entries are removed.
///
/// `on_evict` receives the key, the value if it is still alive, and the
/// reason. It runs on the thread that caused the removal, after the cache's
/// internal lock has been released, so it may call back into the cache.
pub trait EvictionListener<K, V>: Send + Sync {
  fn on_evict(&self, key: K, value: Option<Arc<V>>, reason: EvictionReason);
}
