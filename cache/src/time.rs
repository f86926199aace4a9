use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

// The single, static reference point for all deadlines in the cache.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// The current time as a `Duration` since the cache epoch.
#[inline]
pub(crate) fn now_duration() -> Duration {
  Instant::now().saturating_duration_since(*CACHE_EPOCH)
}
