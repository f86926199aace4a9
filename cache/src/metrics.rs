use crate::listener::EvictionReason;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub struct Metrics {
  // --- Hit/Miss Ratios ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Throughput ---
  pub(crate) inserts: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,

  // --- Eviction Stats ---
  pub(crate) evicted_by_capacity: CachePadded<AtomicU64>,
  pub(crate) evicted_by_max_age: CachePadded<AtomicU64>,
  pub(crate) demoted: CachePadded<AtomicU64>,
  pub(crate) reclaimed: CachePadded<AtomicU64>,

  // --- Generation ---
  pub(crate) generations: CachePadded<AtomicU64>,
  pub(crate) coalesced: CachePadded<AtomicU64>,
  pub(crate) generation_failures: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      inserts: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      evicted_by_capacity: CachePadded::new(AtomicU64::new(0)),
      evicted_by_max_age: CachePadded::new(AtomicU64::new(0)),
      demoted: CachePadded::new(AtomicU64::new(0)),
      reclaimed: CachePadded::new(AtomicU64::new(0)),
      generations: CachePadded::new(AtomicU64::new(0)),
      coalesced: CachePadded::new(AtomicU64::new(0)),
      generation_failures: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn add(counter: &AtomicU64, n: u64) {
    if n > 0 {
      counter.fetch_add(n, Ordering::Relaxed);
    }
  }

  pub(crate) fn record_eviction(&self, reason: EvictionReason) {
    let counter = match reason {
      EvictionReason::Capacity => &self.evicted_by_capacity,
      EvictionReason::Expired => &self.evicted_by_max_age,
      EvictionReason::Reclaimed => &self.reclaimed,
      EvictionReason::Invalidated => &self.invalidations,
    };
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      inserts: self.inserts.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      evicted_by_capacity: self.evicted_by_capacity.load(Ordering::Relaxed),
      evicted_by_max_age: self.evicted_by_max_age.load(Ordering::Relaxed),
      demoted: self.demoted.load(Ordering::Relaxed),
      reclaimed: self.reclaimed.load(Ordering::Relaxed),
      generations: self.generations.load(Ordering::Relaxed),
      coalesced: self.coalesced.load(Ordering::Relaxed),
      generation_failures: self.generation_failures.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Lookups that found a live value.
  pub hits: u64,
  /// Lookups that found nothing (including generations that had to start).
  pub misses: u64,
  /// The cache hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// Values written into the store, directly or by a generation.
  pub inserts: u64,
  /// Entries removed with `delete`.
  pub invalidations: u64,
  /// Entries removed to respect the capacity, or by `trim`.
  pub evicted_by_capacity: u64,
  /// Entries removed because they reached their maximum age.
  pub evicted_by_max_age: u64,
  /// Values downgraded to weak retention at their minimum age.
  pub demoted: u64,
  /// Weakly held entries removed because their value was dropped.
  pub reclaimed: u64,
  /// Generator invocations (single-key and batch keys).
  pub generations: u64,
  /// Requests that joined an in-flight generation instead of starting one.
  pub coalesced: u64,
  /// Waiter groups that resolved with an error.
  pub generation_failures: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("inserts", &self.inserts)
      .field("invalidations", &self.invalidations)
      .field("evicted_by_capacity", &self.evicted_by_capacity)
      .field("evicted_by_max_age", &self.evicted_by_max_age)
      .field("demoted", &self.demoted)
      .field("reclaimed", &self.reclaimed)
      .field("generations", &self.generations)
      .field("coalesced", &self.coalesced)
      .field("generation_failures", &self.generation_failures)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
