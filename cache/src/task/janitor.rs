use crate::shared::CacheShared;

use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The background task that fires due expiry timers and sweeps reclaimed
/// entries, so deadlines are honored even when nobody touches the cache.
pub(crate) struct Janitor {
  handle: JoinHandle<()>, // When janitor is dropped, thread is exited
  stop_flag: Arc<AtomicBool>,
}

impl Janitor {
  /// Spawns a new janitor thread. It only holds a weak reference, so it
  /// never keeps the cache alive, and exits once the cache is gone.
  pub(crate) fn spawn<K, V, H>(shared: Weak<CacheShared<K, V, H>>, tick_interval: Duration) -> Self
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    H: BuildHasher + Send + Sync + 'static,
  {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_clone = stop_flag.clone();

    let handle = thread::spawn(move || {
      tracing::trace!(?tick_interval, "janitor started");
      while !stop_clone.load(Ordering::Relaxed) {
        let tick_start = Instant::now();

        match shared.upgrade() {
          Some(shared) => shared.run_pending_tasks(),
          None => break,
        }

        // Sleep for the remaining duration of the tick interval.
        if let Some(remaining) = tick_interval.checked_sub(tick_start.elapsed()) {
          thread::park_timeout(remaining);
        }
      }
      tracing::trace!("janitor stopped");
    });

    Self { handle, stop_flag }
  }

  /// Signals the janitor thread to stop. It does not wait for it: the last
  /// owner of the cache may be the janitor itself.
  pub(crate) fn stop(self) {
    self.stop_flag.store(true, Ordering::Relaxed);
    self.handle.thread().unpark();
  }
}
