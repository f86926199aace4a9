use crate::error::GenerateError;

use core::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

/// What every caller waiting on a key eventually receives.
pub type Outcome<V> = Result<Arc<V>, GenerateError>;

/// A queued caller. Runs exactly once, outside the cache lock.
pub(crate) type Waiter<V> = Box<dyn FnOnce(Outcome<V>) + Send>;

/// A hook a generator hands back so an in-flight generation can be stopped
/// when its waiters are resolved early (canceled, overridden or short
/// circuited by a `set`).
///
/// The hook runs at most once, no matter how many clones call `abort`.
#[derive(Clone)]
pub struct AbortHandle {
  hook: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl AbortHandle {
  pub fn new<F>(hook: F) -> Self
  where
    F: FnOnce() + Send + 'static,
  {
    Self {
      hook: Arc::new(Mutex::new(Some(Box::new(hook)))),
    }
  }

  /// Runs the hook if nobody has run it yet.
  pub fn abort(&self) {
    let hook = self.hook.lock().take();
    if let Some(hook) = hook {
      hook();
    }
  }

  /// True once the hook has run.
  pub fn is_aborted(&self) -> bool {
    self.hook.lock().is_none()
  }
}

impl fmt::Debug for AbortHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AbortHandle")
      .field("aborted", &self.is_aborted())
      .finish()
  }
}

enum GroupState<V> {
  Open {
    waiters: Vec<Waiter<V>>,
    aborts: Vec<AbortHandle>,
  },
  Resolved,
}

/// The callers waiting on one in-flight generation of a key.
///
/// A group is `Open` while its generation runs and moves to `Resolved`
/// exactly once. Closing hands the queued waiters to the caller, who
/// delivers the outcome after releasing every lock.
pub(crate) struct WaiterGroup<V> {
  state: Mutex<GroupState<V>>,
}

/// The waiters and abort hooks taken out of a group that just closed.
pub(crate) struct Closed<V> {
  waiters: Vec<Waiter<V>>,
  aborts: Vec<AbortHandle>,
}

impl<V> WaiterGroup<V> {
  pub(crate) fn new() -> Self {
    Self {
      state: Mutex::new(GroupState::Open {
        waiters: Vec::new(),
        aborts: Vec::new(),
      }),
    }
  }

  pub(crate) fn with_waiter(waiter: Waiter<V>) -> Self {
    let group = Self::new();
    // A fresh group is open.
    let _ = group.push_waiter(waiter);
    group
  }

  /// Queues a waiter. Hands it back if the group already resolved.
  pub(crate) fn push_waiter(&self, waiter: Waiter<V>) -> Result<(), Waiter<V>> {
    match &mut *self.state.lock() {
      GroupState::Open { waiters, .. } => {
        waiters.push(waiter);
        Ok(())
      }
      GroupState::Resolved => Err(waiter),
    }
  }

  /// Attaches an abort hook. Hands it back if the group already resolved.
  pub(crate) fn attach_abort(&self, abort: AbortHandle) -> Option<AbortHandle> {
    match &mut *self.state.lock() {
      GroupState::Open { aborts, .. } => {
        aborts.push(abort);
        None
      }
      GroupState::Resolved => Some(abort),
    }
  }

  /// Moves the group to `Resolved`. Only the first call gets the waiters.
  pub(crate) fn close(&self) -> Option<Closed<V>> {
    let mut state = self.state.lock();
    match mem::replace(&mut *state, GroupState::Resolved) {
      GroupState::Open { waiters, aborts } => Some(Closed { waiters, aborts }),
      GroupState::Resolved => None,
    }
  }

  pub(crate) fn is_open(&self) -> bool {
    matches!(*self.state.lock(), GroupState::Open { .. })
  }
}

impl<V> Closed<V> {
  /// Delivers `outcome` to every waiter in queue order. With `abort`, the
  /// generator's hooks run first.
  pub(crate) fn deliver(self, outcome: Outcome<V>, abort: bool) {
    if abort {
      for hook in &self.aborts {
        hook.abort();
      }
    }
    for waiter in self.waiters {
      waiter(outcome.clone());
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  use std::sync::atomic::{AtomicUsize, Ordering};

  fn recording(log: &Arc<Mutex<Vec<(usize, Outcome<i32>)>>>, id: usize) -> Waiter<i32> {
    let log = log.clone();
    Box::new(move |outcome| log.lock().push((id, outcome)))
  }

  #[test]
  fn waiters_receive_outcome_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let group = WaiterGroup::with_waiter(recording(&log, 0));
    assert!(group.push_waiter(recording(&log, 1)).is_ok());
    assert!(group.push_waiter(recording(&log, 2)).is_ok());

    group.close().unwrap().deliver(Ok(Arc::new(7)), false);

    let log = log.lock();
    let ids: Vec<_> = log.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(log.iter().all(|(_, outcome)| matches!(outcome, Ok(v) if **v == 7)));
  }

  #[test]
  fn close_happens_once() {
    let group: WaiterGroup<i32> = WaiterGroup::new();
    assert!(group.is_open());
    assert!(group.close().is_some());
    assert!(group.close().is_none());
    assert!(!group.is_open());
  }

  #[test]
  fn resolved_group_rejects_waiters_and_hooks() {
    let group: WaiterGroup<i32> = WaiterGroup::new();
    group.close();

    let log = Arc::new(Mutex::new(Vec::new()));
    assert!(group.push_waiter(recording(&log, 0)).is_err());
    assert!(group.attach_abort(AbortHandle::new(|| {})).is_some());
  }

  #[test]
  fn abort_hooks_run_only_when_asked() {
    let calls = Arc::new(AtomicUsize::new(0));
    let hook = {
      let calls = calls.clone();
      AbortHandle::new(move || {
        calls.fetch_add(1, Ordering::SeqCst);
      })
    };

    let group: WaiterGroup<i32> = WaiterGroup::new();
    assert!(group.attach_abort(hook.clone()).is_none());
    group.close().unwrap().deliver(Ok(Arc::new(1)), false);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!hook.is_aborted());

    let group: WaiterGroup<i32> = WaiterGroup::new();
    group.attach_abort(hook.clone());
    group.close().unwrap().deliver(Err(GenerateError::Abandoned), true);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    hook.abort();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
