use std::collections::BTreeMap;
use std::time::Duration;

/// What a timer does to its entry when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
  /// Hard deadline: delete the entry.
  Expire,
  /// Soft deadline: downgrade the entry's value to a weak reference.
  Demote,
}

/// Identifies one scheduled timer. Ordering is by deadline, then by
/// scheduling order, so the queue pops timers in the order they are due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TimerId {
  deadline: Duration,
  seq: u64,
}

impl TimerId {
  /// The deadline as a `Duration` since the cache epoch.
  #[inline]
  pub(crate) fn deadline(&self) -> Duration {
    self.deadline
  }
}

/// A timer owned by one insertion of one key.
#[derive(Debug)]
pub(crate) struct Timer<K> {
  pub(crate) key: K,
  /// The stamp of the insertion that scheduled this timer.
  pub(crate) stamp: u64,
  pub(crate) kind: TimerKind,
}

/// A deadline-ordered timer queue.
///
/// Timers are keyed by `TimerId`, which makes cancellation an O(log n)
/// removal and draining all due timers a single `split_off`.
pub(crate) struct TimerQueue<K> {
  timers: BTreeMap<TimerId, Timer<K>>,
  next_seq: u64,
}

impl<K> TimerQueue<K> {
  pub(crate) fn new() -> Self {
    Self {
      timers: BTreeMap::new(),
      next_seq: 0,
    }
  }

  pub(crate) fn schedule(&mut self, deadline: Duration, timer: Timer<K>) -> TimerId {
    let id = TimerId {
      deadline,
      seq: self.next_seq,
    };
    self.next_seq += 1;
    self.timers.insert(id, timer);
    id
  }

  pub(crate) fn cancel(&mut self, id: TimerId) {
    self.timers.remove(&id);
  }

  /// Removes and returns every timer whose deadline is at or before `now`,
  /// earliest first.
  pub(crate) fn pop_due(&mut self, now: Duration) -> Vec<Timer<K>> {
    // Everything strictly after `now` stays in the queue.
    let boundary = TimerId {
      deadline: now,
      seq: u64::MAX,
    };
    let pending = self.timers.split_off(&boundary);
    let due = std::mem::replace(&mut self.timers, pending);
    due.into_values().collect()
  }

  pub(crate) fn next_deadline(&self) -> Option<Duration> {
    self.timers.keys().next().map(TimerId::deadline)
  }

  pub(crate) fn len(&self) -> usize {
    self.timers.len()
  }

  pub(crate) fn clear(&mut self) {
    self.timers.clear();
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn timer(key: &'static str) -> Timer<&'static str> {
    Timer {
      key,
      stamp: 0,
      kind: TimerKind::Expire,
    }
  }

  #[test]
  fn pops_due_timers_in_deadline_order() {
    let mut queue = TimerQueue::new();
    queue.schedule(Duration::from_millis(30), timer("c"));
    queue.schedule(Duration::from_millis(10), timer("a"));
    queue.schedule(Duration::from_millis(20), timer("b"));
    queue.schedule(Duration::from_millis(40), timer("d"));

    let due: Vec<_> = queue
      .pop_due(Duration::from_millis(30))
      .into_iter()
      .map(|t| t.key)
      .collect();
    assert_eq!(due, vec!["a", "b", "c"]);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.next_deadline(), Some(Duration::from_millis(40)));
  }

  #[test]
  fn equal_deadlines_fire_in_schedule_order() {
    let mut queue = TimerQueue::new();
    let deadline = Duration::from_millis(5);
    queue.schedule(deadline, timer("first"));
    queue.schedule(deadline, timer("second"));

    let due: Vec<_> = queue.pop_due(deadline).into_iter().map(|t| t.key).collect();
    assert_eq!(due, vec!["first", "second"]);
  }

  #[test]
  fn cancelled_timer_never_fires() {
    let mut queue = TimerQueue::new();
    let id = queue.schedule(Duration::from_millis(1), timer("a"));
    queue.schedule(Duration::from_millis(2), timer("b"));
    queue.cancel(id);

    let due: Vec<_> = queue
      .pop_due(Duration::from_secs(1))
      .into_iter()
      .map(|t| t.key)
      .collect();
    assert_eq!(due, vec!["b"]);
    assert_eq!(queue.len(), 0);
  }

  #[test]
  fn nothing_due_leaves_queue_intact() {
    let mut queue = TimerQueue::new();
    queue.schedule(Duration::from_secs(10), timer("a"));
    assert!(queue.pop_due(Duration::from_secs(1)).is_empty());
    assert_eq!(queue.len(), 1);
  }
}
