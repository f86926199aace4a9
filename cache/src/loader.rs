use crate::coordinator::group::Outcome;
use crate::coordinator::single::CancelHandle;

use core::fmt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};

/// Represents a waiter in the queue for a `Generation`.
enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn is_thread(&self, thread: &Thread) -> bool {
    matches!(self, Waiter::Sync(parked) if parked.id() == thread.id())
  }

  fn is_waker(&self, waker: &Waker) -> bool {
    matches!(self, Waiter::Async(registered) if registered.will_wake(waker))
  }

  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

enum State<V> {
  Pending,
  Ready(Outcome<V>),
}

struct Inner<V> {
  state: State<V>,
  waiters: VecDeque<Waiter>,
}

/// The slot a generation's callback writes into.
pub(crate) struct GenerationSlot<V> {
  inner: Mutex<Inner<V>>,
}

impl<V> GenerationSlot<V> {
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Pending,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Stores the outcome and wakes every waiter. Later calls are ignored.
  pub(crate) fn complete(&self, outcome: Outcome<V>) {
    let waiters = {
      let mut inner = self.inner.lock();
      if let State::Ready(_) = inner.state {
        return;
      }
      inner.state = State::Ready(outcome);
      std::mem::take(&mut inner.waiters)
    };
    for waiter in waiters {
      waiter.wake();
    }
  }

  fn ready(&self) -> Option<Outcome<V>> {
    match &self.inner.lock().state {
      State::Ready(outcome) => Some(outcome.clone()),
      State::Pending => None,
    }
  }
}

/// The result of [`Cache::fetch_with`](crate::Cache::fetch_with): a value
/// being produced for the cache.
///
/// It can be awaited by async tasks or waited on by blocking threads, any
/// number of times. Every wait yields the same outcome.
pub struct Generation<K, V, H = ahash::RandomState> {
  slot: Arc<GenerationSlot<V>>,
  cancel: CancelHandle<K, V, H>,
}

impl<K, V, H> Generation<K, V, H> {
  pub(crate) fn new(slot: Arc<GenerationSlot<V>>, cancel: CancelHandle<K, V, H>) -> Self {
    Self { slot, cancel }
  }

  /// Blocks the current thread until the outcome is known.
  pub fn wait(&self) -> Outcome<V> {
    loop {
      {
        let mut inner = self.slot.inner.lock();
        if let State::Ready(outcome) = &inner.state {
          return outcome.clone();
        }
        let current = thread::current();
        if !inner.waiters.iter().any(|waiter| waiter.is_thread(&current)) {
          inner.waiters.push_back(Waiter::Sync(current));
        }
      }
      thread::park();
    }
  }

  /// The outcome, if it is already known.
  pub fn try_get(&self) -> Option<Outcome<V>> {
    self.slot.ready()
  }

  /// The handle that resolves this generation early.
  pub fn cancel_handle(&self) -> &CancelHandle<K, V, H> {
    &self.cancel
  }
}

impl<K, V, H> Future for Generation<K, V, H> {
  type Output = Outcome<V>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.slot.inner.lock();
    match &inner.state {
      State::Ready(outcome) => Poll::Ready(outcome.clone()),
      State::Pending => {
        let waker = cx.waker();
        if !inner.waiters.iter().any(|waiter| waiter.is_waker(waker)) {
          inner.waiters.push_back(Waiter::Async(waker.clone()));
        }
        Poll::Pending
      }
    }
  }
}

impl<K, V, H> fmt::Debug for Generation<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Generation")
      .field("ready", &self.slot.ready().is_some())
      .finish()
  }
}
