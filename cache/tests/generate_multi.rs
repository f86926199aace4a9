use lru_weak_cache::{AbortHandle, BatchCompleter, BatchOutcome, CacheBuilder, Completer, GenerateError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

type Parked = Arc<Mutex<Option<BatchCompleter<i32, String>>>>;

struct Recorder {
  parked: Parked,
  requested: Arc<Mutex<Vec<Vec<i32>>>>,
  aborts: Arc<AtomicUsize>,
}

impl Recorder {
  fn new() -> Self {
    Self {
      parked: Default::default(),
      requested: Default::default(),
      aborts: Arc::new(AtomicUsize::new(0)),
    }
  }

  // A batch generator that keeps its completer for the test to finish.
  fn generator(&self) -> impl FnOnce(Vec<i32>, BatchCompleter<i32, String>) -> Option<AbortHandle> {
    let parked = self.parked.clone();
    let requested = self.requested.clone();
    let aborts = self.aborts.clone();
    move |keys, completer| {
      requested.lock().unwrap().push(keys);
      *parked.lock().unwrap() = Some(completer);
      Some(AbortHandle::new(move || {
        aborts.fetch_add(1, Ordering::SeqCst);
      }))
    }
  }

  fn completer(&self) -> BatchCompleter<i32, String> {
    self.parked.lock().unwrap().take().unwrap()
  }

  fn requested(&self) -> Vec<Vec<i32>> {
    self.requested.lock().unwrap().clone()
  }

  fn aborts(&self) -> usize {
    self.aborts.load(Ordering::SeqCst)
  }
}

fn sender(tx: &mpsc::Sender<BatchOutcome<i32, String>>) -> impl FnOnce(BatchOutcome<i32, String>) + Send + 'static {
  let tx = tx.clone();
  move |outcome| {
    let _ = tx.send(outcome);
  }
}

fn strings(values: &HashMap<i32, Arc<String>>) -> Vec<(i32, String)> {
  let mut pairs: Vec<_> = values.iter().map(|(k, v)| (*k, v.to_string())).collect();
  pairs.sort();
  pairs
}

#[test]
fn test_cached_keys_are_excluded_from_generation() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  cache.set(1, "cached".to_string());
  let recorder = Recorder::new();
  let (tx, rx) = mpsc::channel();

  cache.generate_multi(vec![1, 2, 3], recorder.generator(), sender(&tx));
  assert_eq!(recorder.requested(), vec![vec![2, 3]]);
  assert!(rx.try_recv().is_err(), "callback waits for every key");

  recorder
    .completer()
    .succeed(vec![(2, "two".to_string()), (3, "three".to_string())]);

  let values = rx.recv().unwrap().unwrap();
  assert_eq!(
    strings(&values),
    vec![(1, "cached".to_string()), (2, "two".to_string()), (3, "three".to_string())]
  );
  assert_eq!(cache.peek(&3).as_deref().map(String::as_str), Some("three"));

  let metrics = cache.metrics();
  assert_eq!(metrics.hits, 1);
  assert_eq!(metrics.misses, 2);
}

#[test]
fn test_all_cached_skips_the_generator() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  cache.set_multi(vec![(1, "one".to_string()), (2, "two".to_string())]);
  let (tx, rx) = mpsc::channel();

  let handle = cache.generate_multi(vec![2, 1], |_, _| panic!("nothing to generate"), sender(&tx));

  assert_eq!(rx.recv().unwrap().unwrap().len(), 2);
  assert!(!handle.is_pending());
}

#[test]
fn test_empty_and_duplicate_keys() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  let recorder = Recorder::new();
  let (tx, rx) = mpsc::channel();

  cache.generate_multi(Vec::new(), |_, _| panic!("nothing to generate"), sender(&tx));
  assert!(rx.recv().unwrap().unwrap().is_empty());

  cache.generate_multi(vec![4, 4, 5, 4], recorder.generator(), sender(&tx));
  assert_eq!(recorder.requested(), vec![vec![4, 5]]);
  recorder
    .completer()
    .succeed(vec![(4, "four".to_string()), (5, "five".to_string())]);
  assert_eq!(rx.recv().unwrap().unwrap().len(), 2);
}

#[test]
fn test_batch_joins_pending_single_generation() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  let single: Arc<Mutex<Option<Completer<i32, String>>>> = Default::default();
  let recorder = Recorder::new();
  let (tx, rx) = mpsc::channel();

  {
    let single = single.clone();
    cache.generate(
      2,
      move |_, completer| {
        *single.lock().unwrap() = Some(completer);
        None
      },
      |_| {},
    );
  }

  cache.generate_multi(vec![2, 3], recorder.generator(), sender(&tx));
  assert_eq!(recorder.requested(), vec![vec![3]], "2 is already being generated");
  assert_eq!(cache.metrics().coalesced, 1);

  recorder.completer().succeed(vec![(3, "three".to_string())]);
  assert!(rx.try_recv().is_err());

  single.lock().unwrap().take().unwrap().succeed("two".to_string());
  let values = rx.recv().unwrap().unwrap();
  assert_eq!(strings(&values), vec![(2, "two".to_string()), (3, "three".to_string())]);
}

#[test]
fn test_single_request_joins_pending_batch() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  let recorder = Recorder::new();
  let (batch_tx, batch_rx) = mpsc::channel();
  let (tx, rx) = mpsc::channel();

  cache.generate_multi(vec![1, 2], recorder.generator(), sender(&batch_tx));
  cache.generate(
    2,
    |_, _| panic!("2 is already being generated"),
    move |outcome| tx.send(outcome).unwrap(),
  );

  recorder
    .completer()
    .succeed(vec![(1, "one".to_string()), (2, "two".to_string())]);
  assert_eq!(*rx.recv().unwrap().unwrap(), "two");
  assert_eq!(batch_rx.recv().unwrap().unwrap().len(), 2);
}

#[test]
fn test_missing_key_fails_and_partial_success_is_stored() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  let recorder = Recorder::new();
  let (tx, rx) = mpsc::channel();

  cache.generate_multi(vec![1, 2], recorder.generator(), sender(&tx));
  recorder.completer().succeed(vec![(1, "one".to_string()), (42, "ignored".to_string())]);

  assert!(matches!(rx.recv().unwrap(), Err(GenerateError::Missing)));
  assert_eq!(cache.peek(&1).as_deref().map(String::as_str), Some("one"));
  assert!(cache.peek(&2).is_none());
  assert!(cache.peek(&42).is_none());
}

#[test]
fn test_identical_errors_collapse() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  let recorder = Recorder::new();
  let (tx, rx) = mpsc::channel();

  cache.generate_multi(vec![1, 2, 3], recorder.generator(), sender(&tx));
  recorder.completer().fail(GenerateError::msg("upstream timeout"));

  match rx.recv().unwrap() {
    Err(GenerateError::Failed(err)) => assert_eq!(err.to_string(), "upstream timeout"),
    other => panic!("unexpected outcome: {:?}", other),
  }
}

#[test]
fn test_distinct_errors_are_aggregated() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  let recorder = Recorder::new();
  let (tx, rx) = mpsc::channel();

  cache.generate_multi(vec![1, 2, 3], recorder.generator(), sender(&tx));
  recorder.completer().finish(vec![
    (1, Err(GenerateError::msg("disk full"))),
    (2, Ok(Arc::new("two".to_string()))),
    (3, Err(GenerateError::msg("permission denied"))),
  ]);

  match rx.recv().unwrap() {
    Err(GenerateError::Aggregate { first, suppressed }) => {
      assert_eq!(first.to_string(), "disk full");
      assert_eq!(suppressed, 1);
    }
    other => panic!("unexpected outcome: {:?}", other),
  }
  assert!(cache.peek(&2).is_some());
}

#[test]
fn test_cancel_batch_with_error() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  let recorder = Recorder::new();
  let (tx, rx) = mpsc::channel();
  let (single_tx, single_rx) = mpsc::channel();

  let handle = cache.generate_multi(vec![1, 2], recorder.generator(), sender(&tx));
  cache.generate(2, |_, _| None, move |outcome| single_tx.send(outcome).unwrap());
  assert!(handle.is_pending());

  assert!(handle.with_error(GenerateError::msg("shutting down")));
  assert_eq!(rx.recv().unwrap().unwrap_err().to_string(), "shutting down");
  assert_eq!(
    single_rx.recv().unwrap().unwrap_err().to_string(),
    "shutting down",
    "cancel reaches every waiter of the batch's keys"
  );
  assert_eq!(recorder.aborts(), 1);
  assert!(!handle.is_pending());

  assert!(!handle.with_error(GenerateError::msg("again")));
  let completer = recorder.completer();
  assert!(completer.is_canceled());
  completer.succeed(vec![(1, "late".to_string())]);
  assert!(cache.peek(&1).is_none());
  assert!(rx.try_recv().is_err());
  assert_eq!(recorder.aborts(), 1);
}

#[test]
fn test_partial_override() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  let recorder = Recorder::new();
  let (tx, rx) = mpsc::channel();

  let handle = cache.generate_multi(vec![1, 2, 3], recorder.generator(), sender(&tx));
  let resolved = handle.override_with(vec![(1, "override".to_string()), (99, "outside".to_string())]);
  assert_eq!(resolved, 1);
  assert!(rx.try_recv().is_err(), "2 and 3 keep waiting");
  assert!(handle.is_pending());
  assert_eq!(cache.peek(&1).as_deref().map(String::as_str), Some("override"));
  assert!(cache.peek(&99).is_none());

  let completer = recorder.completer();
  assert!(!completer.is_canceled());
  completer.succeed(vec![
    (1, "generated".to_string()),
    (2, "two".to_string()),
    (3, "three".to_string()),
  ]);

  let values = rx.recv().unwrap().unwrap();
  assert_eq!(
    strings(&values),
    vec![(1, "override".to_string()), (2, "two".to_string()), (3, "three".to_string())]
  );
  assert_eq!(cache.peek(&1).as_deref().map(String::as_str), Some("override"));
  assert_eq!(recorder.aborts(), 0, "the generator still owed keys");
}

#[test]
fn test_overriding_every_key_aborts_the_generator() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  let recorder = Recorder::new();
  let (tx, rx) = mpsc::channel();

  let handle = cache.generate_multi(vec![1, 2], recorder.generator(), sender(&tx));
  assert_eq!(handle.override_with(vec![(1, "a".to_string())]), 1);
  assert_eq!(recorder.aborts(), 0);
  assert_eq!(handle.override_with(vec![(2, "b".to_string()), (1, "again".to_string())]), 1);
  assert_eq!(recorder.aborts(), 1);

  assert_eq!(rx.recv().unwrap().unwrap().len(), 2);
  assert!(recorder.completer().is_canceled());
}

#[test]
fn test_batch_admission_trims_once() {
  let cache = CacheBuilder::<i32, String>::new().capacity(2).build().unwrap();
  let recorder = Recorder::new();
  let (tx, rx) = mpsc::channel();

  cache.generate_multi(vec![1, 2, 3], recorder.generator(), sender(&tx));
  recorder.completer().succeed((1..=3).map(|i| (i, i.to_string())));

  assert_eq!(rx.recv().unwrap().unwrap().len(), 3, "waiters get every value");
  assert_eq!(cache.keys().collect::<Vec<_>>(), vec![2, 3]);
  assert_eq!(cache.metrics().evicted_by_capacity, 1);
}

#[test]
fn test_dropped_batch_completer_abandons_keys() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  let (tx, rx) = mpsc::channel();

  cache.generate_multi(
    vec![1, 2],
    |keys, completer| {
      assert_eq!(completer.keys(), keys.as_slice());
      None
    },
    sender(&tx),
  );

  assert!(matches!(rx.recv().unwrap(), Err(GenerateError::Abandoned)));
}
