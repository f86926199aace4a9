use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// The configured capacity was negative.
  #[error("capacity cannot be negative (got {0})")]
  NegativeCapacity(i64),
  /// The configured maximum age (`maxAge`/`timeout`) was negative.
  #[error("max age cannot be negative (got {0}ms)")]
  NegativeMaxAge(i64),
  /// The configured minimum age (`minAge`/`lifetime`) was negative.
  #[error("min age cannot be negative (got {0}ms)")]
  NegativeMinAge(i64),
  /// The janitor was configured to tick every zero seconds.
  #[error("janitor tick interval cannot be zero")]
  ZeroTickInterval,
}

/// The outcome of a generation, shared by every caller waiting on the key.
///
/// Errors are cheap to clone so one failure can be delivered to any number
/// of waiters.
#[derive(Debug, Clone, Error)]
pub enum GenerateError {
  /// The generator (or whoever canceled the generation) reported a failure.
  #[error("{0}")]
  Failed(Arc<dyn StdError + Send + Sync>),
  /// A batch generator finished without producing a result for the key.
  #[error("generator produced no value for the key")]
  Missing,
  /// The key was deleted, or the cache cleared, while its value was being
  /// generated.
  #[error("key was deleted while its value was being generated")]
  Deleted,
  /// The generator dropped its completer without finishing.
  #[error("generator was dropped before producing a value")]
  Abandoned,
  /// Several keys of one batch failed with distinct errors. `first` is the
  /// representative error; `suppressed` counts the other distinct failures.
  #[error("{first} (and {suppressed} other distinct failures)")]
  Aggregate {
    first: Box<GenerateError>,
    suppressed: usize,
  },
}

impl GenerateError {
  /// Wraps any error as a generation failure.
  pub fn new<E>(error: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    GenerateError::Failed(Arc::new(error))
  }

  /// Builds a generation failure from a plain message.
  pub fn msg(message: impl Into<String>) -> Self {
    GenerateError::Failed(Arc::new(Message(message.into())))
  }

  /// True when both errors are the very same failure (the same shared
  /// allocation), not merely equal messages.
  pub fn same_as(&self, other: &GenerateError) -> bool {
    match (self, other) {
      (GenerateError::Failed(a), GenerateError::Failed(b)) => Arc::ptr_eq(a, b),
      (GenerateError::Missing, GenerateError::Missing) => true,
      (GenerateError::Abandoned, GenerateError::Abandoned) => true,
      (GenerateError::Deleted, GenerateError::Deleted) => true,
      (
        GenerateError::Aggregate { first: a, suppressed: x },
        GenerateError::Aggregate { first: b, suppressed: y },
      ) => x == y && a.same_as(b),
      _ => false,
    }
  }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn clones_share_the_failure() {
    let err = GenerateError::msg("Toasted Wheats");
    let clone = err.clone();
    assert!(err.same_as(&clone));
    assert_eq!(clone.to_string(), "Toasted Wheats");
  }

  #[test]
  fn equal_messages_are_not_the_same_failure() {
    let a = GenerateError::msg("boom");
    let b = GenerateError::msg("boom");
    assert!(!a.same_as(&b));
    assert_eq!(a.to_string(), b.to_string());
  }

  #[test]
  fn aggregate_mentions_suppressed_count() {
    let err = GenerateError::Aggregate {
      first: Box::new(GenerateError::msg("disk on fire")),
      suppressed: 2,
    };
    assert_eq!(err.to_string(), "disk on fire (and 2 other distinct failures)");
  }
}
