//! Serde-friendly cache options, as they appear in configuration files.
//!
//! Durations are plain milliseconds. Besides the camelCase names, the
//! older names `timeout` (for `maxAge`) and `lifetime` (for `minAge`) are
//! accepted, as are snake_case spellings.

use crate::builder::CacheBuilder;
use crate::error::BuildError;

use std::hash::BuildHasher;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The six options a cache can be configured with.
///
/// Absent or zero values leave the corresponding feature off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheOptions {
  /// Maximum number of entries. Zero or absent means unbounded.
  pub capacity: Option<i64>,
  /// Hard expiry in milliseconds.
  #[serde(alias = "timeout", alias = "max_age")]
  pub max_age: Option<i64>,
  /// Soft expiry in milliseconds.
  #[serde(alias = "lifetime", alias = "min_age")]
  pub min_age: Option<i64>,
  /// Enables both `retime_on_access` and `relive_on_access`.
  #[serde(alias = "reset_timers_on_access")]
  pub reset_timers_on_access: bool,
  #[serde(alias = "retime_on_access")]
  pub retime_on_access: bool,
  #[serde(alias = "relive_on_access")]
  pub relive_on_access: bool,
}

fn millis(value: Option<i64>, negative: fn(i64) -> BuildError) -> Result<Option<Duration>, BuildError> {
  match value {
    Some(ms) if ms < 0 => Err(negative(ms)),
    Some(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms as u64))),
    _ => Ok(None),
  }
}

impl<K, V, H> TryFrom<CacheOptions> for CacheBuilder<K, V, H>
where
  H: BuildHasher + Default,
{
  type Error = BuildError;

  fn try_from(options: CacheOptions) -> Result<Self, Self::Error> {
    let capacity = match options.capacity {
      Some(capacity) if capacity < 0 => return Err(BuildError::NegativeCapacity(capacity)),
      Some(capacity) => usize::try_from(capacity).unwrap_or(usize::MAX),
      None => 0,
    };
    let max_age = millis(options.max_age, BuildError::NegativeMaxAge)?;
    let min_age = millis(options.min_age, BuildError::NegativeMinAge)?;

    let mut builder = CacheBuilder::new()
      .capacity(capacity)
      .retime_on_access(options.reset_timers_on_access || options.retime_on_access)
      .relive_on_access(options.reset_timers_on_access || options.relive_on_access);
    if let Some(max_age) = max_age {
      builder = builder.max_age(max_age);
    }
    if let Some(min_age) = min_age {
      builder = builder.min_age(min_age);
    }
    Ok(builder)
  }
}
