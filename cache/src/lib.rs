//! An in-process LRU cache that bounds both its size and the age of its
//! entries, and coalesces concurrent requests to produce a missing value.
//!
//! # Features
//! - **Capacity**: a maximum entry count, enforced by evicting the least
//!   recently accessed entries.
//! - **Hard expiry** (`max_age`): entries are deleted a fixed time after
//!   they were written, or last read with `retime_on_access`.
//! - **Soft expiry** (`min_age`): after a while the cache stops pinning a
//!   value and only keeps it as long as someone else still holds its `Arc`.
//! - **Coalesced generation**: `generate` and `generate_multi` run at most
//!   one generator per key at a time and deliver its outcome to every
//!   caller, with cancellation and partial override of in-flight work.
//! - **Sync & Async waiting**: `fetch_with` returns a handle that can be
//!   waited on by a thread or awaited by a task.
//! - **Observability**: metrics snapshots, eviction listeners and `tracing`
//!   events.

// Public modules that form the API
pub mod builder;
#[cfg(feature = "serde")]
pub mod config;
pub mod error;
pub mod handles;
pub mod iter;
pub mod listener;
pub mod metrics;

// Internal, crate-only modules
mod coordinator;
mod entry;
mod eviction;
mod loader;
mod lru_list;
mod shared;
mod store;
mod task;
mod time;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
#[cfg(feature = "serde")]
pub use config::CacheOptions;
pub use coordinator::group::{AbortHandle, Outcome};
pub use coordinator::multi::{BatchCancelHandle, BatchCompleter, BatchOutcome};
pub use coordinator::single::{CancelHandle, Completer};
pub use error::{BuildError, GenerateError};
pub use handles::Cache;
pub use listener::{EvictionListener, EvictionReason};
pub use loader::Generation;
pub use metrics::MetricsSnapshot;
