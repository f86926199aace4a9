//! Coalesces concurrent requests for the same keys.
//!
//! Each key with a generation in flight has one [`group::WaiterGroup`]
//! registered in the cache's pending table. `single` serves one key per
//! request, `multi` serves key sets and feeds many groups from one
//! generator call.

pub(crate) mod group;
pub(crate) mod multi;
pub(crate) mod single;
