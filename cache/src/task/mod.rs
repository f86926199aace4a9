//! Background and deferred work for the cache: the deadline-ordered timer
//! queue and the janitor that drives it.

pub(crate) mod janitor;
pub(crate) mod timer;
