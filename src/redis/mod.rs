//! Redis-backed window store.

pub(crate) mod procedure;

pub(crate) mod redis_window_store;
pub use redis_window_store::*;
