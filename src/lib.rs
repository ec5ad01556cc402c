#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod rate_limiter;
pub use rate_limiter::*;

mod common;
pub use common::*;

mod window;
pub use window::{TierVerdict, WindowState, current_bucket};

mod coordinator;

mod procedure;
pub use procedure::*;

mod store;
pub use store::*;

mod clock;
pub use clock::*;

pub mod local;
pub use local::*;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
pub mod redis;
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
pub use redis::*;

mod error;
pub use error::*;

#[cfg(test)]
mod tests;
