//! In-process window store.
//!
//! The local store keeps window state inside the current process using a
//! [`DashMap`](dashmap::DashMap) of per-key mutexes.
//!
//! # Key Characteristics
//!
//! - **Atomic per request:** all tiers of one request are evaluated and committed under lock
//! - **Zero external dependencies:** No network or database required
//! - **Process-scoped:** State is not shared across processes
//!
//! # When to Use
//!
//! ✅ **Use the local store when:**
//! - Single-process application
//! - Tests and simulations that need deterministic, server-free behaviour
//!
//! ❌ **Don't use the local store when:**
//! - Multiple application instances need shared limits
//! - Limits must survive process restarts

mod local_window_store;
pub use local_window_store::*;
