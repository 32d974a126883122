//! # lid-core
//!
//! Distributed mutual-exclusion locks keyed by a signature.
//! A lock is held by one signee at a time, carries a priority level and
//! expires after a lease duration. Higher levels preempt, expired leases
//! are free for the taking, and only the holder may unlock.

pub mod client;
pub mod clock;
pub mod condition;
pub mod error;
pub mod infrastructure;
#[path = "infrastructure_conditional.rs"]
pub mod infrastructure_conditional;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
pub mod protocol;
pub mod provision;
pub mod script;
pub mod store;
pub mod store_in_memory;
#[cfg(feature = "sqlite")]
pub mod store_sqlite;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use client::LidClient;
pub use error::{ErrorKind, LockError};
pub use infrastructure::{LockService, LockServiceExt};

#[cfg(test)]
mod protocol_test;
#[cfg(test)]
mod script_test;
