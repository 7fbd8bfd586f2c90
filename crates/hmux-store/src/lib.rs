//! Store capabilities consumed by hashmux.
//!
//! A mux routes each hash to one of several backend stores and records the
//! assignment in a shared coordination store. This crate defines what both
//! kinds of store must offer and ships an in-memory implementation.
//!
//! # Capabilities
//!
//! - [`Client`]: key-value command surface (strings, hashes, lists, sets,
//!   sorted sets, atomic pipelines)
//! - [`Locker`] / [`Lock`]: distributed mutual exclusion with retry policy
//!   [`LockOptions`]
//! - [`LockerClient`]: both of the above; required of the coordination store
//!
//! # Implementations
//!
//! - [`InMemoryStore`]: `HashMap`-based store with TTLs, locks and fail
//!   points, for tests, embedding and simulation
//! - [`ErrClient`]: always-failing handle carrying a routing failure
//!
//! # Design Rules
//!
//! 1. A missing key is `Ok(None)`, never an error.
//! 2. `Locker::obtain` separates contention (`Ok(None)`) from store failure
//!    (`Err`).
//! 3. Pipelines are all-or-nothing.
//! 4. Handles bound to an [`OpContext`](hmux_types::OpContext) share data
//!    with the handle they were derived from.

pub mod err_client;
pub mod error;
pub mod lock;
pub mod memory;
pub mod pipeline;
pub mod traits;
pub mod value;

pub use err_client::ErrClient;
pub use error::{StoreError, StoreResult};
pub use lock::{ExponentialBackoff, LockOptions};
pub use memory::{InMemoryStore, MemoryLock};
pub use pipeline::{Pipeline, PipelineOp};
pub use traits::{Client, Lock, Locker, LockerClient};
pub use value::{KeyTtl, ScoreRange, ScoredMember};
