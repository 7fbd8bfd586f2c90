//! The [`Client`], [`Locker`] and [`Lock`] capability traits.
//!
//! Any backend (in-memory, networked, instrumented) implements these traits
//! to be routable by a mux. The mux itself only ever uses the string
//! commands, the pipeline and the locker; the rest of the surface exists for
//! callers operating on the handle the mux returns.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hmux_types::OpContext;

use crate::error::{StoreError, StoreResult};
use crate::lock::LockOptions;
use crate::pipeline::Pipeline;
use crate::value::{KeyTtl, ScoreRange, ScoredMember};

/// Command surface of a key-value store handle.
///
/// Implementations must be thread-safe (`Send + Sync`). Absence of a key is
/// reported as `Ok(None)`, never as an error.
pub trait Client: Send + Sync + fmt::Debug {
    /// Network address identifying this store, `None` for handles that are
    /// not backed by a store.
    fn addr(&self) -> Option<&str>;

    /// The error every operation on this handle fails with, if it is an
    /// always-failing handle.
    fn failure(&self) -> Option<&StoreError> {
        None
    }

    /// The execution context operations run under.
    fn context(&self) -> &OpContext;

    /// A handle to the same store whose operations run under `ctx`.
    fn with_context(&self, ctx: &OpContext) -> Arc<dyn Client>;

    fn ping(&self) -> StoreResult<()>;

    /// Close the underlying connection. Subsequent commands fail.
    fn close(&self) -> StoreResult<()>;

    // ---- Strings and keys ----

    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set `key` to `value`, replacing any previous value and TTL.
    /// `ttl: None` stores the key without expiry.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Set `key` only if it does not exist. Returns `true` if it was set.
    fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<bool>;

    fn mget(&self, keys: &[&str]) -> StoreResult<Vec<Option<String>>>;

    /// Set every pair. Like `set`, clears any TTL on the written keys.
    fn mset(&self, pairs: &[(&str, &str)]) -> StoreResult<()>;

    /// Delete keys, returning how many existed.
    fn del(&self, keys: &[&str]) -> StoreResult<u64>;

    /// Count how many of `keys` exist.
    fn exists(&self, keys: &[&str]) -> StoreResult<u64>;

    fn ttl(&self, key: &str) -> StoreResult<KeyTtl>;

    /// Set a TTL on an existing key. Returns `false` if the key is missing.
    fn pexpire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    // ---- Hashes ----

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Returns `true` if `field` is new.
    fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<bool>;

    fn hmset(&self, key: &str, fields: &[(&str, &str)]) -> StoreResult<()>;

    fn hmget(&self, key: &str, fields: &[&str]) -> StoreResult<Vec<Option<String>>>;

    fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<u64>;

    fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    // ---- Lists ----

    /// Append values, returning the new list length.
    fn rpush(&self, key: &str, values: &[&str]) -> StoreResult<u64>;

    fn lpop(&self, key: &str) -> StoreResult<Option<String>>;

    /// Elements between `start` and `stop` inclusive. Negative indices count
    /// from the end.
    fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;

    /// Pop the tail of `source` and push it onto the head of `destination`.
    fn rpoplpush(&self, source: &str, destination: &str) -> StoreResult<Option<String>>;

    // ---- Sets ----

    fn sadd(&self, key: &str, members: &[&str]) -> StoreResult<u64>;

    fn srem(&self, key: &str, members: &[&str]) -> StoreResult<u64>;

    /// Members in lexicographic order.
    fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;

    fn scard(&self, key: &str) -> StoreResult<u64>;

    // ---- Sorted sets ----

    /// Add or update members, returning how many were new.
    fn zadd(&self, key: &str, members: &[ScoredMember]) -> StoreResult<u64>;

    fn zrem(&self, key: &str, members: &[&str]) -> StoreResult<u64>;

    fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>>;

    fn zcard(&self, key: &str) -> StoreResult<u64>;

    /// Zero-based rank in ascending score order.
    fn zrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>>;

    fn zrange_by_score(&self, key: &str, range: ScoreRange) -> StoreResult<Vec<String>>;

    fn zrange_by_score_with_scores(&self, key: &str, range: ScoreRange) -> StoreResult<Vec<ScoredMember>>;

    fn zrev_range_by_score(&self, key: &str, range: ScoreRange) -> StoreResult<Vec<String>>;

    // ---- Pipelines ----

    /// Execute every step of `pipeline` atomically: either all steps apply or
    /// none do.
    fn exec(&self, pipeline: &Pipeline) -> StoreResult<()>;
}

/// A held distributed lock.
pub trait Lock: Send + Sync + fmt::Debug {
    fn key(&self) -> &str;

    /// Free the lock so other holders can obtain it.
    ///
    /// Fails with [`StoreError::LockNotHeld`] if the lock already expired or
    /// was taken over.
    fn release(&self) -> StoreResult<()>;
}

/// Distributed mutual exclusion over named keys.
pub trait Locker: Send + Sync {
    /// Try to lock `key` for `ttl`, retrying per `opts`.
    ///
    /// Returns `Ok(None)` when the retry policy is exhausted while the lock
    /// is held elsewhere, and `Err` when the store itself failed.
    fn obtain(&self, key: &str, ttl: Duration, opts: &LockOptions) -> StoreResult<Option<Box<dyn Lock>>>;
}

/// A client that also provides distributed locking, used as the mux's
/// coordination store.
pub trait LockerClient: Client + Locker {
    /// Like [`Client::with_context`], keeping the locker capability.
    fn with_locker_context(&self, ctx: &OpContext) -> Arc<dyn LockerClient>;
}
