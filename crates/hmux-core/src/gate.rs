//! Per-hash mutual exclusion.
//!
//! The gate takes a distributed lock named after the hash, runs a critical
//! section, and releases the lock on every exit path including unwinding.
//! Exclusion lives entirely in the coordination store, so gates in
//! different processes sharing one store exclude each other.

use std::sync::Arc;
use std::time::Duration;

use hmux_store::{Lock, LockOptions, LockerClient, StoreError, StoreResult};
use hmux_types::{Hash, OpContext};
use tracing::{trace, warn};

/// Runs critical sections under a per-hash lock.
#[derive(Clone)]
pub struct LockGate {
    locker: Arc<dyn LockerClient>,
    ttl: Duration,
    opts: LockOptions,
}

impl LockGate {
    pub fn new(locker: Arc<dyn LockerClient>, ttl: Duration, opts: LockOptions) -> Self {
        Self { locker, ttl, opts }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn options(&self) -> &LockOptions {
        &self.opts
    }

    /// Same settings, locking through `locker`.
    pub fn bind(&self, locker: Arc<dyn LockerClient>) -> Self {
        Self {
            locker,
            ttl: self.ttl,
            opts: self.opts,
        }
    }

    /// Same settings, locking under `ctx`.
    pub fn with_context(&self, ctx: &OpContext) -> Self {
        self.bind(self.locker.with_locker_context(ctx))
    }

    /// Run `f` while holding the lock on `hash`.
    ///
    /// Contention yields [`StoreError::LockNotObtained`]; a store failure while
    /// obtaining yields that failure. `f` does not run in either case.
    pub fn with_lock_on<T>(&self, hash: &Hash, f: impl FnOnce() -> T) -> StoreResult<T> {
        let key = hash.as_str();
        let lock = match self.locker.obtain(key, self.ttl, &self.opts) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                warn!(hash = %hash, ttl_ms = self.ttl.as_millis() as u64, "lock contended, not obtained");
                return Err(StoreError::LockNotObtained { key: key.to_string() });
            }
            Err(err) => {
                warn!(hash = %hash, error = %err, "lock store failure");
                return Err(err);
            }
        };
        trace!(hash = %hash, "lock held");
        let _guard = LockGuard { lock };
        Ok(f())
    }
}

impl std::fmt::Debug for LockGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGate")
            .field("locker", &self.locker.addr())
            .field("ttl", &self.ttl)
            .field("opts", &self.opts)
            .finish()
    }
}

/// Releases the lock when dropped.
struct LockGuard {
    lock: Box<dyn Lock>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // A lock that outlived its TTL is already gone; nothing to undo.
        if let Err(err) = self.lock.release() {
            warn!(key = self.lock.key(), error = %err, "lock release failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmux_store::{Client, InMemoryStore, Locker};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    fn quick() -> LockOptions {
        LockOptions {
            min_backoff: Duration::from_millis(2),
            max_backoff: Duration::from_millis(8),
            max_wait: Some(Duration::from_millis(40)),
        }
    }

    fn gate(store: &InMemoryStore) -> LockGate {
        LockGate::new(Arc::new(store.clone()), Duration::from_secs(10), quick())
    }

    // =========================================================================
    // Acquire and release
    // =========================================================================

    #[test]
    fn runs_section_and_releases() {
        let store = InMemoryStore::new("coord:1");
        let g = gate(&store);
        let hash = Hash::new("h1");
        let out = g
            .with_lock_on(&hash, || store.exists(&["h1"]).unwrap())
            .unwrap();
        assert_eq!(out, 1, "lock key is the raw hash while held");
        assert_eq!(store.exists(&["h1"]).unwrap(), 0, "released after");
    }

    #[test]
    fn contention_is_lock_not_obtained() {
        let store = InMemoryStore::new("coord:1");
        let held = store
            .obtain("h1", Duration::from_secs(10), &LockOptions::default())
            .unwrap()
            .unwrap();
        let ran = AtomicBool::new(false);
        let err = gate(&store)
            .with_lock_on(&Hash::new("h1"), || ran.store(true, Ordering::SeqCst))
            .unwrap_err();
        assert_eq!(err, StoreError::LockNotObtained { key: "h1".into() });
        assert!(err.is_contention());
        assert!(!ran.load(Ordering::SeqCst));
        held.release().unwrap();
    }

    #[test]
    fn store_failure_is_propagated() {
        let store = InMemoryStore::new("coord:1");
        store.fail_command("obtain", StoreError::Unavailable("coord down".into()));
        let err = gate(&store).with_lock_on(&Hash::new("h1"), || ()).unwrap_err();
        assert_eq!(err, StoreError::Unavailable("coord down".into()));
        assert!(!err.is_contention());
    }

    #[test]
    fn release_failure_does_not_fail_section() {
        let store = InMemoryStore::new("coord:1");
        let out = gate(&store).with_lock_on(&Hash::new("h1"), || {
            store.fail_command("release", StoreError::Unavailable("flaky".into()));
            7
        });
        assert_eq!(out, Ok(7));
        store.clear_failures();
        // Lock still recorded; it expires on its own TTL.
        assert_eq!(store.exists(&["h1"]).unwrap(), 1);
    }

    #[test]
    fn released_when_section_panics() {
        let store = InMemoryStore::new("coord:1");
        let g = gate(&store);
        let result = catch_unwind(AssertUnwindSafe(|| {
            g.with_lock_on(&Hash::new("h1"), || panic!("boom")).ok();
        }));
        assert!(result.is_err());
        assert_eq!(store.exists(&["h1"]).unwrap(), 0);
        assert!(g.with_lock_on(&Hash::new("h1"), || ()).is_ok());
    }

    // =========================================================================
    // Concurrency
    // =========================================================================

    #[test]
    fn second_caller_sees_contention_then_succeeds() {
        let store = InMemoryStore::new("coord:1");
        let g = gate(&store);
        let (entered_tx, entered_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let first = {
            let g = g.clone();
            thread::spawn(move || {
                g.with_lock_on(&Hash::new("same-hash"), || {
                    entered_tx.send(()).unwrap();
                    done_rx.recv().unwrap();
                })
            })
        };
        entered_rx.recv().unwrap();
        let err = g.with_lock_on(&Hash::new("same-hash"), || ()).unwrap_err();
        assert!(err.is_contention());

        done_tx.send(()).unwrap();
        first.join().unwrap().unwrap();
        assert!(g.with_lock_on(&Hash::new("same-hash"), || ()).is_ok());
    }

    #[test]
    fn waiting_caller_runs_after_release() {
        let store = InMemoryStore::new("coord:1");
        let patient = LockGate::new(
            Arc::new(store.clone()),
            Duration::from_secs(10),
            LockOptions {
                max_wait: Some(Duration::from_secs(5)),
                ..quick()
            },
        );
        let (entered_tx, entered_rx) = mpsc::channel();
        let first = {
            let g = patient.clone();
            thread::spawn(move || {
                g.with_lock_on(&Hash::new("same-hash"), || {
                    entered_tx.send(Instant::now()).unwrap();
                    thread::sleep(Duration::from_millis(50));
                    Instant::now()
                })
            })
        };
        entered_rx.recv().unwrap();
        let second_started = patient.with_lock_on(&Hash::new("same-hash"), Instant::now).unwrap();
        let first_finished = first.join().unwrap().unwrap();
        assert!(second_started >= first_finished, "sections must not overlap");
    }

    #[test]
    fn different_hashes_do_not_contend() {
        let store = InMemoryStore::new("coord:1");
        let g = gate(&store);
        let out = g
            .with_lock_on(&Hash::new("a"), || g.with_lock_on(&Hash::new("b"), || 1))
            .unwrap();
        assert_eq!(out, Ok(1));
    }

    #[test]
    fn expired_context_bounds_wait() {
        let store = InMemoryStore::new("coord:1");
        let ctx = OpContext::background().with_timeout(Duration::ZERO);
        let err = gate(&store).with_context(&ctx).with_lock_on(&Hash::new("h"), || ()).unwrap_err();
        assert!(matches!(err, StoreError::DeadlineExceeded { .. }));
    }
}
