/// Errors from store and lock operations.
///
/// Errors are `Clone` so that an [`ErrClient`](crate::ErrClient) can hand the
/// same failure back from every operation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or refused the command.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The execution context deadline passed before the command completed.
    #[error("deadline exceeded during {command}")]
    DeadlineExceeded { command: &'static str },

    /// The handle was closed.
    #[error("store client is closed")]
    Closed,

    /// The key holds a value of a different type than the command expects.
    #[error("WRONGTYPE operation against key {key} holding the wrong kind of value")]
    WrongType { key: String },

    /// A command argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The lock retry policy was exhausted without obtaining the lock.
    #[error("couldn't obtain lock for {key}")]
    LockNotObtained { key: String },

    /// The lock was released or expired before `release` was called.
    #[error("lock for {key} is not held")]
    LockNotHeld { key: String },

    /// A routing decision failed; the handle reproduces it on every call.
    #[error("routing failed: {0}")]
    Routing(String),
}

impl StoreError {
    /// Returns `true` for lock contention, as opposed to infrastructure
    /// failures.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::LockNotObtained { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
