use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("hash must not be empty")]
    EmptyHash,

    #[error("backend identifier must not be empty")]
    EmptyBackendId,
}
