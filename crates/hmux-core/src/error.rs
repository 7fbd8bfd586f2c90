use thiserror::Error;

/// Errors raised while building a mux.
///
/// Routing failures at runtime are not `MuxError`s: they surface as the
/// [`StoreError`](hmux_store::StoreError) carried by an
/// [`ErrClient`](hmux_store::ErrClient).
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid backend: {0}")]
    Backend(#[from] hmux_types::TypeError),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config encode error: {0}")]
    Encode(#[from] toml::ser::Error),
}

pub type MuxResult<T> = Result<T, MuxError>;
