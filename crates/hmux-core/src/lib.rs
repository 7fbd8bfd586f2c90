//! Hash multiplexer.
//!
//! Routes each hash to one of a fixed set of backend stores and keeps it
//! there. Assignments live in a shared coordination store and are drawn
//! under a per-hash distributed lock, so any number of muxes sharing that
//! store agree on where a hash lives.

pub mod config;
pub mod draw;
pub mod error;
pub mod gate;
pub mod mux;
pub mod registry;

pub use config::{MuxConfig, MuxOptions, DEFAULT_HASH_KEY_PREFIX, DEFAULT_WITH_LOCK_ON_TTL};
pub use draw::{DrawSource, RngDraw, ScriptedDraw};
pub use error::{MuxError, MuxResult};
pub use gate::LockGate;
pub use mux::{BaseMux, Mux};
pub use registry::BackendRegistry;

// Re-export key types
pub use hmux_store::{Client, ErrClient, LockOptions, LockerClient, StoreError, StoreResult};
pub use hmux_types::{BackendId, Hash, OpContext};
