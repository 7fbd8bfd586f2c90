//! Foundation types for hashmux.
//!
//! This crate provides the identity and context types shared by every other
//! hashmux crate.
//!
//! # Key Types
//!
//! - [`Hash`]: Caller-chosen routing key, mapped to exactly one backend
//! - [`BackendId`]: Stable identifier (network address) of a backend store
//! - [`OpContext`]: Deadline and tracing scope bound to store handles
//!
//! The [`duration`] module holds serde helpers for millisecond-encoded
//! durations used by configuration types.

pub mod context;
pub mod duration;
pub mod error;
pub mod identity;

pub use context::OpContext;
pub use error::TypeError;
pub use identity::{BackendId, Hash};
