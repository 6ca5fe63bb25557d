//! Re-exports the workspace's unified error type.
//!
//! Kept as its own module (rather than inlined into `lib.rs`) to mirror the
//! rest of the workspace's one-module-per-concern layout.

pub use keyrouter_types::{ErrorCategory, RouterError};
