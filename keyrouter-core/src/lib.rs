//! keyrouter-core
//!
//! Core traits shared across the keyrouter workspace.
//!
//! - `provider_adapter`: the `ProviderAdapter` trait, the single seam between
//!   the routing engine and a credentialed HTTP provider.
//! - `state_store`: the `StateStore` trait, the durable persistence seam.
#![warn(missing_docs)]

/// Error re-exports shared by orchestrator and adapters.
pub mod error;
/// The `ProviderAdapter` trait.
pub mod provider_adapter;
/// The `StateStore` trait.
pub mod state_store;

pub use error::{ErrorCategory, RouterError};
pub use provider_adapter::{Capability, ProviderAdapter, heuristic_output_tokens};
pub use state_store::{KeyUpdateFn, StateStore};
