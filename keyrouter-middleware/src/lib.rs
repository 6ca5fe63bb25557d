//! keyrouter-middleware
//!
//! Per-key runtime tracking that backs `KeyManager`: quota-window
//! classification (`QuotaAwarenessEngine`) and throttle cooldown tracking
//! (`CooldownTracker`). Grounded on the teacher's `QuotaAwareConnector` and
//! `BlacklistConnector`, restructured from per-connector to per-`APIKey`
//! state since this workspace scopes both concerns to a key, not to a
//! wrapped provider connection.
#![warn(missing_docs)]

mod cooldown;
mod quota;

pub use crate::cooldown::CooldownTracker;
pub use crate::quota::QuotaAwarenessEngine;
