//! xpromo-core: cross-promotion interstitial state and attribution links
//!
//! Decides whether a session may see the app-install interstitial and builds
//! the attributed deep link the interstitial points at.
//!
//! # Architecture
//!
//! ```text
//! SessionState ─→ Eligibility (incognito → storage → cooldown) ─→ verdict
//!      │                              ↑
//!      │                  DismissalClock ← StorageGate ← KeyValueStore
//!      ↓
//! attribution + base payloads ─→ finalize_payload ─→ LinkFormatter ─→ URL
//! ```
//!
//! # Modules
//!
//! - `xpromo`: the [`XPromo`] facade over everything below
//! - `storage`: key/value store trait, memory and JSON-file stores, storage gate
//! - `dismissal`: closing timestamps, frequencies and cooldown windows
//! - `eligibility`: ordered banner checks, interstitial type, listing-click snapshot
//! - `payload`: ordered field map and merge rules
//! - `attribution`: attribution and base payload builders
//! - `listing_click`: deep-link path for a listing click
//! - `link`: URL formatter
//! - `session`: serialized session state, cookies and identity
//! - `collaborators`: traits for experiment, page, analytics and tag lookups
//! - `clock`: injectable wall clock
//! - `config`: `xpromo.toml` loading
//! - `logging`: tracing subscriber setup
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod attribution;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod dismissal;
pub mod eligibility;
pub mod error;
pub mod link;
pub mod listing_click;
pub mod logging;
pub mod payload;
pub mod session;
pub mod storage;
pub mod xpromo;

pub use error::{Error, Result, StorageError};
pub use xpromo::XPromo;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
