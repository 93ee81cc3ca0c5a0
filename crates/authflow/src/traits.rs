//! Traits for the injected host-environment collaborators
//!
//! The core owns the protocol logic only; persistence, navigation, and the
//! reactive state container are host concerns injected through these seams.
//! All three are synchronous by contract, matching the single-turn semantics
//! of the browser APIs they stand in for.

use std::collections::HashMap;

use crate::types::{AuthConfig, AuthToken};

/// Trait for raw key-value persistence
///
/// Implementations must never fail: when the backing store is unavailable
/// (non-interactive rendering, disabled storage), reads return `None` and
/// writes/deletes silently no-op.
pub trait StorageBackend: Send + Sync {
    /// Read the raw value stored under `key`, or `None` when absent or the
    /// store is unavailable.
    fn read(&self, key: &str) -> Option<String>;

    /// Write `value` under `key`. No-op when the store is unavailable.
    fn write(&self, key: &str, value: &str);

    /// Delete the entry under `key`. No-op when absent or unavailable.
    fn delete(&self, key: &str);
}

/// Backend standing in when no persistent store exists
///
/// Every operation no-ops; reads always miss. Lets the rest of the flow run
/// in non-browser execution contexts without special-casing.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStorage;

impl StorageBackend for UnavailableStorage {
    fn read(&self, _key: &str) -> Option<String> {
        None
    }

    fn write(&self, _key: &str, _value: &str) {}

    fn delete(&self, _key: &str) {}
}

/// Trait for location and history control
///
/// `redirect` is a terminal action: it hands control to an external origin
/// and nothing after it in the calling code executes in the same page
/// lifetime. Callers must not assume execution continues past it.
pub trait Navigator: Send + Sync {
    /// Replace the current location with `url` (replace, not push).
    fn redirect(&self, url: &str);

    /// Reload the current page, resetting in-memory state.
    fn reload(&self);

    /// Parse the current location's query parameters into a flat mapping.
    fn query_params(&self) -> HashMap<String, String>;

    /// Strip query parameters from the visible URL without navigating
    /// (history replace).
    fn strip_query(&self);
}

/// Discrete update published to the reactive state container
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// The session configuration became available
    SetConfig(AuthConfig),

    /// A token payload was saved (may carry a provider `error`)
    SetToken(AuthToken),

    /// A terminal error message surfaced to consumers
    SetError(String),
}

/// Trait for the reactive state projection
///
/// The core dispatches every successful token save and every terminal error
/// exactly once, synchronously before the triggering async operation
/// resolves to its caller. How updates re-render consumers is the host's
/// business.
pub trait StateSink: Send + Sync {
    /// Publish one state update.
    fn dispatch(&self, event: AuthEvent);
}
