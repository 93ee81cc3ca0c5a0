//! Mock implementations of the host-environment traits
//!
//! Provides in-memory stand-ins for storage, navigation, and the reactive
//! state sink, used by this crate's unit and integration tests and available
//! to downstream test suites.

// Mocks are deliberately simple; their errors are visible in their return
// types.
#![allow(clippy::missing_panics_doc)]

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::traits::{AuthEvent, Navigator, StateSink, StorageBackend};
use crate::types::AuthToken;

/// In-memory storage backend
///
/// # Examples
///
/// ```
/// use authflow::testing::MemoryStorage;
/// use authflow::traits::StorageBackend;
///
/// let storage = MemoryStorage::new();
/// storage.write("auth", "{}");
/// assert_eq!(storage.read("auth").as_deref(), Some("{}"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty storage backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot all stored entries (raw JSON strings by key).
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.lock().clone()
    }
}

impl StorageBackend for MemoryStorage {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// Mock navigator recording redirects, reloads, and query scrubs
#[derive(Debug, Default)]
pub struct MockNavigator {
    redirects: Mutex<Vec<String>>,
    reloads: Mutex<usize>,
    strips: Mutex<usize>,
    query: Mutex<HashMap<String, String>>,
}

impl MockNavigator {
    /// Create a navigator with an empty query string.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the query parameters the next `query_params` call returns.
    pub fn set_query(&self, pairs: &[(&str, &str)]) {
        *self.query.lock() =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
    }

    /// All URLs passed to `redirect`, in order.
    #[must_use]
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }

    /// The most recent redirect URL, if any.
    #[must_use]
    pub fn last_redirect(&self) -> Option<String> {
        self.redirects.lock().last().cloned()
    }

    /// Number of `reload` calls.
    #[must_use]
    pub fn reload_count(&self) -> usize {
        *self.reloads.lock()
    }

    /// Number of `strip_query` calls.
    #[must_use]
    pub fn strip_count(&self) -> usize {
        *self.strips.lock()
    }
}

impl Navigator for MockNavigator {
    fn redirect(&self, url: &str) {
        self.redirects.lock().push(url.to_string());
    }

    fn reload(&self) {
        *self.reloads.lock() += 1;
    }

    fn query_params(&self) -> HashMap<String, String> {
        self.query.lock().clone()
    }

    fn strip_query(&self) {
        self.query.lock().clear();
        *self.strips.lock() += 1;
    }
}

/// State sink recording every dispatched event
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AuthEvent>>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All dispatched events, in order.
    #[must_use]
    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().clone()
    }

    /// All dispatched token payloads, in order.
    #[must_use]
    pub fn tokens(&self) -> Vec<AuthToken> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                AuthEvent::SetToken(token) => Some(token.clone()),
                _ => None,
            })
            .collect()
    }

    /// The most recent dispatched error message, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.events
            .lock()
            .iter()
            .rev()
            .find_map(|event| match event {
                AuthEvent::SetError(message) => Some(message.clone()),
                _ => None,
            })
    }

    /// Drop all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl StateSink for RecordingSink {
    fn dispatch(&self, event: AuthEvent) {
        self.events.lock().push(event);
    }
}
