//! Namespaced credential storage layered on top of a [`StorageBackend`]
//!
//! Persists the long-lived token and the short-lived handshake record as
//! JSON under namespaced keys. Writes shallow-merge into any existing stored
//! object (field-level overwrite, not replacement), which is the adapter's
//! contract: callers send partial updates and untouched fields survive.
//!
//! Every operation is best-effort: parse failures and unavailable backends
//! degrade to misses and no-ops, never to errors or panics, so the adapter
//! is safe to call from non-interactive execution contexts.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::traits::StorageBackend;

/// Storage key for the persisted token (namespace prefix applied on top)
pub const TOKEN_KEY: &str = "auth";

/// Storage key for the ephemeral handshake record
pub const HANDSHAKE_KEY: &str = "auth-handshake";

/// Namespaced read/merge-write/delete over persisted key-value state
#[derive(Debug, Clone)]
pub struct CredentialStore<S: StorageBackend> {
    backend: Arc<S>,
    prefix: String,
}

impl<S: StorageBackend> CredentialStore<S> {
    /// Create a store over `backend`, prefixing every key with `prefix`
    /// (`""` or `"{name}."` — see [`crate::AuthConfig::storage_prefix`]).
    #[must_use]
    pub fn new(backend: Arc<S>, prefix: impl Into<String>) -> Self {
        Self { backend, prefix: prefix.into() }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Read and parse the structured value under `key`
    ///
    /// Returns `None` when the entry is absent, the backend is unavailable,
    /// or the stored value does not parse as `T`.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let scoped = self.scoped(key);
        let raw = self.backend.read(&scoped)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key = %scoped, error = %e, "discarding unparseable stored value");
                None
            }
        }
    }

    /// Write `partial` under `key`, shallow-merging into any existing entry
    ///
    /// When both the stored value and `partial` are JSON objects, fields of
    /// `partial` overwrite same-named fields and all others survive; in any
    /// other case `partial` replaces the entry. No-op when the backend is
    /// unavailable.
    pub fn set<T: Serialize>(&self, key: &str, partial: &T) {
        let scoped = self.scoped(key);

        let incoming = match serde_json::to_value(partial) {
            Ok(value) => value,
            Err(e) => {
                error!(key = %scoped, error = %e, "failed to serialize value for storage");
                return;
            }
        };

        let existing = self
            .backend
            .read(&scoped)
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok());

        let merged = match (existing, incoming) {
            (Some(Value::Object(mut current)), Value::Object(fields)) => {
                for (name, value) in fields {
                    current.insert(name, value);
                }
                Value::Object(current)
            }
            (_, incoming) => incoming,
        };

        if let Ok(raw) = serde_json::to_string(&merged) {
            self.backend.write(&scoped, &raw);
        }
    }

    /// Delete the entry under `key`; no-op when absent or unavailable
    pub fn remove(&self, key: &str) {
        self.backend.delete(&self.scoped(key));
    }
}
