//! Retry-and-fallback wrapper around the host's key-value store.
//!
//! The host process can be torn down between a store call and its completion.
//! Reads that keep failing resolve to the caller's default and writes are
//! dropped with a warning, so no caller ever sees a store error.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::HostError;
use crate::host::{Clock, KeyValueStore};
use crate::retry::RetryPolicy;

// ─────────────────────────────────────────────────────────────────────────────
// Persisted Keys
// ─────────────────────────────────────────────────────────────────────────────

pub const TAB_ACTIVITY_KEY: &str = "tabActivity";
pub const AUTO_COLLAPSE_SETTINGS_KEY: &str = "autoCollapseSettings";
pub const SUPPORTED_HOSTS_KEY: &str = "supportedHosts";
pub const RECENT_TABS_KEY: &str = "recentTabs";

#[derive(Clone, Copy)]
pub struct ResilientStore<'a> {
    kv: &'a dyn KeyValueStore,
    clock: &'a dyn Clock,
    policy: RetryPolicy,
}

impl<'a> ResilientStore<'a> {
    pub fn new(kv: &'a dyn KeyValueStore, clock: &'a dyn Clock, policy: RetryPolicy) -> Self {
        Self { kv, clock, policy }
    }

    pub fn clock(&self) -> &'a dyn Clock {
        self.clock
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Reads `key`, or returns `default` when the key is absent, unreadable
    /// after all retries, or holds a value of the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.try_get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err) => {
                warn!(key, error = %err, "Store read failed; using fallback");
                default
            }
        }
    }

    /// Like [`get`](Self::get) but reports failure instead of defaulting, for
    /// callers that must tell "empty" apart from "unreadable".
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, HostError> {
        let raw = self.policy.run(
            self.clock,
            "store read",
            HostError::is_unavailable,
            || self.kv.get(key),
        )?;

        match raw {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => match serde_json::from_value(value) {
                Ok(parsed) => Ok(Some(parsed)),
                Err(err) => {
                    warn!(key, error = %err, "Stored value has unexpected shape; ignoring it");
                    Ok(None)
                }
            },
        }
    }

    /// Writes `value`. Never fails: persistent failures are logged and the
    /// write is dropped. Returns whether the write landed.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key, error = %err, "Failed to serialize value; write skipped");
                return false;
            }
        };

        let result = self.policy.run(
            self.clock,
            "store write",
            HostError::is_unavailable,
            || self.kv.set(key, payload.clone()),
        );

        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(key, error = %err, "Store write failed; operation skipped");
                false
            }
        }
    }
}
