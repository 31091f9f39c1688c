//! Short-lived suppression of repeated action tokens.
//!
//! Process-local only: a respawn inside the window forgets every token and
//! the action runs again. The quick-access duplicate sweep cleans up after
//! that case.

use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct DedupGate {
    window_ms: i64,
    /// token → expiry (ms since epoch)
    entries: HashMap<String, i64>,
}

impl Default for DedupGate {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl DedupGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis().min(i64::MAX as u128) as i64,
            entries: HashMap::new(),
        }
    }

    pub fn seen(&mut self, token: &str, now_ms: i64) -> bool {
        self.forget_expired(now_ms);
        self.entries.contains_key(token)
    }

    /// Remembers `token` until `now_ms + window`.
    pub fn mark(&mut self, token: &str, now_ms: i64) {
        self.entries
            .insert(token.to_string(), now_ms.saturating_add(self.window_ms));
    }

    /// Returns `true` if `token` was already seen inside the window; otherwise
    /// marks it and returns `false`.
    pub fn check_and_mark(&mut self, token: &str, now_ms: i64) -> bool {
        if self.seen(token, now_ms) {
            return true;
        }
        self.mark(token, now_ms);
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn forget_expired(&mut self, now_ms: i64) {
        self.entries.retain(|_, expires_at| *expires_at > now_ms);
    }
}
