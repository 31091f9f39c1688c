//! Tunables for the coordinator. The host binary fills these from its TOML
//! file; tests and embedders use `Default`.

use std::time::Duration;

use crate::dedup::DEFAULT_DEDUP_WINDOW;
use crate::retry::RetryPolicy;

pub const DEFAULT_PRUNE_PROBABILITY: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub store_retry: RetryPolicy,
    pub tab_retry: RetryPolicy,
    /// Chance that an auto-collapse scan also prunes the activity ledger.
    pub prune_probability: f64,
    pub dedup_window: Duration,
    /// Delay before sweeping duplicate tabs after a quick-access open.
    pub duplicate_sweep_delay: Duration,
    /// URL prefixes that are never grouped, tracked or collapsed.
    pub privileged_prefixes: Vec<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            store_retry: RetryPolicy::STORE,
            tab_retry: RetryPolicy::TAB_EDIT,
            prune_probability: DEFAULT_PRUNE_PROBABILITY,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            duplicate_sweep_delay: Duration::from_millis(1000),
            privileged_prefixes: default_privileged_prefixes(),
        }
    }
}

/// Clamps into `[0, 1]`. NaN and infinities fall back to the default, since
/// `f64::clamp` passes NaN through.
pub fn prune_probability(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        DEFAULT_PRUNE_PROBABILITY
    }
}

pub fn default_privileged_prefixes() -> Vec<String> {
    ["chrome://", "chrome-extension://", "edge://", "devtools://"]
        .into_iter()
        .map(String::from)
        .collect()
}
