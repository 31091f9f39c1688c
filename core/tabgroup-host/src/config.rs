//! Host configuration loaded from `~/.tabgroup/host.toml`.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tabgroup_core::config::{self as core_config, default_privileged_prefixes};
use tabgroup_core::{CoordinatorConfig, RetryPolicy};

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".tabgroup/host.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub store: RetryConfig,
    #[serde(default = "default_tab_retry")]
    pub tabs: RetryConfig,
    #[serde(default)]
    pub auto_collapse: AutoCollapseConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub quick_access: QuickAccessConfig,
    #[serde(default)]
    pub grouping: GroupingConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            store: RetryConfig::default(),
            tabs: default_tab_retry(),
            auto_collapse: AutoCollapseConfig::default(),
            dedup: DedupConfig::default(),
            quick_access: QuickAccessConfig::default(),
            grouping: GroupingConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

/// Linear backoff: `retries` extra attempts, the n-th after `step_ms * n`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    pub retries: u32,
    pub step_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(RetryPolicy::STORE)
    }
}

impl From<RetryPolicy> for RetryConfig {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            retries: policy.retries,
            step_ms: policy.step.as_millis() as u64,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        RetryPolicy {
            retries: config.retries,
            step: Duration::from_millis(config.step_ms),
        }
    }
}

fn default_tab_retry() -> RetryConfig {
    RetryConfig::from(RetryPolicy::TAB_EDIT)
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoCollapseConfig {
    #[serde(default = "default_prune_probability")]
    pub prune_probability: f64,
}

impl Default for AutoCollapseConfig {
    fn default() -> Self {
        Self {
            prune_probability: default_prune_probability(),
        }
    }
}

fn default_prune_probability() -> f64 {
    core_config::DEFAULT_PRUNE_PROBABILITY
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_dedup_window_ms")]
    pub window_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_ms: default_dedup_window_ms(),
        }
    }
}

fn default_dedup_window_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuickAccessConfig {
    #[serde(default = "default_sweep_delay_ms")]
    pub duplicate_sweep_delay_ms: u64,
}

impl Default for QuickAccessConfig {
    fn default() -> Self {
        Self {
            duplicate_sweep_delay_ms: default_sweep_delay_ms(),
        }
    }
}

fn default_sweep_delay_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupingConfig {
    #[serde(default = "default_privileged_prefixes")]
    pub privileged_prefixes: Vec<String>,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            privileged_prefixes: default_privileged_prefixes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_idle_tick_ms")]
    pub idle_tick_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            idle_tick_ms: default_idle_tick_ms(),
        }
    }
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_idle_tick_ms() -> u64 {
    250
}

impl BridgeConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms.max(1))
    }
}

impl HostConfig {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            store_retry: self.store.into(),
            tab_retry: self.tabs.into(),
            prune_probability: core_config::prune_probability(self.auto_collapse.prune_probability),
            dedup_window: Duration::from_millis(self.dedup.window_ms),
            duplicate_sweep_delay: Duration::from_millis(
                self.quick_access.duplicate_sweep_delay_ms,
            ),
            privileged_prefixes: self.grouping.privileged_prefixes.clone(),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

/// Reads the host config. A missing file yields defaults.
pub fn load_host_config(path: Option<PathBuf>) -> Result<HostConfig, String> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(HostConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| {
        format!(
            "Failed to read host config {}: {}",
            config_path.display(),
            err
        )
    })?;
    toml::from_str::<HostConfig>(&content).map_err(|err| {
        format!(
            "Failed to parse host config {}: {}",
            config_path.display(),
            err
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config = load_host_config(Some(temp_dir.path().join("missing.toml"))).expect("load");
        assert_eq!(config.coordinator_config(), CoordinatorConfig::default());
        assert_eq!(config.bridge.call_timeout(), Duration::from_secs(10));
        assert_eq!(config.bridge.idle_tick(), Duration::from_millis(250));
    }

    #[test]
    fn empty_file_matches_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("host.toml");
        fs_err::write(&path, "").expect("write config");

        let config = load_host_config(Some(path)).expect("load");
        assert_eq!(config.coordinator_config(), CoordinatorConfig::default());
    }

    #[test]
    fn parses_sections() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("host.toml");
        fs_err::write(
            &path,
            r#"
[store]
retries = 4
step_ms = 50

[auto_collapse]
prune_probability = 2.5

[dedup]
window_ms = 800

[grouping]
privileged_prefixes = ["chrome://", "brave://"]

[bridge]
call_timeout_ms = 3000
"#,
        )
        .expect("write config");

        let config = load_host_config(Some(path)).expect("load");
        let coordinator = config.coordinator_config();
        assert_eq!(
            coordinator.store_retry,
            RetryPolicy {
                retries: 4,
                step: Duration::from_millis(50)
            }
        );
        assert_eq!(coordinator.tab_retry, RetryPolicy::TAB_EDIT);
        assert_eq!(coordinator.prune_probability, 1.0);
        assert_eq!(coordinator.dedup_window, Duration::from_millis(800));
        assert_eq!(coordinator.privileged_prefixes, vec!["chrome://", "brave://"]);
        assert_eq!(config.bridge.call_timeout(), Duration::from_secs(3));
        assert_eq!(config.bridge.idle_tick_ms, 250);
    }

    #[test]
    fn nan_prune_probability_falls_back_to_default() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("host.toml");
        fs_err::write(&path, "[auto_collapse]\nprune_probability = nan\n").expect("write config");

        let config = load_host_config(Some(path)).expect("load");
        assert!(config.auto_collapse.prune_probability.is_nan());
        assert_eq!(
            config.coordinator_config().prune_probability,
            core_config::DEFAULT_PRUNE_PROBABILITY
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("host.toml");
        fs_err::write(&path, "[store]\nretries = \"many\"\n").expect("write config");

        let err = load_host_config(Some(path)).unwrap_err();
        assert!(err.starts_with("Failed to parse host config"));
    }
}
