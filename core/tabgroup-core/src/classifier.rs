//! Maps a URL to the canonical group name used to cluster tabs.
//!
//! The default name is the first domain label after an optional leading
//! `www`. The user's override table (`supportedHosts`) maps URL substrings to
//! labels; keys are tested in table order and the first match wins.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::store::{ResilientStore, SUPPORTED_HOSTS_KEY};

pub const UNKNOWN_GROUP: &str = "unknown";

/// Ordered substring → label table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct HostOverrides {
    entries: Vec<(String, String)>,
}

impl HostOverrides {
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, label)| (key.into(), label.into()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    fn first_match(&self, url: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| url.contains(key.as_str()))
            .map(|(_, label)| label.as_str())
    }
}

impl From<Map<String, Value>> for HostOverrides {
    fn from(map: Map<String, Value>) -> Self {
        // Non-string labels are ignored rather than failing the whole table.
        Self {
            entries: map
                .into_iter()
                .filter_map(|(key, value)| match value {
                    Value::String(label) if !key.is_empty() => Some((key, label)),
                    _ => None,
                })
                .collect(),
        }
    }
}

impl From<HostOverrides> for Map<String, Value> {
    fn from(overrides: HostOverrides) -> Self {
        overrides
            .entries
            .into_iter()
            .map(|(key, label)| (key, Value::String(label)))
            .collect()
    }
}

/// Canonical group name for `url`. Pure; callers filter privileged URLs out
/// before classifying.
pub fn classify(url: &str, overrides: &HostOverrides) -> String {
    match overrides.first_match(url) {
        Some(label) => label.to_string(),
        None => default_group_name(url),
    }
}

/// First domain label, skipping a leading `www`.
pub fn default_group_name(url: &str) -> String {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return UNKNOWN_GROUP.to_string(),
    };
    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host,
        _ => return UNKNOWN_GROUP.to_string(),
    };

    let mut labels = host.split('.');
    let first = labels.next().unwrap_or_default();
    let label = if first == "www" {
        labels.next().unwrap_or(first)
    } else {
        first
    };
    label.to_string()
}

/// Whether `url` belongs to the browser itself (settings pages, extensions,
/// blank pages). Such tabs are never grouped, tracked or collapsed.
pub fn is_privileged(url: &str, privileged_prefixes: &[String]) -> bool {
    url.is_empty()
        || privileged_prefixes
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()))
}

/// Reads and replaces the persisted override table. Always read fresh; the
/// table is small and edited out-of-band by the settings surface.
#[derive(Clone, Copy)]
pub struct OverrideTable<'a> {
    store: ResilientStore<'a>,
}

impl<'a> OverrideTable<'a> {
    pub fn new(store: ResilientStore<'a>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> HostOverrides {
        self.store.get(SUPPORTED_HOSTS_KEY, HostOverrides::default())
    }

    pub fn save(&self, overrides: &HostOverrides) -> bool {
        self.store.set(SUPPORTED_HOSTS_KEY, overrides)
    }
}
