//! Recently visited tabs shown by the search overlay.
//!
//! Newest first, one entry per URL, entries older than 24 hours dropped on
//! read. There is no count limit; expiry is the only cleanup.

use serde::{Deserialize, Serialize};
use tabgroup_protocol::{Tab, TabId};
use tracing::debug;

use crate::classifier::is_privileged;
use crate::store::{ResilientStore, RECENT_TABS_KEY};

pub const RECENT_TAB_TTL_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentTab {
    pub id: TabId,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    pub timestamp: i64,
}

#[derive(Clone, Copy)]
pub struct RecentTabs<'a> {
    store: ResilientStore<'a>,
    privileged_prefixes: &'a [String],
}

impl<'a> RecentTabs<'a> {
    pub fn new(store: ResilientStore<'a>, privileged_prefixes: &'a [String]) -> Self {
        Self {
            store,
            privileged_prefixes,
        }
    }

    /// Unexpired entries, newest first. Writes the list back when entries
    /// expired.
    pub fn list(&self) -> Vec<RecentTab> {
        let stored: Vec<RecentTab> = self.store.get(RECENT_TABS_KEY, Vec::new());
        let cutoff = self.store.clock().now_ms() - RECENT_TAB_TTL_MS;
        let total = stored.len();
        let valid: Vec<RecentTab> = stored
            .into_iter()
            .filter(|entry| entry.timestamp > cutoff)
            .collect();

        if valid.len() != total {
            debug!(expired = total - valid.len(), "Dropping expired recent tabs");
            self.store.set(RECENT_TABS_KEY, &valid);
        }
        valid
    }

    /// Moves `tab` to the front of the list. Returns whether it was tracked.
    pub fn track(&self, tab: &Tab) -> bool {
        if tab.url == "about:blank" || is_privileged(&tab.url, self.privileged_prefixes) {
            return false;
        }

        let mut entries = self.list();
        entries.retain(|entry| entry.url != tab.url);
        entries.insert(
            0,
            RecentTab {
                id: tab.id,
                title: tab.title.clone(),
                url: tab.url.clone(),
                favicon: tab.fav_icon_url.clone(),
                timestamp: self.store.clock().now_ms(),
            },
        );
        self.store.set(RECENT_TABS_KEY, &entries);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_privileged_prefixes;
    use crate::retry::RetryPolicy;
    use crate::testing::{FakeBrowser, FakeClock};

    fn tab(id: TabId, url: &str) -> Tab {
        Tab {
            id,
            window_id: 1,
            url: url.to_string(),
            title: format!("Tab {}", id),
            group_id: tabgroup_protocol::NO_GROUP,
            fav_icon_url: None,
            active: false,
            status: None,
        }
    }

    #[test]
    fn newest_first_and_deduplicated_by_url() {
        let browser = FakeBrowser::new();
        let clock = FakeClock::new(1_000);
        let prefixes = default_privileged_prefixes();
        let recent = RecentTabs::new(
            ResilientStore::new(&browser, &clock, RetryPolicy::STORE),
            &prefixes,
        );

        recent.track(&tab(1, "https://a.test"));
        clock.advance_ms(10);
        recent.track(&tab(2, "https://b.test"));
        clock.advance_ms(10);
        recent.track(&tab(3, "https://a.test"));

        let urls: Vec<(TabId, String)> = recent.list().into_iter().map(|e| (e.id, e.url)).collect();
        assert_eq!(
            urls,
            vec![(3, "https://a.test".to_string()), (2, "https://b.test".to_string())]
        );
    }

    #[test]
    fn skips_privileged_and_blank_pages() {
        let browser = FakeBrowser::new();
        let clock = FakeClock::new(1_000);
        let prefixes = default_privileged_prefixes();
        let recent = RecentTabs::new(
            ResilientStore::new(&browser, &clock, RetryPolicy::STORE),
            &prefixes,
        );

        assert!(!recent.track(&tab(1, "chrome://newtab/")));
        assert!(!recent.track(&tab(2, "about:blank")));
        assert!(!recent.track(&tab(3, "")));
        assert!(recent.list().is_empty());
    }

    #[test]
    fn expired_entries_are_dropped_and_written_back() {
        let browser = FakeBrowser::new();
        let clock = FakeClock::new(1_000);
        let prefixes = default_privileged_prefixes();
        let recent = RecentTabs::new(
            ResilientStore::new(&browser, &clock, RetryPolicy::STORE),
            &prefixes,
        );

        recent.track(&tab(1, "https://old.test"));
        clock.advance_ms(RECENT_TAB_TTL_MS);
        recent.track(&tab(2, "https://new.test"));

        let list = recent.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, 2);
        let stored = browser.raw(RECENT_TABS_KEY).expect("stored");
        assert_eq!(stored.as_array().map(Vec::len), Some(1));
    }
}
