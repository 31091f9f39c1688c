//! Capability seams onto the browser host.
//!
//! Every call is fallible and may fail transiently: the host process can be
//! suspended between a request and its completion. Components depend on the
//! narrowest trait they need; the [`Host`] bundle exists so the coordinator can
//! hold a single value.

use serde_json::Value;
use std::time::Duration;
use tabgroup_protocol::{Alarm, Bookmark, GroupId, GroupUpdate, Tab, TabGroup, TabId, WindowId};

use crate::error::HostError;

pub type HostResult<T> = std::result::Result<T, HostError>;

/// The host's persistent key-value store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> HostResult<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> HostResult<()>;
}

/// Tab inventory and tab-group operations.
pub trait TabHost {
    fn query_tabs(&self) -> HostResult<Vec<Tab>>;
    /// The active tab of the focused window.
    fn active_tab(&self) -> HostResult<Option<Tab>>;
    fn get_tab(&self, tab_id: TabId) -> HostResult<Tab>;
    fn activate_tab(&self, tab_id: TabId) -> HostResult<()>;
    fn focus_window(&self, window_id: WindowId) -> HostResult<()>;
    fn create_tab(&self, url: &str) -> HostResult<Tab>;
    fn remove_tab(&self, tab_id: TabId) -> HostResult<()>;
    /// Moves tabs into `group`, or into a fresh group when `group` is `None`.
    /// Returns the id of the group the tabs ended up in.
    fn group_tabs(&self, tab_ids: &[TabId], group: Option<GroupId>) -> HostResult<GroupId>;
    fn query_groups(&self) -> HostResult<Vec<TabGroup>>;
    fn get_group(&self, group_id: GroupId) -> HostResult<TabGroup>;
    fn update_group(&self, group_id: GroupId, update: &GroupUpdate) -> HostResult<()>;
    /// Asks the extension to render the search overlay inside `tab_id`.
    fn show_overlay(&self, tab_id: TabId) -> HostResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookmarkQuery {
    Text(String),
    Url(String),
}

pub trait BookmarkHost {
    fn search_bookmarks(&self, query: &BookmarkQuery) -> HostResult<Vec<Bookmark>>;
    fn get_bookmark(&self, id: &str) -> HostResult<Bookmark>;
    fn create_bookmark(
        &self,
        parent_id: Option<&str>,
        title: &str,
        url: &str,
    ) -> HostResult<Bookmark>;
    fn remove_bookmark(&self, id: &str) -> HostResult<()>;
}

/// Repeating wake-ups that survive process suspension.
pub trait AlarmHost {
    fn get_alarm(&self, name: &str) -> HostResult<Option<Alarm>>;
    fn create_alarm(&self, name: &str, delay_minutes: u32, period_minutes: u32) -> HostResult<()>;
    /// Returns whether an alarm with that name existed.
    fn clear_alarm(&self, name: &str) -> HostResult<bool>;
}

/// Everything the coordinator needs from the browser.
pub trait Host: KeyValueStore + TabHost + BookmarkHost + AlarmHost {}

impl<T> Host for T where T: KeyValueStore + TabHost + BookmarkHost + AlarmHost {}

/// Time source and sleeper. Injected so backoff waits and expiry windows can
/// be driven by tests.
pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
