//! In-memory browser and clock for tests.
//!
//! `FakeBrowser` implements every host capability over plain collections and
//! can be told to fail the next N calls of a kind, the same way a suspended
//! host or a dragged tab strip would.

use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tabgroup_protocol::{
    Alarm, Bookmark, GroupId, GroupUpdate, Tab, TabGroup, TabId, WindowId, NO_GROUP,
};

use crate::error::HostError;
use crate::host::{
    AlarmHost, BookmarkHost, BookmarkQuery, Clock, HostResult, KeyValueStore, TabHost,
};

const DEFAULT_WINDOW: WindowId = 1;

fn unavailable() -> HostError {
    HostError::Unavailable("No SW".to_string())
}

fn take_failure(counter: &Cell<u32>) -> bool {
    let left = counter.get();
    if left > 0 {
        counter.set(left - 1);
        true
    } else {
        false
    }
}

#[derive(Default)]
pub struct FakeBrowser {
    storage: RefCell<BTreeMap<String, Value>>,
    failing_reads: Cell<u32>,
    failing_writes: Cell<u32>,
    failing_reads_by_key: RefCell<HashMap<String, u32>>,
    busy_edits: Cell<u32>,
    failing_tab_reads: Cell<u32>,

    tabs: RefCell<BTreeMap<TabId, Tab>>,
    groups: RefCell<BTreeMap<GroupId, TabGroup>>,
    next_tab: Cell<TabId>,
    next_group: Cell<GroupId>,
    active: Cell<Option<TabId>>,
    focused_window: Cell<Option<WindowId>>,
    group_updates: Cell<usize>,
    overlays: RefCell<Vec<TabId>>,

    bookmarks: RefCell<Vec<Bookmark>>,
    next_bookmark: Cell<u32>,

    alarms: RefCell<BTreeMap<String, Alarm>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Storage
    // ─────────────────────────────────────────────────────────────────────

    pub fn put_raw(&self, key: &str, value: Value) {
        self.storage.borrow_mut().insert(key.to_string(), value);
    }

    pub fn raw(&self, key: &str) -> Option<Value> {
        self.storage.borrow().get(key).cloned()
    }

    /// The next `n` reads of any key fail as if the host were suspended.
    pub fn fail_store_reads(&self, n: u32) {
        self.failing_reads.set(n);
    }

    pub fn fail_store_writes(&self, n: u32) {
        self.failing_writes.set(n);
    }

    /// The next `n` reads of `key` fail; other keys are unaffected.
    pub fn fail_store_reads_for(&self, key: &str, n: u32) {
        self.failing_reads_by_key
            .borrow_mut()
            .insert(key.to_string(), n);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tabs and groups
    // ─────────────────────────────────────────────────────────────────────

    /// The next `n` tab edits fail as if the user were dragging a tab.
    pub fn busy_tab_edits(&self, n: u32) {
        self.busy_edits.set(n);
    }

    /// The next `n` tab or group inventory reads fail as if the host were
    /// suspended.
    pub fn fail_tab_reads(&self, n: u32) {
        self.failing_tab_reads.set(n);
    }

    pub fn add_tab(&self, url: &str, group: Option<GroupId>) -> TabId {
        self.add_titled_tab(url, url, group)
    }

    pub fn add_titled_tab(&self, url: &str, title: &str, group: Option<GroupId>) -> TabId {
        let id = self.next_tab.get() + 1;
        self.next_tab.set(id);
        self.tabs.borrow_mut().insert(
            id,
            Tab {
                id,
                window_id: DEFAULT_WINDOW,
                url: url.to_string(),
                title: title.to_string(),
                group_id: group.unwrap_or(NO_GROUP),
                fav_icon_url: None,
                active: false,
                status: Some("complete".to_string()),
            },
        );
        id
    }

    pub fn add_group(&self, title: &str, collapsed: bool) -> GroupId {
        let id = self.next_group.get() + 1;
        self.next_group.set(id);
        self.groups.borrow_mut().insert(
            id,
            TabGroup {
                id,
                title: title.to_string(),
                collapsed,
                window_id: DEFAULT_WINDOW,
            },
        );
        id
    }

    pub fn tab(&self, tab_id: TabId) -> Option<Tab> {
        let mut tab = self.tabs.borrow().get(&tab_id).cloned()?;
        tab.active = self.active.get() == Some(tab_id);
        Some(tab)
    }

    pub fn tabs(&self) -> Vec<Tab> {
        let ids: Vec<TabId> = self.tabs.borrow().keys().copied().collect();
        ids.into_iter().filter_map(|id| self.tab(id)).collect()
    }

    pub fn group(&self, group_id: GroupId) -> Option<TabGroup> {
        self.groups.borrow().get(&group_id).cloned()
    }

    /// All groups in creation order.
    pub fn groups(&self) -> Vec<TabGroup> {
        self.groups.borrow().values().cloned().collect()
    }

    pub fn set_active(&self, tab_id: TabId) {
        self.active.set(Some(tab_id));
    }

    pub fn active_tab_id(&self) -> Option<TabId> {
        self.active.get()
    }

    pub fn focused_window(&self) -> Option<WindowId> {
        self.focused_window.get()
    }

    pub fn set_collapsed(&self, group_id: GroupId, collapsed: bool) {
        if let Some(group) = self.groups.borrow_mut().get_mut(&group_id) {
            group.collapsed = collapsed;
        }
    }

    /// Number of successful group updates so far.
    pub fn group_updates(&self) -> usize {
        self.group_updates.get()
    }

    /// Tabs the overlay was shown in, oldest first.
    pub fn overlays(&self) -> Vec<TabId> {
        self.overlays.borrow().clone()
    }

    fn tab_read(&self) -> HostResult<()> {
        if take_failure(&self.failing_tab_reads) {
            return Err(unavailable());
        }
        Ok(())
    }

    fn tab_edit(&self) -> HostResult<()> {
        if take_failure(&self.busy_edits) {
            return Err(HostError::Busy(
                "Tabs cannot be edited right now (user may be dragging a tab).".to_string(),
            ));
        }
        Ok(())
    }

    fn missing_tab(tab_id: TabId) -> HostError {
        HostError::Failed(format!("No tab with id: {}.", tab_id))
    }

    fn drop_if_empty(&self, group_id: GroupId) {
        if group_id <= 0 {
            return;
        }
        let occupied = self
            .tabs
            .borrow()
            .values()
            .any(|tab| tab.group_id == group_id);
        if !occupied {
            self.groups.borrow_mut().remove(&group_id);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Bookmarks and alarms
    // ─────────────────────────────────────────────────────────────────────

    pub fn add_bookmark(&self, id: &str, parent_id: Option<&str>, title: &str, url: Option<&str>) {
        self.bookmarks.borrow_mut().push(Bookmark {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            title: title.to_string(),
            url: url.map(str::to_string),
        });
    }

    pub fn bookmark(&self, id: &str) -> Option<Bookmark> {
        self.bookmarks.borrow().iter().find(|b| b.id == id).cloned()
    }

    pub fn alarms(&self) -> Vec<Alarm> {
        self.alarms.borrow().values().cloned().collect()
    }
}

impl KeyValueStore for FakeBrowser {
    fn get(&self, key: &str) -> HostResult<Option<Value>> {
        if take_failure(&self.failing_reads) {
            return Err(unavailable());
        }
        if let Some(left) = self.failing_reads_by_key.borrow_mut().get_mut(key) {
            if *left > 0 {
                *left -= 1;
                return Err(unavailable());
            }
        }
        Ok(self.raw(key))
    }

    fn set(&self, key: &str, value: Value) -> HostResult<()> {
        if take_failure(&self.failing_writes) {
            return Err(unavailable());
        }
        self.put_raw(key, value);
        Ok(())
    }
}

impl TabHost for FakeBrowser {
    fn query_tabs(&self) -> HostResult<Vec<Tab>> {
        self.tab_read()?;
        Ok(self.tabs())
    }

    fn active_tab(&self) -> HostResult<Option<Tab>> {
        self.tab_read()?;
        Ok(self.active.get().and_then(|id| self.tab(id)))
    }

    fn get_tab(&self, tab_id: TabId) -> HostResult<Tab> {
        self.tab(tab_id).ok_or_else(|| Self::missing_tab(tab_id))
    }

    fn activate_tab(&self, tab_id: TabId) -> HostResult<()> {
        self.tab_edit()?;
        if !self.tabs.borrow().contains_key(&tab_id) {
            return Err(Self::missing_tab(tab_id));
        }
        self.active.set(Some(tab_id));
        Ok(())
    }

    fn focus_window(&self, window_id: WindowId) -> HostResult<()> {
        self.focused_window.set(Some(window_id));
        Ok(())
    }

    fn create_tab(&self, url: &str) -> HostResult<Tab> {
        self.tab_edit()?;
        let id = self.add_tab(url, None);
        self.active.set(Some(id));
        self.get_tab(id)
    }

    fn remove_tab(&self, tab_id: TabId) -> HostResult<()> {
        self.tab_edit()?;
        let removed = self
            .tabs
            .borrow_mut()
            .remove(&tab_id)
            .ok_or_else(|| Self::missing_tab(tab_id))?;
        if self.active.get() == Some(tab_id) {
            self.active.set(None);
        }
        self.drop_if_empty(removed.group_id);
        Ok(())
    }

    fn group_tabs(&self, tab_ids: &[TabId], group: Option<GroupId>) -> HostResult<GroupId> {
        self.tab_edit()?;
        if let Some(missing) = tab_ids
            .iter()
            .find(|id| !self.tabs.borrow().contains_key(*id))
        {
            return Err(Self::missing_tab(*missing));
        }
        let target = match group {
            Some(id) if self.groups.borrow().contains_key(&id) => id,
            Some(id) => return Err(HostError::Failed(format!("No group with id: {}.", id))),
            None => self.add_group("", false),
        };

        let mut previous = Vec::new();
        for id in tab_ids {
            if let Some(tab) = self.tabs.borrow_mut().get_mut(id) {
                if tab.group_id != target {
                    previous.push(tab.group_id);
                }
                tab.group_id = target;
            }
        }
        for group_id in previous {
            self.drop_if_empty(group_id);
        }
        Ok(target)
    }

    fn query_groups(&self) -> HostResult<Vec<TabGroup>> {
        self.tab_read()?;
        Ok(self.groups())
    }

    fn get_group(&self, group_id: GroupId) -> HostResult<TabGroup> {
        self.tab_read()?;
        self.group(group_id)
            .ok_or_else(|| HostError::Failed(format!("No group with id: {}.", group_id)))
    }

    fn update_group(&self, group_id: GroupId, update: &GroupUpdate) -> HostResult<()> {
        self.tab_edit()?;
        let mut groups = self.groups.borrow_mut();
        let group = groups
            .get_mut(&group_id)
            .ok_or_else(|| HostError::Failed(format!("No group with id: {}.", group_id)))?;
        if let Some(title) = &update.title {
            group.title = title.clone();
        }
        if let Some(collapsed) = update.collapsed {
            group.collapsed = collapsed;
        }
        self.group_updates.set(self.group_updates.get() + 1);
        Ok(())
    }

    fn show_overlay(&self, tab_id: TabId) -> HostResult<()> {
        self.get_tab(tab_id)?;
        self.overlays.borrow_mut().push(tab_id);
        Ok(())
    }
}

impl BookmarkHost for FakeBrowser {
    fn search_bookmarks(&self, query: &BookmarkQuery) -> HostResult<Vec<Bookmark>> {
        let bookmarks = self.bookmarks.borrow();
        let found = bookmarks
            .iter()
            .filter(|bookmark| {
                let Some(url) = &bookmark.url else {
                    return false;
                };
                match query {
                    BookmarkQuery::Url(wanted) => url == wanted,
                    BookmarkQuery::Text(text) => {
                        let needle = text.to_lowercase();
                        bookmark.title.to_lowercase().contains(&needle)
                            || url.to_lowercase().contains(&needle)
                    }
                }
            })
            .cloned()
            .collect();
        Ok(found)
    }

    fn get_bookmark(&self, id: &str) -> HostResult<Bookmark> {
        self.bookmark(id)
            .ok_or_else(|| HostError::Failed("Can't find bookmark for id.".to_string()))
    }

    fn create_bookmark(
        &self,
        parent_id: Option<&str>,
        title: &str,
        url: &str,
    ) -> HostResult<Bookmark> {
        let n = self.next_bookmark.get() + 1;
        self.next_bookmark.set(n);
        let id = format!("new-{}", n);
        self.add_bookmark(&id, parent_id, title, Some(url));
        self.get_bookmark(&id)
    }

    fn remove_bookmark(&self, id: &str) -> HostResult<()> {
        let mut bookmarks = self.bookmarks.borrow_mut();
        let before = bookmarks.len();
        bookmarks.retain(|bookmark| bookmark.id != id);
        if bookmarks.len() == before {
            return Err(HostError::Failed("Can't find bookmark for id.".to_string()));
        }
        Ok(())
    }
}

impl AlarmHost for FakeBrowser {
    fn get_alarm(&self, name: &str) -> HostResult<Option<Alarm>> {
        Ok(self.alarms.borrow().get(name).cloned())
    }

    fn create_alarm(&self, name: &str, delay_minutes: u32, period_minutes: u32) -> HostResult<()> {
        self.alarms.borrow_mut().insert(
            name.to_string(),
            Alarm {
                name: name.to_string(),
                scheduled_time: Some(f64::from(delay_minutes) * 60_000.0),
                period_in_minutes: Some(f64::from(period_minutes)),
            },
        );
        Ok(())
    }

    fn clear_alarm(&self, name: &str) -> HostResult<bool> {
        Ok(self.alarms.borrow_mut().remove(name).is_some())
    }
}

/// Manually driven clock. `sleep` advances time and is recorded.
pub struct FakeClock {
    now: Cell<i64>,
    sleeps: RefCell<Vec<Duration>>,
}

impl FakeClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: Cell::new(now_ms),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps.borrow().iter().sum()
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance_ms(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX));
    }
}
