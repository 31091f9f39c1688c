//! Per-tab last-active timestamps.
//!
//! Stored as one map under `tabActivity`. Every mutation is a read-modify-write
//! without locking; concurrent writers race under last-writer-wins. A mutation
//! whose read fails after retries is dropped instead of writing over the
//! stored map with a partial one.

use std::collections::{BTreeMap, HashSet};
use tabgroup_protocol::TabId;
use tracing::{debug, warn};

use crate::store::{ResilientStore, TAB_ACTIVITY_KEY};

pub type ActivityMap = BTreeMap<TabId, i64>;

#[derive(Clone, Copy)]
pub struct ActivityLedger<'a> {
    store: ResilientStore<'a>,
}

impl<'a> ActivityLedger<'a> {
    pub fn new(store: ResilientStore<'a>) -> Self {
        Self { store }
    }

    pub fn get(&self, tab_id: TabId) -> Option<i64> {
        self.get_all().get(&tab_id).copied()
    }

    /// The whole ledger; empty when unreadable.
    pub fn get_all(&self) -> ActivityMap {
        self.store.get(TAB_ACTIVITY_KEY, ActivityMap::new())
    }

    pub fn set(&self, tab_id: TabId, timestamp: i64) {
        self.set_many(&[tab_id], timestamp);
    }

    /// Stamps several tabs in one write.
    pub fn set_many(&self, tab_ids: &[TabId], timestamp: i64) {
        if tab_ids.is_empty() {
            return;
        }
        let Some(mut activity) = self.load_for_update("stamp") else {
            return;
        };
        for tab_id in tab_ids {
            activity.insert(*tab_id, timestamp);
        }
        self.store.set(TAB_ACTIVITY_KEY, &activity);
    }

    /// Records "now" for `tab_id`.
    pub fn touch(&self, tab_id: TabId) {
        self.set(tab_id, self.store.clock().now_ms());
    }

    pub fn remove(&self, tab_id: TabId) {
        let Some(mut activity) = self.load_for_update("remove") else {
            return;
        };
        if activity.remove(&tab_id).is_some() {
            self.store.set(TAB_ACTIVITY_KEY, &activity);
        }
    }

    /// Drops entries for tabs not in `live`. Returns how many were removed.
    pub fn prune(&self, live: &HashSet<TabId>) -> usize {
        let Some(mut activity) = self.load_for_update("prune") else {
            return 0;
        };
        let before = activity.len();
        activity.retain(|tab_id, _| live.contains(tab_id));
        let removed = before - activity.len();
        if removed > 0 {
            debug!(removed, "Pruning stale activity records");
            self.store.set(TAB_ACTIVITY_KEY, &activity);
        }
        removed
    }

    /// Current map for a read-modify-write, or `None` when it is unreadable.
    fn load_for_update(&self, op: &str) -> Option<ActivityMap> {
        match self.store.try_get::<ActivityMap>(TAB_ACTIVITY_KEY) {
            Ok(activity) => Some(activity.unwrap_or_default()),
            Err(err) => {
                warn!(op, error = %err, "Activity ledger unreadable; update skipped");
                None
            }
        }
    }
}
