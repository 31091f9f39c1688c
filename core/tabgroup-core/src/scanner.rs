//! Periodic auto-collapse of inactive tab groups.
//!
//! One run works on a snapshot taken at its start (settings, ledger, tab
//! inventory, active tab) and always terminates. Collapsed state is read live
//! per group just before collapsing. A group collapses only when every member
//! has been inactive for longer than the timeout; a group holding the active
//! tab is never touched.

use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use tabgroup_protocol::{GroupId, GroupUpdate, Tab, TabId};
use tracing::{debug, info, warn};

use crate::classifier::is_privileged;
use crate::config;
use crate::error::HostError;
use crate::ledger::{ActivityLedger, ActivityMap};
use crate::settings::SettingsStore;
use crate::store::ResilientStore;
use crate::tabs::TabOps;

const MS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub groups_checked: usize,
    pub skipped_active: usize,
    pub collapsed: Vec<GroupId>,
    pub already_collapsed: usize,
    /// Members that had no ledger entry and were stamped with the scan time.
    pub stamped: usize,
    /// `Some(n)` when this run pruned the ledger.
    pub pruned: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Disabled,
    Completed(ScanReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupVerdict {
    HasActiveTab,
    Recent,
    Inactive,
}

#[derive(Clone, Copy)]
pub struct InactivityScanner<'a> {
    tabs: TabOps<'a>,
    store: ResilientStore<'a>,
    privileged_prefixes: &'a [String],
    prune_probability: f64,
}

impl<'a> InactivityScanner<'a> {
    pub fn new(
        tabs: TabOps<'a>,
        store: ResilientStore<'a>,
        privileged_prefixes: &'a [String],
        prune_probability: f64,
    ) -> Self {
        Self {
            tabs,
            store,
            privileged_prefixes,
            prune_probability: config::prune_probability(prune_probability),
        }
    }

    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ScanOutcome, HostError> {
        let settings = SettingsStore::new(self.store).get();
        if !settings.enabled {
            debug!("Auto-collapse disabled; skipping scan");
            return Ok(ScanOutcome::Disabled);
        }

        let now = self.store.clock().now_ms();
        let timeout_ms = i64::from(settings.timeout_minutes) * MS_PER_MINUTE;
        let ledger = ActivityLedger::new(self.store);

        // An unreadable ledger reads as empty: every member gets stamped and
        // nothing collapses this cycle.
        let activity = ledger.get_all();
        let tabs = self.tabs.query_tabs()?;
        let active_tab = self.tabs.active_tab()?.map(|tab| tab.id);

        let groups = partition_by_group(&tabs, self.privileged_prefixes);
        let mut report = ScanReport::default();
        if groups.is_empty() {
            debug!("No tab groups to check");
        }

        let mut unstamped: Vec<TabId> = Vec::new();
        for (group_id, members) in &groups {
            report.groups_checked += 1;
            let verdict = judge_group(
                members,
                active_tab,
                &activity,
                now,
                timeout_ms,
                &mut unstamped,
            );
            match verdict {
                GroupVerdict::HasActiveTab => {
                    report.skipped_active += 1;
                    continue;
                }
                GroupVerdict::Recent => continue,
                GroupVerdict::Inactive => {}
            }

            match self.tabs.get_group(*group_id) {
                Ok(group) if group.collapsed => {
                    report.already_collapsed += 1;
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(group_id, error = %err, "Failed to read group state");
                    continue;
                }
            }

            match self.tabs.update_group(*group_id, &GroupUpdate::collapse()) {
                Ok(()) => {
                    info!(group_id, members = members.len(), "Collapsed inactive group");
                    report.collapsed.push(*group_id);
                }
                Err(err) => warn!(group_id, error = %err, "Failed to collapse group"),
            }
        }

        if !unstamped.is_empty() {
            report.stamped = unstamped.len();
            ledger.set_many(&unstamped, now);
        }

        if rng.gen_bool(self.prune_probability) {
            let live: HashSet<TabId> = tabs.iter().map(|tab| tab.id).collect();
            report.pruned = Some(ledger.prune(&live));
        }

        info!(
            groups = report.groups_checked,
            collapsed = report.collapsed.len(),
            skipped_active = report.skipped_active,
            "Auto-collapse scan completed"
        );
        Ok(ScanOutcome::Completed(report))
    }
}

/// Groups tabs by group id, leaving out ungrouped and privileged tabs.
fn partition_by_group<'t>(
    tabs: &'t [Tab],
    privileged_prefixes: &[String],
) -> BTreeMap<GroupId, Vec<&'t Tab>> {
    let mut groups: BTreeMap<GroupId, Vec<&Tab>> = BTreeMap::new();
    for tab in tabs {
        if is_privileged(&tab.url, privileged_prefixes) {
            continue;
        }
        if let Some(group_id) = tab.group() {
            groups.entry(group_id).or_default().push(tab);
        }
    }
    groups
}

/// Members with no ledger entry count as active at `now` and are appended to
/// `unstamped`, which defers the group by one full cycle.
fn judge_group(
    members: &[&Tab],
    active_tab: Option<TabId>,
    activity: &ActivityMap,
    now: i64,
    timeout_ms: i64,
    unstamped: &mut Vec<TabId>,
) -> GroupVerdict {
    if members.iter().any(|tab| Some(tab.id) == active_tab) {
        return GroupVerdict::HasActiveTab;
    }

    let mut all_inactive = true;
    for tab in members {
        let last_active = match activity.get(&tab.id) {
            Some(timestamp) => *timestamp,
            None => {
                unstamped.push(tab.id);
                now
            }
        };
        let idle_ms = now - last_active;
        if idle_ms <= timeout_ms {
            debug!(tab_id = tab.id, idle_minutes = idle_ms / MS_PER_MINUTE, "Tab still active");
            all_inactive = false;
        }
    }

    if all_inactive {
        GroupVerdict::Inactive
    } else {
        GroupVerdict::Recent
    }
}
