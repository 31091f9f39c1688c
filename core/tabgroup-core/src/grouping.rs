//! Joins tabs to labeled groups as they load.
//!
//! Group membership is never cached: every decision re-reads the live group
//! inventory so manual regrouping by the user is respected.
//!
//! Two tabs finishing their load at the same time can both miss the lookup
//! and each create a group with the same label. No lock guards the
//! lookup-then-create sequence; the duplicate groups are left as they are.

use tabgroup_protocol::{GroupId, GroupUpdate, Tab, TabId};
use tracing::{debug, info, warn};

use crate::classifier::{classify, is_privileged, HostOverrides, OverrideTable};
use crate::error::HostError;
use crate::store::ResilientStore;
use crate::tabs::TabOps;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Joined an existing group with the tab's label.
    Joined(GroupId),
    /// No group had the label; a new one was created for the tab.
    Created(GroupId),
    /// The tab already sits in the group with its label.
    Unchanged(GroupId),
    /// Privileged or empty URL; left alone.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkGrouping {
    pub groups_created: usize,
    pub tabs_grouped: usize,
    pub failures: usize,
}

#[derive(Clone, Copy)]
pub struct GroupingCoordinator<'a> {
    tabs: TabOps<'a>,
    overrides: OverrideTable<'a>,
    privileged_prefixes: &'a [String],
}

impl<'a> GroupingCoordinator<'a> {
    pub fn new(
        tabs: TabOps<'a>,
        store: ResilientStore<'a>,
        privileged_prefixes: &'a [String],
    ) -> Self {
        Self {
            tabs,
            overrides: OverrideTable::new(store),
            privileged_prefixes,
        }
    }

    /// Places a single tab in the group matching its label.
    pub fn assign(&self, tab: &Tab) -> Result<Assignment, HostError> {
        if is_privileged(&tab.url, self.privileged_prefixes) {
            return Ok(Assignment::Skipped);
        }

        let label = classify(&tab.url, &self.overrides.load());
        let groups = self.tabs.query_groups()?;

        if let Some(existing) = groups.iter().find(|group| group.title == label) {
            if tab.group() == Some(existing.id) {
                return Ok(Assignment::Unchanged(existing.id));
            }
            self.tabs.group(&[tab.id], Some(existing.id))?;
            debug!(tab_id = tab.id, group_id = existing.id, label = %label, "Tab joined group");
            return Ok(Assignment::Joined(existing.id));
        }

        let group_id = self.create_labeled(&[tab.id], &label)?;
        Ok(Assignment::Created(group_id))
    }

    /// Clusters every open tab by label and creates one group per cluster.
    /// Used on install/enable. A failing cluster does not stop the others.
    pub fn group_all(&self) -> Result<BulkGrouping, HostError> {
        let tabs = self.tabs.query_tabs()?;
        let clusters = cluster_by_label(&tabs, &self.overrides.load(), self.privileged_prefixes);

        let mut report = BulkGrouping::default();
        for (label, tab_ids) in clusters {
            match self.create_labeled(&tab_ids, &label) {
                Ok(_) => {
                    report.groups_created += 1;
                    report.tabs_grouped += tab_ids.len();
                }
                Err(err) => {
                    warn!(label = %label, error = %err, "Failed to create group");
                    report.failures += 1;
                }
            }
        }

        info!(
            groups = report.groups_created,
            tabs = report.tabs_grouped,
            failures = report.failures,
            "Grouped open tabs by host"
        );
        Ok(report)
    }

    fn create_labeled(&self, tab_ids: &[TabId], label: &str) -> Result<GroupId, HostError> {
        let group_id = self.tabs.group(tab_ids, None)?;
        self.tabs.update_group(group_id, &GroupUpdate::title(label))?;
        info!(group_id, label, tabs = tab_ids.len(), "Created tab group");
        Ok(group_id)
    }
}

/// Clusters tabs by label, keeping labels in first-seen order.
pub fn cluster_by_label(
    tabs: &[Tab],
    overrides: &HostOverrides,
    privileged_prefixes: &[String],
) -> Vec<(String, Vec<TabId>)> {
    let mut clusters: Vec<(String, Vec<TabId>)> = Vec::new();
    for tab in tabs {
        if is_privileged(&tab.url, privileged_prefixes) {
            continue;
        }
        let label = classify(&tab.url, overrides);
        match clusters.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, ids)) => ids.push(tab.id),
            None => clusters.push((label, vec![tab.id])),
        }
    }
    clusters
}
