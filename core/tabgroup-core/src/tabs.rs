//! Tab reads and edits with retry.
//!
//! The browser rejects tab edits while the user is dragging a tab. Those
//! rejections are retried with a short linear backoff. Inventory reads are
//! retried the same way when the host is unavailable. Every other failure is
//! returned to the caller as-is.

use tabgroup_protocol::{GroupId, GroupUpdate, Tab, TabGroup, TabId};

use crate::error::HostError;
use crate::host::{Clock, TabHost};
use crate::retry::RetryPolicy;

#[derive(Clone, Copy)]
pub struct TabOps<'a> {
    host: &'a dyn TabHost,
    clock: &'a dyn Clock,
    policy: RetryPolicy,
}

impl<'a> TabOps<'a> {
    pub fn new(host: &'a dyn TabHost, clock: &'a dyn Clock, policy: RetryPolicy) -> Self {
        Self {
            host,
            clock,
            policy,
        }
    }

    pub fn query_tabs(&self) -> Result<Vec<Tab>, HostError> {
        self.read("query tabs", || self.host.query_tabs())
    }

    pub fn active_tab(&self) -> Result<Option<Tab>, HostError> {
        self.read("query active tab", || self.host.active_tab())
    }

    pub fn query_groups(&self) -> Result<Vec<TabGroup>, HostError> {
        self.read("query groups", || self.host.query_groups())
    }

    pub fn get_group(&self, group_id: GroupId) -> Result<TabGroup, HostError> {
        self.read("get group", || self.host.get_group(group_id))
    }

    pub fn activate(&self, tab_id: TabId) -> Result<(), HostError> {
        self.retry("activate tab", || self.host.activate_tab(tab_id))
    }

    pub fn create(&self, url: &str) -> Result<Tab, HostError> {
        self.retry("create tab", || self.host.create_tab(url))
    }

    pub fn remove(&self, tab_id: TabId) -> Result<(), HostError> {
        self.retry("remove tab", || self.host.remove_tab(tab_id))
    }

    pub fn group(&self, tab_ids: &[TabId], group: Option<GroupId>) -> Result<GroupId, HostError> {
        self.retry("group tabs", || self.host.group_tabs(tab_ids, group))
    }

    pub fn update_group(&self, group_id: GroupId, update: &GroupUpdate) -> Result<(), HostError> {
        self.retry("update group", || self.host.update_group(group_id, update))
    }

    fn retry<T>(
        &self,
        label: &str,
        op: impl FnMut() -> Result<T, HostError>,
    ) -> Result<T, HostError> {
        self.policy.run(self.clock, label, HostError::is_busy, op)
    }

    fn read<T>(
        &self,
        label: &str,
        op: impl FnMut() -> Result<T, HostError>,
    ) -> Result<T, HostError> {
        self.policy.run(self.clock, label, HostError::is_unavailable, op)
    }
}
