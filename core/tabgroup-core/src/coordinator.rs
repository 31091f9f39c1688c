//! Coordinator - the single entry point the host binary drives.
//!
//! Owns the host capabilities, the clock, and the process-lifetime state
//! (dedup gate, deferred tasks). Everything persisted is read through the
//! stores on each call, so a freshly constructed coordinator after a respawn
//! behaves exactly like one that never went away, minus its process state.
//!
//! Every handler converts failures into log lines or structured replies; no
//! error escapes to the caller.

use std::mem;
use tabgroup_protocol::{BrowserEvent, Tab, TabChange, TabId, AUTO_COLLAPSE_ALARM};
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::dedup::DedupGate;
use crate::error::HostError;
use crate::grouping::GroupingCoordinator;
use crate::host::{Clock, Host, SystemClock};
use crate::ledger::ActivityLedger;
use crate::recent::RecentTabs;
use crate::scanner::{InactivityScanner, ScanOutcome};
use crate::scheduler::{AlarmScheduler, EnsureOutcome};
use crate::settings::SettingsStore;
use crate::store::ResilientStore;
use crate::tabs::TabOps;

/// Work scheduled for later inside this process. Lost on respawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTask {
    /// Close tabs showing `url` other than `keep`.
    SweepDuplicates {
        url: String,
        keep: TabId,
        due_ms: i64,
    },
}

impl DeferredTask {
    pub fn due_ms(&self) -> i64 {
        match self {
            DeferredTask::SweepDuplicates { due_ms, .. } => *due_ms,
        }
    }
}

/// In-memory state that lives exactly as long as the process. Created empty
/// at start; never persisted.
#[derive(Debug)]
pub struct ProcessState {
    pub(crate) dedup: DedupGate,
    pub(crate) deferred: Vec<DeferredTask>,
}

impl ProcessState {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            dedup: DedupGate::new(config.dedup_window),
            deferred: Vec::new(),
        }
    }
}

pub struct Coordinator<H, C = SystemClock> {
    host: H,
    clock: C,
    config: CoordinatorConfig,
    process: ProcessState,
}

impl<H: Host> Coordinator<H, SystemClock> {
    pub fn with_system_clock(host: H, config: CoordinatorConfig) -> Self {
        Self::new(host, SystemClock, config)
    }
}

impl<H: Host, C: Clock> Coordinator<H, C> {
    pub fn new(host: H, clock: C, config: CoordinatorConfig) -> Self {
        let process = ProcessState::new(&config);
        Self {
            host,
            clock,
            config,
            process,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn pending_tasks(&self) -> &[DeferredTask] {
        &self.process.deferred
    }

    /// Earliest due time among deferred tasks.
    pub fn next_due_ms(&self) -> Option<i64> {
        self.process.deferred.iter().map(DeferredTask::due_ms).min()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Component views
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn store(&self) -> ResilientStore<'_> {
        ResilientStore::new(&self.host, &self.clock, self.config.store_retry)
    }

    pub(crate) fn tab_ops(&self) -> TabOps<'_> {
        TabOps::new(&self.host, &self.clock, self.config.tab_retry)
    }

    pub(crate) fn ledger(&self) -> ActivityLedger<'_> {
        ActivityLedger::new(self.store())
    }

    pub(crate) fn settings(&self) -> SettingsStore<'_> {
        SettingsStore::new(self.store())
    }

    pub(crate) fn scheduler(&self) -> AlarmScheduler<'_> {
        AlarmScheduler::new(&self.host, self.store())
    }

    pub(crate) fn grouping(&self) -> GroupingCoordinator<'_> {
        GroupingCoordinator::new(self.tab_ops(), self.store(), &self.config.privileged_prefixes)
    }

    pub(crate) fn recent(&self) -> RecentTabs<'_> {
        RecentTabs::new(self.store(), &self.config.privileged_prefixes)
    }

    fn scanner(&self) -> InactivityScanner<'_> {
        InactivityScanner::new(
            self.tab_ops(),
            self.store(),
            &self.config.privileged_prefixes,
            self.config.prune_probability,
        )
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Called once when the process comes up (first start or respawn).
    pub fn on_process_start(&mut self) {
        info!("Coordinator starting");
        self.initialize_scheduler();
        self.ensure_active();
    }

    /// Self-heals the auto-collapse wake-up. Cheap when already scheduled.
    pub fn ensure_active(&self) -> Option<EnsureOutcome> {
        match self.scheduler().ensure_active() {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(error = %err, "Failed to ensure auto-collapse alarm");
                None
            }
        }
    }

    fn initialize_scheduler(&self) {
        if let Err(err) = self.scheduler().initialize() {
            warn!(error = %err, "Failed to initialize auto-collapse alarm");
        }
    }

    pub fn handle_event(&mut self, event: BrowserEvent) {
        match event {
            BrowserEvent::Startup => {
                info!("Browser startup");
                self.initialize_scheduler();
            }
            BrowserEvent::Installed { reason } => self.on_installed(reason.as_deref()),
            BrowserEvent::TabCreated { tab } => self.on_tab_created(&tab),
            BrowserEvent::TabUpdated {
                tab_id,
                change,
                tab,
            } => self.on_tab_updated(tab_id, &change, &tab),
            BrowserEvent::TabActivated { tab_id } => self.on_tab_activated(tab_id),
            BrowserEvent::TabRemoved { tab_id } => self.ledger().remove(tab_id),
            BrowserEvent::Alarm { name } => self.on_alarm(&name),
        }
    }

    fn on_installed(&self, reason: Option<&str>) {
        info!(reason = ?reason, "Extension installed or enabled");
        if let Err(err) = self.grouping().group_all() {
            warn!(error = %err, "Bulk grouping failed");
        }
        self.initialize_scheduler();
        self.ensure_active();
    }

    fn on_tab_created(&self, tab: &Tab) {
        self.ledger().touch(tab.id);
        self.assign(tab);
    }

    fn on_tab_updated(&self, tab_id: TabId, change: &TabChange, tab: &Tab) {
        if !change.is_complete() || tab.url.is_empty() {
            return;
        }
        self.recent().track(tab);
        self.ledger().touch(tab_id);
        self.assign(tab);
    }

    fn on_tab_activated(&self, tab_id: TabId) {
        match self.host.get_tab(tab_id) {
            Ok(tab) => {
                self.recent().track(&tab);
            }
            Err(err) => debug!(tab_id, error = %err, "Activated tab vanished"),
        }
        self.ledger().touch(tab_id);
    }

    fn assign(&self, tab: &Tab) {
        if let Err(err) = self.grouping().assign(tab) {
            warn!(tab_id = tab.id, error = %err, "Failed to group tab");
        }
    }

    fn on_alarm(&self, name: &str) {
        if name != AUTO_COLLAPSE_ALARM {
            debug!(name, "Ignoring unrelated alarm");
            return;
        }
        if let Err(err) = self.run_scan() {
            warn!(error = %err, "Auto-collapse scan aborted");
        }
    }

    /// Runs one auto-collapse pass now.
    pub fn run_scan(&self) -> Result<ScanOutcome, HostError> {
        self.scanner().run(&mut rand::thread_rng())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Deferred tasks
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn process_mut(&mut self) -> &mut ProcessState {
        &mut self.process
    }

    pub(crate) fn defer(&mut self, task: DeferredTask) {
        self.process.deferred.push(task);
    }

    /// Runs every deferred task whose due time has passed. Returns how many ran.
    pub fn run_due_tasks(&mut self) -> usize {
        let now = self.clock.now_ms();
        let (due, pending): (Vec<_>, Vec<_>) = mem::take(&mut self.process.deferred)
            .into_iter()
            .partition(|task| task.due_ms() <= now);
        self.process.deferred = pending;

        for task in &due {
            match task {
                DeferredTask::SweepDuplicates { url, keep, .. } => {
                    self.sweep_duplicates(url, *keep);
                }
            }
        }
        due.len()
    }

    fn sweep_duplicates(&self, normalized_url: &str, keep: TabId) {
        let ops = self.tab_ops();
        let tabs = match ops.query_tabs() {
            Ok(tabs) => tabs,
            Err(err) => {
                warn!(error = %err, "Duplicate sweep could not list tabs");
                return;
            }
        };

        for tab in tabs
            .iter()
            .filter(|tab| tab.id != keep && normalize_url(&tab.url) == normalized_url)
        {
            match ops.remove(tab.id) {
                Ok(()) => info!(tab_id = tab.id, "Closed duplicate quick-access tab"),
                Err(err) => warn!(tab_id = tab.id, error = %err, "Failed to close duplicate tab"),
            }
        }
    }
}

/// URL comparison key for quick-access: trailing slash dropped, lower-cased.
pub fn normalize_url(url: &str) -> String {
    url.strip_suffix('/').unwrap_or(url).to_lowercase()
}
