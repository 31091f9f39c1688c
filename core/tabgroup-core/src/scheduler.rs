//! Keeps the auto-collapse wake-up scheduled across process respawns.
//!
//! The alarm lives in the browser and survives suspension, but it can still be
//! lost (browser restart, extension reload). Every externally observable entry
//! point calls [`AlarmScheduler::ensure_active`], so a lost alarm is recreated
//! the next time anything happens.

use tabgroup_protocol::{AutoCollapseSettings, AUTO_COLLAPSE_ALARM};
use tracing::{debug, info, warn};

use crate::error::HostError;
use crate::host::AlarmHost;
use crate::settings::SettingsStore;
use crate::store::ResilientStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Disabled,
    AlreadyScheduled,
    Restarted,
}

/// Wake-up period for `settings`, in minutes.
pub fn period_minutes(settings: &AutoCollapseSettings) -> u32 {
    settings.timeout_minutes.max(1)
}

#[derive(Clone, Copy)]
pub struct AlarmScheduler<'a> {
    alarms: &'a dyn AlarmHost,
    store: ResilientStore<'a>,
}

impl<'a> AlarmScheduler<'a> {
    pub fn new(alarms: &'a dyn AlarmHost, store: ResilientStore<'a>) -> Self {
        Self { alarms, store }
    }

    fn settings(&self) -> SettingsStore<'a> {
        SettingsStore::new(self.store)
    }

    /// Starts the wake-up when enabled and clears it otherwise.
    pub fn initialize(&self) -> Result<(), HostError> {
        let settings = self.settings().get();
        if settings.enabled {
            self.start(&settings)
        } else {
            self.stop()
        }
    }

    /// Idempotent self-heal: recreates the wake-up if settings say it should
    /// exist and the browser has none.
    pub fn ensure_active(&self) -> Result<EnsureOutcome, HostError> {
        let settings = self.settings().get();
        if !settings.enabled {
            debug!("Auto-collapse disabled; skipping alarm check");
            return Ok(EnsureOutcome::Disabled);
        }

        match self.with_retry("alarm lookup", || self.alarms.get_alarm(AUTO_COLLAPSE_ALARM)) {
            Ok(Some(alarm)) => {
                debug!(scheduled_time = ?alarm.scheduled_time, "Auto-collapse alarm is active");
                Ok(EnsureOutcome::AlreadyScheduled)
            }
            Ok(None) => {
                info!("Auto-collapse alarm missing; restarting");
                self.start(&settings)?;
                Ok(EnsureOutcome::Restarted)
            }
            Err(err) => {
                warn!(error = %err, "Alarm lookup failed; restarting as fallback");
                self.start(&settings)?;
                Ok(EnsureOutcome::Restarted)
            }
        }
    }

    /// Replaces any existing wake-up with one at the settings' period, so
    /// there is never more than one.
    pub fn start(&self, settings: &AutoCollapseSettings) -> Result<(), HostError> {
        let period = period_minutes(settings);
        self.with_retry("alarm clear", || self.alarms.clear_alarm(AUTO_COLLAPSE_ALARM))?;
        self.with_retry("alarm create", || {
            self.alarms
                .create_alarm(AUTO_COLLAPSE_ALARM, period, period)
        })?;
        info!(period_minutes = period, "Auto-collapse alarm scheduled");
        Ok(())
    }

    pub fn stop(&self) -> Result<(), HostError> {
        let existed =
            self.with_retry("alarm clear", || self.alarms.clear_alarm(AUTO_COLLAPSE_ALARM))?;
        if existed {
            info!("Auto-collapse alarm cleared");
        }
        Ok(())
    }

    fn with_retry<T>(
        &self,
        label: &str,
        op: impl FnMut() -> Result<T, HostError>,
    ) -> Result<T, HostError> {
        self.store
            .policy()
            .run(self.store.clock(), label, HostError::is_unavailable, op)
    }
}
