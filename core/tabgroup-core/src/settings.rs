//! Auto-collapse settings with default-then-clamp validation.

use serde_json::Value;
use tabgroup_protocol::{
    AutoCollapseSettings, SettingsPatch, DEFAULT_TIMEOUT_MINUTES, MAX_TIMEOUT_MINUTES,
    MIN_TIMEOUT_MINUTES,
};
use tracing::info;

use crate::error::HostError;
use crate::scheduler::AlarmScheduler;
use crate::store::{ResilientStore, AUTO_COLLAPSE_SETTINGS_KEY};

#[derive(Clone, Copy)]
pub struct SettingsStore<'a> {
    store: ResilientStore<'a>,
}

impl<'a> SettingsStore<'a> {
    pub fn new(store: ResilientStore<'a>) -> Self {
        Self { store }
    }

    /// Current settings; `{enabled: false, timeoutMinutes: 5}` when absent or
    /// unreadable.
    pub fn get(&self) -> AutoCollapseSettings {
        self.store
            .get(AUTO_COLLAPSE_SETTINGS_KEY, AutoCollapseSettings::default())
    }

    /// Validates `patch`, persists it and reconciles the scheduler with the
    /// result. Scheduler failures are reported; the settings are persisted
    /// regardless.
    pub fn update(
        &self,
        patch: &SettingsPatch,
        scheduler: &AlarmScheduler<'_>,
    ) -> Result<AutoCollapseSettings, HostError> {
        let settings = validate(patch);
        self.store.set(AUTO_COLLAPSE_SETTINGS_KEY, &settings);
        info!(
            enabled = settings.enabled,
            timeout_minutes = settings.timeout_minutes,
            "Auto-collapse settings updated"
        );

        if settings.enabled {
            scheduler.start(&settings)?;
        } else {
            scheduler.stop()?;
        }
        Ok(settings)
    }
}

/// Coerces raw settings input. A missing, falsy or non-numeric timeout becomes
/// the default before clamping, so `0` ends at 5 rather than at the minimum.
pub fn validate(patch: &SettingsPatch) -> AutoCollapseSettings {
    let enabled = patch.enabled.as_ref().map(is_truthy).unwrap_or(false);

    let requested = patch
        .timeout_minutes
        .as_ref()
        .and_then(numeric_value)
        .filter(|minutes| *minutes != 0.0)
        .unwrap_or(f64::from(DEFAULT_TIMEOUT_MINUTES));

    let clamped = requested.clamp(
        f64::from(MIN_TIMEOUT_MINUTES),
        f64::from(MAX_TIMEOUT_MINUTES),
    );

    AutoCollapseSettings {
        enabled,
        timeout_minutes: clamped.floor() as u32,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}
