//! End-to-end flows through the coordinator against the in-memory browser.

use serde_json::json;
use tabgroup_core::ledger::ActivityLedger;
use tabgroup_core::store::{ResilientStore, AUTO_COLLAPSE_SETTINGS_KEY, TAB_ACTIVITY_KEY};
use tabgroup_core::testing::{FakeBrowser, FakeClock};
use tabgroup_core::{
    classify, Coordinator, CoordinatorConfig, HostOverrides, RetryPolicy, ScanOutcome,
};
use tabgroup_protocol::{ActionResponse, AutoCollapseSettings, BrowserEvent, AUTO_COLLAPSE_ALARM};

const NOW: i64 = 1_700_000_000_000;

fn coordinator(browser: FakeBrowser) -> Coordinator<FakeBrowser, FakeClock> {
    Coordinator::new(browser, FakeClock::new(NOW), CoordinatorConfig::default())
}

fn enable(browser: &FakeBrowser, timeout_minutes: u32) {
    browser.put_raw(
        AUTO_COLLAPSE_SETTINGS_KEY,
        json!({"enabled": true, "timeoutMinutes": timeout_minutes}),
    );
}

#[test]
fn test_ledger_round_trip_survives_two_failed_writes() {
    let browser = FakeBrowser::new();
    let clock = FakeClock::new(NOW);
    let ledger = ActivityLedger::new(ResilientStore::new(&browser, &clock, RetryPolicy::STORE));

    browser.fail_store_writes(2);
    ledger.set(42, NOW - 5);
    assert_eq!(ledger.get(42), Some(NOW - 5));
}

#[test]
fn test_classify_default_and_override() {
    assert_eq!(
        classify("https://www.example.com/x", &HostOverrides::default()),
        "example"
    );
    let overrides = HostOverrides::new([("example.com", "Shopping")]);
    assert_eq!(classify("https://www.example.com/x", &overrides), "Shopping");
}

#[test]
fn test_group_with_active_tab_is_never_collapsed() {
    let ages = [
        [0, 0],
        [400_000, 400_000],
        [10_000_000, 10_000_000],
        [400_000, 100],
    ];
    for (timeout, [age_a, age_b]) in [1u32, 5, 60]
        .into_iter()
        .flat_map(|t| ages.into_iter().map(move |a| (t, a)))
    {
        let browser = FakeBrowser::new();
        enable(&browser, timeout);
        let group = browser.add_group("example", false);
        let a = browser.add_tab("https://example.com/a", Some(group));
        let b = browser.add_tab("https://example.com/b", Some(group));
        browser.set_active(a);
        browser.put_raw(
            TAB_ACTIVITY_KEY,
            json!({a.to_string(): NOW - age_a, b.to_string(): NOW - age_b}),
        );

        let coordinator = coordinator(browser);
        coordinator.run_scan().expect("scan");
        assert!(
            !coordinator.host().group(group).expect("group").collapsed,
            "collapsed active group with timeout {} and ages {:?}",
            timeout,
            [age_a, age_b]
        );
    }
}

#[test]
fn test_collapse_waits_for_most_recent_member() {
    for (ages, expect_collapsed) in [([400_000, 200_000], false), ([400_000, 310_000], true)] {
        let browser = FakeBrowser::new();
        enable(&browser, 5);
        let group = browser.add_group("example", false);
        let a = browser.add_tab("https://example.com/a", Some(group));
        let b = browser.add_tab("https://example.com/b", Some(group));
        let elsewhere = browser.add_tab("https://other.org", None);
        browser.set_active(elsewhere);
        browser.put_raw(
            TAB_ACTIVITY_KEY,
            json!({a.to_string(): NOW - ages[0], b.to_string(): NOW - ages[1]}),
        );

        let mut coordinator = coordinator(browser);
        coordinator.handle_event(BrowserEvent::Alarm {
            name: AUTO_COLLAPSE_ALARM.to_string(),
        });
        assert_eq!(
            coordinator.host().group(group).expect("group").collapsed,
            expect_collapsed,
            "ages {:?}",
            ages
        );
    }
}

#[test]
fn test_scan_is_disabled_by_default() {
    let coordinator = coordinator(FakeBrowser::new());
    assert_eq!(coordinator.run_scan(), Ok(ScanOutcome::Disabled));
}

#[test]
fn test_settings_update_clamps_and_defaults() {
    let mut coordinator = coordinator(FakeBrowser::new());

    let reply = coordinator.handle_message(json!({
        "action": "updateAutoCollapseSettings",
        "settings": {"enabled": true, "timeoutMinutes": 999},
    }));
    assert_eq!(
        serde_json::to_value(&reply).expect("json"),
        json!({"success": true, "settings": {"enabled": true, "timeoutMinutes": 60}})
    );
    assert_eq!(
        coordinator.host().raw(AUTO_COLLAPSE_SETTINGS_KEY),
        Some(json!({"enabled": true, "timeoutMinutes": 60}))
    );
    assert_eq!(coordinator.host().alarms().len(), 1);

    coordinator.handle_message(json!({
        "action": "updateAutoCollapseSettings",
        "settings": {"timeoutMinutes": 0},
    }));
    let reply = coordinator.handle_message(json!({"action": "getAutoCollapseSettings"}));
    assert_eq!(
        reply,
        ActionResponse::Settings(AutoCollapseSettings {
            enabled: false,
            timeout_minutes: 5,
        })
    );
    assert!(coordinator.host().alarms().is_empty());
}

#[test]
fn test_duplicate_click_inside_window_then_fresh_after() {
    let mut coordinator = coordinator(FakeBrowser::new());
    let open = json!({
        "action": "openQuickAccessTab",
        "url": "https://mail.example.com",
        "clickId": "click-1",
    });

    assert!(coordinator.handle_message(open.clone()).is_success());
    coordinator.clock().advance_ms(1_000);
    let second = coordinator.handle_message(open.clone());
    assert_eq!(second.error(), Some("Duplicate click"));

    coordinator.clock().advance_ms(5_000);
    assert!(coordinator.handle_message(open).is_success());
    assert_eq!(coordinator.host().tabs().len(), 1);
}

#[test]
fn test_any_message_restores_missing_alarm() {
    let browser = FakeBrowser::new();
    enable(&browser, 7);
    let mut coordinator = coordinator(browser);
    assert!(coordinator.host().alarms().is_empty());

    coordinator.handle_message(json!({"action": "ping"}));
    coordinator.handle_message(json!({"action": "ping"}));

    let alarms = coordinator.host().alarms();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].name, AUTO_COLLAPSE_ALARM);
    assert_eq!(alarms[0].period_in_minutes, Some(7.0));
}

#[test]
fn test_unknown_and_missing_actions() {
    let mut coordinator = coordinator(FakeBrowser::new());

    let reply = coordinator.handle_message(json!({"action": "explode"}));
    assert_eq!(
        serde_json::to_value(&reply).expect("json"),
        json!({"success": false, "error": "Unknown action: explode"})
    );

    let reply = coordinator.handle_message(json!({}));
    assert_eq!(reply.error(), Some("Unknown action: undefined"));
}

#[test]
fn test_install_groups_existing_tabs_and_arms_alarm() {
    let browser = FakeBrowser::new();
    enable(&browser, 5);
    browser.add_tab("https://github.com/a", None);
    browser.add_tab("https://www.github.com/b", None);
    browser.add_tab("https://docs.rs/c", None);
    let mut coordinator = coordinator(browser);

    coordinator.handle_event(BrowserEvent::Installed {
        reason: Some("install".to_string()),
    });

    let titles: Vec<String> = coordinator
        .host()
        .groups()
        .into_iter()
        .map(|group| group.title)
        .collect();
    assert_eq!(titles, vec!["github".to_string(), "docs".to_string()]);
    assert_eq!(coordinator.host().alarms().len(), 1);
}

#[test]
fn test_search_returns_empty_list_for_no_matches() {
    let browser = FakeBrowser::new();
    browser.add_tab("https://docs.rs", None);
    let mut coordinator = coordinator(browser);

    let reply = coordinator.handle_message(json!({"action": "search", "query": "zzz"}));
    assert_eq!(reply, ActionResponse::SearchResults(Vec::new()));
}
