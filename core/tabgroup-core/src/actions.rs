//! Inbound action dispatch.
//!
//! Each handler returns `crate::Result`; `dispatch` is the only place that
//! turns an error into a `{success:false, error}` reply.

use serde_json::Value;
use tabgroup_protocol::{
    parse_action, ActionParseError, ActionRequest, ActionResponse, AutoCollapseSettings,
    SettingsPatch, StatusReply, TabId,
};
use tracing::{debug, info, warn};

use crate::classifier::{HostOverrides, OverrideTable};
use crate::coordinator::{normalize_url, Coordinator, DeferredTask};
use crate::error::{Result, TabGroupError};
use crate::host::{BookmarkQuery, Clock, Host};
use crate::search;

impl<H: Host, C: Clock> Coordinator<H, C> {
    /// Entry point for a raw inbound message. Re-arms the auto-collapse
    /// wake-up first, then parses and dispatches.
    pub fn handle_message(&mut self, message: Value) -> ActionResponse {
        self.ensure_active();

        match parse_action(message) {
            Ok(request) => self.dispatch(request),
            Err(ActionParseError::Unknown(name)) => {
                warn!(action = %name, "Unknown action");
                ActionResponse::failure(TabGroupError::UnknownAction(name))
            }
            Err(ActionParseError::InvalidPayload { action, details }) => {
                warn!(action = %action, details = %details, "Invalid action payload");
                ActionResponse::failure(TabGroupError::InvalidRequest { action, details })
            }
        }
    }

    pub fn dispatch(&mut self, request: ActionRequest) -> ActionResponse {
        let action = request.name();
        debug!(action, "Dispatching action");

        let result = match request {
            ActionRequest::ActivateTab { tab_id } => self.activate_tab(tab_id),
            ActionRequest::RemoveTab { tab_id } => self.remove_tab(tab_id),
            ActionRequest::RefreshGroupedTabs {} => self.refresh_grouped_tabs(),
            ActionRequest::Search { query } => Ok(self.search(&query)),
            ActionRequest::GetAutoCollapseSettings {} => {
                Ok(ActionResponse::Settings(self.auto_collapse_settings()))
            }
            ActionRequest::UpdateAutoCollapseSettings { settings } => {
                self.update_auto_collapse_settings(&settings)
            }
            ActionRequest::OpenQuickAccessTab { url, click_id } => {
                self.open_quick_access_tab(&url, click_id.as_deref())
            }
            ActionRequest::Ping {} => Ok(ActionResponse::Status(StatusReply {
                success: true,
                message: Some("pong".to_string()),
                ..StatusReply::default()
            })),
            ActionRequest::DeleteBookmark { bookmark_id } => self.delete_bookmark(&bookmark_id),
            ActionRequest::CreateBookmark {
                parent_id,
                title,
                url,
            } => self.create_bookmark(parent_id.as_deref(), &title, &url),
        };

        result.unwrap_or_else(|err| {
            warn!(action, error = %err, "Action failed");
            ActionResponse::failure(err)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tabs
    // ─────────────────────────────────────────────────────────────────────

    fn activate_tab(&self, tab_id: TabId) -> Result<ActionResponse> {
        self.tab_ops().activate(tab_id)?;
        match self.host().get_tab(tab_id) {
            Ok(tab) => {
                self.recent().track(&tab);
            }
            Err(err) => debug!(tab_id, error = %err, "Activated tab could not be re-read"),
        }
        Ok(ActionResponse::ok())
    }

    fn remove_tab(&self, tab_id: TabId) -> Result<ActionResponse> {
        self.tab_ops().remove(tab_id)?;
        Ok(ActionResponse::ok())
    }

    fn refresh_grouped_tabs(&self) -> Result<ActionResponse> {
        match self.tab_ops().active_tab()? {
            Some(tab) => self.host().show_overlay(tab.id)?,
            None => debug!("No active tab to show the overlay in"),
        }
        Ok(ActionResponse::ok())
    }

    /// Opens `url`, reusing an open tab with the same normalized URL. A new tab
    /// schedules a sweep of duplicates that raced it into existence.
    fn open_quick_access_tab(
        &mut self,
        url: &str,
        click_id: Option<&str>,
    ) -> Result<ActionResponse> {
        let now = self.clock().now_ms();
        if let Some(token) = click_id {
            if self.process_mut().dedup.check_and_mark(token, now) {
                debug!(click_id = token, "Ignoring duplicate quick-access click");
                return Err(TabGroupError::DuplicateClick);
            }
        }

        let wanted = normalize_url(url);
        let tabs = self.tab_ops().query_tabs()?;
        if let Some(existing) = tabs.iter().find(|tab| normalize_url(&tab.url) == wanted) {
            self.tab_ops().activate(existing.id)?;
            self.host().focus_window(existing.window_id)?;
            debug!(tab_id = existing.id, "Quick access reused open tab");
            return Ok(ActionResponse::ok());
        }

        let created = self.tab_ops().create(url)?;
        info!(tab_id = created.id, url, "Quick access opened tab");
        let due_ms = now + self.config().duplicate_sweep_delay.as_millis() as i64;
        self.defer(DeferredTask::SweepDuplicates {
            url: wanted,
            keep: created.id,
            due_ms,
        });
        Ok(ActionResponse::ok())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────

    fn search(&self, query: &str) -> ActionResponse {
        let overrides = self.host_overrides();
        match search::search(self.host(), self.host(), &overrides, query) {
            Ok(results) => ActionResponse::SearchResults(results),
            Err(err) => {
                warn!(error = %err, "Search failed");
                ActionResponse::SearchResults(Vec::new())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────

    pub fn auto_collapse_settings(&self) -> AutoCollapseSettings {
        self.settings().get()
    }

    fn update_auto_collapse_settings(&self, patch: &SettingsPatch) -> Result<ActionResponse> {
        let settings = self.settings().update(patch, &self.scheduler())?;
        Ok(ActionResponse::Status(StatusReply {
            success: true,
            settings: Some(settings),
            ..StatusReply::default()
        }))
    }

    /// Current host override table.
    pub fn host_overrides(&self) -> HostOverrides {
        OverrideTable::new(self.store()).load()
    }

    /// Replaces the host override table. Returns whether it was persisted.
    pub fn replace_host_overrides(&self, overrides: &HostOverrides) -> bool {
        OverrideTable::new(self.store()).save(overrides)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Bookmarks
    // ─────────────────────────────────────────────────────────────────────

    fn delete_bookmark(&self, bookmark_id: &str) -> Result<ActionResponse> {
        self.host().remove_bookmark(bookmark_id)?;
        Ok(ActionResponse::ok())
    }

    fn create_bookmark(
        &self,
        parent_id: Option<&str>,
        title: &str,
        url: &str,
    ) -> Result<ActionResponse> {
        let existing = self
            .host()
            .search_bookmarks(&BookmarkQuery::Url(url.to_string()))?;
        if !existing.is_empty() {
            return Err(TabGroupError::AlreadyBookmarked);
        }

        let bookmark = self.host().create_bookmark(parent_id, title, url)?;
        Ok(ActionResponse::Status(StatusReply {
            success: true,
            bookmark: Some(bookmark),
            ..StatusReply::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CoordinatorConfig;
    use crate::coordinator::Coordinator;
    use crate::store::RECENT_TABS_KEY;
    use crate::testing::{FakeBrowser, FakeClock};
    use serde_json::json;
    use tabgroup_protocol::ActionResponse;

    fn coordinator(browser: FakeBrowser) -> Coordinator<FakeBrowser, FakeClock> {
        Coordinator::new(browser, FakeClock::new(50_000), CoordinatorConfig::default())
    }

    #[test]
    fn activate_tab_tracks_recent() {
        let browser = FakeBrowser::new();
        let id = browser.add_tab("https://docs.rs", None);
        let mut coordinator = coordinator(browser);

        let reply = coordinator.handle_message(json!({"action": "activateTab", "tabId": id}));
        assert_eq!(reply, ActionResponse::ok());
        assert_eq!(coordinator.host().active_tab_id(), Some(id));
        let recent = coordinator.host().raw(RECENT_TABS_KEY).expect("recent");
        assert_eq!(recent[0]["url"], "https://docs.rs");
    }

    #[test]
    fn activating_missing_tab_reports_host_message() {
        let mut coordinator = coordinator(FakeBrowser::new());
        let reply = coordinator.handle_message(json!({"action": "activateTab", "tabId": 12}));
        assert_eq!(reply.error(), Some("No tab with id: 12."));
    }

    #[test]
    fn missing_payload_field_is_invalid_request() {
        let mut coordinator = coordinator(FakeBrowser::new());
        let reply = coordinator.handle_message(json!({"action": "removeTab"}));
        assert!(!reply.is_success());
        assert!(reply
            .error()
            .is_some_and(|error| error.starts_with("Invalid removeTab request")));
    }

    #[test]
    fn ping_answers_pong() {
        let mut coordinator = coordinator(FakeBrowser::new());
        let reply = coordinator.handle_message(json!({"action": "ping"}));
        assert_eq!(
            serde_json::to_value(reply).expect("json"),
            json!({"success": true, "message": "pong"})
        );
    }

    #[test]
    fn refresh_shows_overlay_in_active_tab() {
        let browser = FakeBrowser::new();
        let id = browser.add_tab("https://docs.rs", None);
        browser.set_active(id);
        let mut coordinator = coordinator(browser);

        let reply = coordinator.handle_message(json!({"action": "refreshGroupedTabs"}));
        assert!(reply.is_success());
        assert_eq!(coordinator.host().overlays(), vec![id]);
    }

    #[test]
    fn refresh_without_active_tab_still_succeeds() {
        let mut coordinator = coordinator(FakeBrowser::new());
        let reply = coordinator.handle_message(json!({"action": "refreshGroupedTabs"}));
        assert!(reply.is_success());
    }

    #[test]
    fn quick_access_reuses_tab_with_same_normalized_url() {
        let browser = FakeBrowser::new();
        let id = browser.add_tab("https://Mail.example.com/", None);
        let mut coordinator = coordinator(browser);

        let reply = coordinator.handle_message(json!({
            "action": "openQuickAccessTab",
            "url": "https://mail.example.com",
        }));
        assert!(reply.is_success());
        assert_eq!(coordinator.host().active_tab_id(), Some(id));
        assert_eq!(coordinator.host().focused_window(), Some(1));
        assert_eq!(coordinator.host().tabs().len(), 1);
        assert!(coordinator.pending_tasks().is_empty());
    }

    #[test]
    fn quick_access_sweeps_duplicates_after_delay() {
        let mut coordinator = coordinator(FakeBrowser::new());
        let reply = coordinator.handle_message(json!({
            "action": "openQuickAccessTab",
            "url": "https://mail.example.com",
            "clickId": 1,
        }));
        assert!(reply.is_success());
        let kept = coordinator.host().active_tab_id().expect("created tab");
        coordinator.host().add_tab("https://mail.example.com/", None);

        assert_eq!(coordinator.next_due_ms(), Some(51_000));
        assert_eq!(coordinator.run_due_tasks(), 0);
        coordinator.clock().advance_ms(1_000);
        assert_eq!(coordinator.run_due_tasks(), 1);

        let ids: Vec<_> = coordinator.host().tabs().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![kept]);
    }

    #[test]
    fn create_bookmark_refuses_duplicates() {
        let browser = FakeBrowser::new();
        browser.add_bookmark("1", None, "Docs", Some("https://docs.rs"));
        let mut coordinator = coordinator(browser);

        let reply = coordinator.handle_message(json!({
            "action": "createBookmark",
            "title": "Docs again",
            "url": "https://docs.rs",
        }));
        assert_eq!(reply.error(), Some("This page is already bookmarked"));

        let reply = coordinator.handle_message(json!({
            "action": "createBookmark",
            "parentId": "1",
            "title": "Crates",
            "url": "https://crates.io",
        }));
        let ActionResponse::Status(status) = reply else {
            panic!("expected status reply");
        };
        assert!(status.success);
        assert_eq!(status.bookmark.expect("bookmark").title, "Crates");
    }

    #[test]
    fn delete_bookmark_removes_node() {
        let browser = FakeBrowser::new();
        browser.add_bookmark("9", None, "Old", Some("https://old.test"));
        let mut coordinator = coordinator(browser);

        let reply =
            coordinator.handle_message(json!({"action": "deleteBookmark", "bookmarkId": "9"}));
        assert!(reply.is_success());
        assert!(coordinator.host().bookmark("9").is_none());
    }

    #[test]
    fn override_table_round_trips_through_coordinator() {
        let coordinator = coordinator(FakeBrowser::new());
        let overrides = crate::classifier::HostOverrides::new([("mail.google", "Mail")]);
        assert!(coordinator.replace_host_overrides(&overrides));
        assert_eq!(coordinator.host_overrides(), overrides);
    }
}
