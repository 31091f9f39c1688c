//! Wire types and validation for the tab grouper native-messaging bridge.
//!
//! This crate is shared by the coordination core and the host binary so the
//! action vocabulary and the browser object shapes cannot drift between them.
//! Browser objects (`Tab`, `TabGroup`, `Bookmark`, `Alarm`) keep the browser's
//! camelCase field names since the extension forwards them untouched; the
//! bridge envelopes themselves use snake_case.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub mod frame;

pub use frame::{read_frame, write_frame, MAX_FRAME_BYTES};

pub type TabId = i64;
pub type GroupId = i64;
pub type WindowId = i64;

/// Group id the browser reports for tabs that are not in any group.
pub const NO_GROUP: GroupId = -1;

/// Name of the single repeating wake-up consumed by the inactivity scanner.
pub const AUTO_COLLAPSE_ALARM: &str = "autoCollapseCheck";

pub const DEFAULT_TIMEOUT_MINUTES: u32 = 5;
pub const MIN_TIMEOUT_MINUTES: u32 = 1;
pub const MAX_TIMEOUT_MINUTES: u32 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// Browser objects
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    #[serde(default)]
    pub window_id: WindowId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "no_group")]
    pub group_id: GroupId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Tab {
    /// The group this tab belongs to, if any. Only positive ids count as real
    /// groups.
    pub fn group(&self) -> Option<GroupId> {
        (self.group_id > 0).then_some(self.group_id)
    }
}

fn no_group() -> GroupId {
    NO_GROUP
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroup {
    pub id: GroupId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub window_id: WindowId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
}

impl GroupUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            collapsed: None,
        }
    }

    pub fn collapse() -> Self {
        Self {
            title: None,
            collapsed: Some(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_in_minutes: Option<f64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Persisted auto-collapse configuration. `timeout_minutes` always lies in
/// `[MIN_TIMEOUT_MINUTES, MAX_TIMEOUT_MINUTES]` once written by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCollapseSettings {
    pub enabled: bool,
    pub timeout_minutes: u32,
}

impl Default for AutoCollapseSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
        }
    }
}

/// Unvalidated settings as sent by the settings surface. Values stay raw JSON
/// so the core can apply its coercion rules instead of rejecting input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default)]
    pub enabled: Option<Value>,
    #[serde(default)]
    pub timeout_minutes: Option<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Actions
// ─────────────────────────────────────────────────────────────────────────────

/// Closed set of inbound actions. Unknown names are rejected by
/// [`parse_action`] before deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ActionRequest {
    ActivateTab {
        tab_id: TabId,
    },
    RemoveTab {
        tab_id: TabId,
    },
    RefreshGroupedTabs {},
    Search {
        #[serde(default)]
        query: String,
    },
    GetAutoCollapseSettings {},
    UpdateAutoCollapseSettings {
        #[serde(default)]
        settings: SettingsPatch,
    },
    OpenQuickAccessTab {
        url: String,
        #[serde(default, deserialize_with = "token_string")]
        click_id: Option<String>,
    },
    Ping {},
    DeleteBookmark {
        bookmark_id: String,
    },
    CreateBookmark {
        #[serde(default)]
        parent_id: Option<String>,
        #[serde(default)]
        title: String,
        url: String,
    },
}

pub const ACTION_NAMES: &[&str] = &[
    "activateTab",
    "removeTab",
    "refreshGroupedTabs",
    "search",
    "getAutoCollapseSettings",
    "updateAutoCollapseSettings",
    "openQuickAccessTab",
    "ping",
    "deleteBookmark",
    "createBookmark",
];

impl ActionRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ActionRequest::ActivateTab { .. } => "activateTab",
            ActionRequest::RemoveTab { .. } => "removeTab",
            ActionRequest::RefreshGroupedTabs {} => "refreshGroupedTabs",
            ActionRequest::Search { .. } => "search",
            ActionRequest::GetAutoCollapseSettings {} => "getAutoCollapseSettings",
            ActionRequest::UpdateAutoCollapseSettings { .. } => "updateAutoCollapseSettings",
            ActionRequest::OpenQuickAccessTab { .. } => "openQuickAccessTab",
            ActionRequest::Ping {} => "ping",
            ActionRequest::DeleteBookmark { .. } => "deleteBookmark",
            ActionRequest::CreateBookmark { .. } => "createBookmark",
        }
    }
}

/// Click tokens arrive as strings or numbers depending on the caller.
fn token_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(token)) if !token.is_empty() => Some(token),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionParseError {
    /// The `action` field is missing or names an action outside the closed set.
    Unknown(String),
    /// The action is known but its payload does not have the expected shape.
    InvalidPayload { action: String, details: String },
}

pub fn parse_action(message: Value) -> Result<ActionRequest, ActionParseError> {
    let name = match message.get("action") {
        Some(Value::String(name)) => name.clone(),
        Some(Value::Null) | None => "undefined".to_string(),
        Some(other) => other.to_string(),
    };

    if !ACTION_NAMES.contains(&name.as_str()) {
        return Err(ActionParseError::Unknown(name));
    }

    serde_json::from_value(message).map_err(|err| ActionParseError::InvalidPayload {
        action: name,
        details: err.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SearchResult {
    Tab {
        id: TabId,
        title: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fav_icon_url: Option<String>,
        group_id: GroupId,
    },
    Bookmark {
        id: String,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        path: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<AutoCollapseSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<Bookmark>,
}

impl StatusReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Response to an inbound action. The shape depends on the action: most
/// actions answer with a status object, `search` with a bare array and
/// `getAutoCollapseSettings` with the bare settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionResponse {
    Status(StatusReply),
    Settings(AutoCollapseSettings),
    SearchResults(Vec<SearchResult>),
}

impl ActionResponse {
    pub fn ok() -> Self {
        ActionResponse::Status(StatusReply::ok())
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ActionResponse::Status(StatusReply::failure(error))
    }

    pub fn is_success(&self) -> bool {
        match self {
            ActionResponse::Status(reply) => reply.success,
            ActionResponse::Settings(_) | ActionResponse::SearchResults(_) => true,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ActionResponse::Status(reply) => reply.error.as_deref(),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Browser events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl TabChange {
    pub fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("complete")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserEvent {
    Startup,
    Installed {
        #[serde(default)]
        reason: Option<String>,
    },
    TabCreated {
        tab: Tab,
    },
    TabUpdated {
        tab_id: TabId,
        #[serde(default)]
        change: TabChange,
        tab: Tab,
    },
    TabActivated {
        tab_id: TabId,
    },
    TabRemoved {
        tab_id: TabId,
    },
    Alarm {
        name: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge envelopes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Capabilities the host binary asks the extension to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMethod {
    StorageGet,
    StorageSet,
    TabsQuery,
    TabsGetActive,
    TabsGet,
    TabsActivate,
    TabsCreate,
    TabsRemove,
    TabsGroup,
    TabGroupsQuery,
    TabGroupsGet,
    TabGroupsUpdate,
    WindowsFocus,
    AlarmsGet,
    AlarmsCreate,
    AlarmsClear,
    BookmarksSearch,
    BookmarksGet,
    BookmarksCreate,
    BookmarksRemove,
    OverlayShow,
}

/// Frames sent by the extension to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inbound {
    Event {
        event: BrowserEvent,
    },
    Action {
        request_id: u64,
        message: Value,
    },
    Reply {
        call_id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<ErrorInfo>,
    },
}

/// Frames sent by the host to the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outbound {
    Call {
        call_id: u64,
        method: CallMethod,
        params: Value,
    },
    Response {
        request_id: u64,
        body: Value,
    },
}

pub fn parse_inbound(payload: &[u8]) -> Result<Inbound, ErrorInfo> {
    serde_json::from_slice(payload).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("frame was not a valid bridge message: {}", err),
        )
    })
}
