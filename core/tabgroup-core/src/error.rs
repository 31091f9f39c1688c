//! Error types for tabgroup-core operations.
//!
//! `HostError` classifies failures of host capabilities so callers can decide
//! whether to retry. `TabGroupError` is what action handlers return; the
//! dispatch boundary turns it into a `{success:false, error}` reply.

// ═══════════════════════════════════════════════════════════════════════════════
// Host Capability Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure of a call into the browser host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The host process is suspended or being respawned. Transient.
    #[error("Host unavailable: {0}")]
    Unavailable(String),

    /// The tab strip is locked, typically while the user drags a tab. Transient.
    #[error("Tab strip busy: {0}")]
    Busy(String),

    /// Anything else, e.g. an unknown tab id. Not retried.
    #[error("{0}")]
    Failed(String),
}

impl HostError {
    /// Maps a bridge error reply onto the retry classes above.
    pub fn classify(code: &str, message: &str) -> Self {
        if code == "unavailable" || message.contains("No SW") {
            HostError::Unavailable(message.to_string())
        } else if code == "busy" || message.contains("user may be dragging") {
            HostError::Busy(message.to_string())
        } else {
            HostError::Failed(message.to_string())
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, HostError::Unavailable(_))
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, HostError::Busy(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Action Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors an inbound action can end with.
#[derive(Debug, thiserror::Error)]
pub enum TabGroupError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Duplicate click")]
    DuplicateClick,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid {action} request: {details}")]
    InvalidRequest { action: String, details: String },

    #[error("This page is already bookmarked")]
    AlreadyBookmarked,
}

/// Convenience type alias for Results using TabGroupError.
pub type Result<T> = std::result::Result<T, TabGroupError>;

impl From<TabGroupError> for String {
    fn from(err: TabGroupError) -> String {
        err.to_string()
    }
}
