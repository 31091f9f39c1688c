//! # tabgroup-core
//!
//! Background coordination for the tab grouper: puts tabs into per-site
//! groups, records when each tab was last used, and collapses groups that
//! have sat idle longer than the user's timeout.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. The host binary drives one event or
//!   action at a time.
//! - **Suspendable**: Every piece of persistent state lives in the host's
//!   key-value store; only the dedup gate and deferred tasks are in memory and
//!   they may be lost at any moment.
//! - **Graceful degradation**: Failed reads fall back to defaults, failed
//!   writes are logged and dropped, and every handler answers rather than
//!   propagating errors.
//! - **Capability seams**: The browser is reached only through the traits in
//!   [`host`], so everything here runs against in-memory fakes in tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tabgroup_core::{Coordinator, CoordinatorConfig};
//!
//! let mut coordinator = Coordinator::with_system_clock(host, CoordinatorConfig::default());
//! coordinator.on_process_start();
//! let reply = coordinator.handle_message(serde_json::json!({"action": "ping"}));
//! ```

pub mod actions;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod grouping;
pub mod host;
pub mod ledger;
pub mod recent;
pub mod retry;
pub mod scanner;
pub mod scheduler;
pub mod search;
pub mod settings;
pub mod store;
pub mod tabs;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

// Re-export commonly used items at crate root
pub use classifier::{classify, default_group_name, HostOverrides, UNKNOWN_GROUP};
pub use config::CoordinatorConfig;
pub use coordinator::{normalize_url, Coordinator, DeferredTask};
pub use error::{HostError, Result, TabGroupError};
pub use grouping::{Assignment, BulkGrouping};
pub use host::{
    AlarmHost, BookmarkHost, BookmarkQuery, Clock, Host, HostResult, KeyValueStore, SystemClock,
    TabHost,
};
pub use retry::RetryPolicy;
pub use scanner::{ScanOutcome, ScanReport};
pub use scheduler::EnsureOutcome;
pub use settings::validate as validate_settings;
