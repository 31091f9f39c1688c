//! Stdio bridge to the browser extension.
//!
//! The extension owns every browser API. The host reaches them by writing a
//! `call` frame and blocking until the matching `reply` arrives. Frames that
//! show up in the meantime (events, actions) are queued and handed to the
//! main loop afterwards, so handlers still run one at a time.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use tabgroup_core::{
    AlarmHost, BookmarkHost, BookmarkQuery, HostError, HostResult, KeyValueStore, TabHost,
};
use tabgroup_protocol::{
    parse_inbound, read_frame, write_frame, Alarm, Bookmark, BrowserEvent, CallMethod, GroupId,
    GroupUpdate, Inbound, Outbound, Tab, TabGroup, TabId, WindowId,
};

/// What the stdin reader thread forwards.
#[derive(Debug)]
pub enum Incoming {
    Frame(Vec<u8>),
    Closed,
    ReadFailed(String),
}

/// Next unit of work for the main loop.
#[derive(Debug, PartialEq)]
pub enum Next {
    Event(BrowserEvent),
    Action { request_id: u64, message: Value },
    Idle,
    Closed,
}

/// Reads frames from `input` until EOF or error and forwards them to `tx`.
pub fn spawn_reader<R>(mut input: R, tx: Sender<Incoming>) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || loop {
        let incoming = match read_frame(&mut input) {
            Ok(Some(frame)) => Incoming::Frame(frame),
            Ok(None) => Incoming::Closed,
            Err(err) => Incoming::ReadFailed(err.to_string()),
        };
        let last = !matches!(incoming, Incoming::Frame(_));
        if tx.send(incoming).is_err() || last {
            break;
        }
    })
}

pub struct Bridge<W: Write> {
    writer: RefCell<W>,
    inbox: Receiver<Incoming>,
    pending: RefCell<VecDeque<Inbound>>,
    closed: Cell<bool>,
    next_call_id: Cell<u64>,
    call_timeout: Duration,
}

impl<W: Write> Bridge<W> {
    pub fn new(writer: W, inbox: Receiver<Incoming>, call_timeout: Duration) -> Self {
        Self {
            writer: RefCell::new(writer),
            inbox,
            pending: RefCell::new(VecDeque::new()),
            closed: Cell::new(false),
            next_call_id: Cell::new(1),
            call_timeout,
        }
    }

    /// Queued frames first, then whatever arrives within `wait`.
    pub fn next_inbound(&self, wait: Duration) -> Next {
        if let Some(inbound) = self.pending.borrow_mut().pop_front() {
            return Self::into_next(inbound);
        }
        if self.closed.get() {
            return Next::Closed;
        }

        match self.inbox.recv_timeout(wait) {
            Ok(Incoming::Frame(bytes)) => match parse_inbound(&bytes) {
                Ok(inbound) => Self::into_next(inbound),
                Err(err) => {
                    warn!(code = %err.code, message = %err.message, "Dropping malformed frame");
                    Next::Idle
                }
            },
            Ok(Incoming::Closed) => {
                self.closed.set(true);
                Next::Closed
            }
            Ok(Incoming::ReadFailed(err)) => {
                warn!(error = %err, "Failed to read from extension");
                self.closed.set(true);
                Next::Closed
            }
            Err(RecvTimeoutError::Timeout) => Next::Idle,
            Err(RecvTimeoutError::Disconnected) => {
                self.closed.set(true);
                Next::Closed
            }
        }
    }

    fn into_next(inbound: Inbound) -> Next {
        match inbound {
            Inbound::Event { event } => Next::Event(event),
            Inbound::Action {
                request_id,
                message,
            } => Next::Action {
                request_id,
                message,
            },
            Inbound::Reply { call_id, .. } => {
                debug!(call_id, "Dropping reply to an abandoned call");
                Next::Idle
            }
        }
    }

    pub fn respond(&self, request_id: u64, body: Value) -> io::Result<()> {
        self.send(&Outbound::Response { request_id, body })
    }

    fn send(&self, message: &Outbound) -> io::Result<()> {
        let bytes = serde_json::to_vec(message)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        write_frame(&mut *self.writer.borrow_mut(), &bytes)
    }

    /// Issues one bridge call and waits for its reply.
    pub fn call(&self, method: CallMethod, params: Value) -> HostResult<Value> {
        if self.closed.get() {
            return Err(HostError::Failed("Extension disconnected".to_string()));
        }

        let call_id = self.next_call_id.get();
        self.next_call_id.set(call_id + 1);
        self.send(&Outbound::Call {
            call_id,
            method,
            params,
        })
        .map_err(|err| HostError::Failed(format!("Failed to send {:?} call: {}", method, err)))?;

        let deadline = Instant::now() + self.call_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let incoming = match self.inbox.recv_timeout(remaining) {
                Ok(incoming) => incoming,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(call_id, method = ?method, "Bridge call timed out");
                    return Err(HostError::Unavailable(format!(
                        "{:?} call timed out",
                        method
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => Incoming::Closed,
            };

            let bytes = match incoming {
                Incoming::Frame(bytes) => bytes,
                Incoming::Closed | Incoming::ReadFailed(_) => {
                    self.closed.set(true);
                    return Err(HostError::Failed("Extension disconnected".to_string()));
                }
            };

            match parse_inbound(&bytes) {
                Ok(Inbound::Reply {
                    call_id: reply_id,
                    result,
                    error,
                }) if reply_id == call_id => {
                    return match error {
                        Some(err) => Err(HostError::classify(&err.code, &err.message)),
                        None => Ok(result.unwrap_or(Value::Null)),
                    };
                }
                Ok(Inbound::Reply {
                    call_id: stale, ..
                }) => debug!(call_id = stale, "Dropping reply to an abandoned call"),
                Ok(other) => self.pending.borrow_mut().push_back(other),
                Err(err) => {
                    warn!(code = %err.code, message = %err.message, "Dropping malformed frame")
                }
            }
        }
    }

    fn call_as<T: DeserializeOwned>(&self, method: CallMethod, params: Value) -> HostResult<T> {
        let value = self.call(method, params)?;
        serde_json::from_value(value).map_err(|err| {
            HostError::Failed(format!("Malformed {:?} reply: {}", method, err))
        })
    }

    fn call_unit(&self, method: CallMethod, params: Value) -> HostResult<()> {
        self.call(method, params).map(|_| ())
    }
}

impl<W: Write> KeyValueStore for Bridge<W> {
    fn get(&self, key: &str) -> HostResult<Option<Value>> {
        let value = self.call(CallMethod::StorageGet, json!({ "key": key }))?;
        Ok(match value {
            Value::Null => None,
            value => Some(value),
        })
    }

    fn set(&self, key: &str, value: Value) -> HostResult<()> {
        self.call_unit(CallMethod::StorageSet, json!({ "key": key, "value": value }))
    }
}

impl<W: Write> TabHost for Bridge<W> {
    fn query_tabs(&self) -> HostResult<Vec<Tab>> {
        self.call_as(CallMethod::TabsQuery, json!({}))
    }

    fn active_tab(&self) -> HostResult<Option<Tab>> {
        self.call_as(CallMethod::TabsGetActive, json!({}))
    }

    fn get_tab(&self, tab_id: TabId) -> HostResult<Tab> {
        self.call_as(CallMethod::TabsGet, json!({ "tabId": tab_id }))
    }

    fn activate_tab(&self, tab_id: TabId) -> HostResult<()> {
        self.call_unit(CallMethod::TabsActivate, json!({ "tabId": tab_id }))
    }

    fn focus_window(&self, window_id: WindowId) -> HostResult<()> {
        self.call_unit(CallMethod::WindowsFocus, json!({ "windowId": window_id }))
    }

    fn create_tab(&self, url: &str) -> HostResult<Tab> {
        self.call_as(CallMethod::TabsCreate, json!({ "url": url }))
    }

    fn remove_tab(&self, tab_id: TabId) -> HostResult<()> {
        self.call_unit(CallMethod::TabsRemove, json!({ "tabId": tab_id }))
    }

    fn group_tabs(&self, tab_ids: &[TabId], group: Option<GroupId>) -> HostResult<GroupId> {
        self.call_as(
            CallMethod::TabsGroup,
            json!({ "tabIds": tab_ids, "groupId": group }),
        )
    }

    fn query_groups(&self) -> HostResult<Vec<TabGroup>> {
        self.call_as(CallMethod::TabGroupsQuery, json!({}))
    }

    fn get_group(&self, group_id: GroupId) -> HostResult<TabGroup> {
        self.call_as(CallMethod::TabGroupsGet, json!({ "groupId": group_id }))
    }

    fn update_group(&self, group_id: GroupId, update: &GroupUpdate) -> HostResult<()> {
        self.call_unit(
            CallMethod::TabGroupsUpdate,
            json!({ "groupId": group_id, "update": update }),
        )
    }

    fn show_overlay(&self, tab_id: TabId) -> HostResult<()> {
        self.call_unit(CallMethod::OverlayShow, json!({ "tabId": tab_id }))
    }
}

impl<W: Write> BookmarkHost for Bridge<W> {
    fn search_bookmarks(&self, query: &BookmarkQuery) -> HostResult<Vec<Bookmark>> {
        let params = match query {
            BookmarkQuery::Text(text) => json!({ "query": text }),
            BookmarkQuery::Url(url) => json!({ "url": url }),
        };
        self.call_as(CallMethod::BookmarksSearch, params)
    }

    fn get_bookmark(&self, id: &str) -> HostResult<Bookmark> {
        self.call_as(CallMethod::BookmarksGet, json!({ "id": id }))
    }

    fn create_bookmark(
        &self,
        parent_id: Option<&str>,
        title: &str,
        url: &str,
    ) -> HostResult<Bookmark> {
        self.call_as(
            CallMethod::BookmarksCreate,
            json!({ "parentId": parent_id, "title": title, "url": url }),
        )
    }

    fn remove_bookmark(&self, id: &str) -> HostResult<()> {
        self.call_unit(CallMethod::BookmarksRemove, json!({ "id": id }))
    }
}

impl<W: Write> AlarmHost for Bridge<W> {
    fn get_alarm(&self, name: &str) -> HostResult<Option<Alarm>> {
        self.call_as(CallMethod::AlarmsGet, json!({ "name": name }))
    }

    fn create_alarm(&self, name: &str, delay_minutes: u32, period_minutes: u32) -> HostResult<()> {
        self.call_unit(
            CallMethod::AlarmsCreate,
            json!({
                "name": name,
                "delayInMinutes": delay_minutes,
                "periodInMinutes": period_minutes,
            }),
        )
    }

    fn clear_alarm(&self, name: &str) -> HostResult<bool> {
        let cleared = self.call(CallMethod::AlarmsClear, json!({ "name": name }))?;
        Ok(cleared.as_bool().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc;

    fn frame(value: Value) -> Incoming {
        Incoming::Frame(serde_json::to_vec(&value).expect("json"))
    }

    fn written(bridge: Bridge<Vec<u8>>) -> Vec<Value> {
        let bytes = bridge.writer.into_inner();
        let mut cursor = Cursor::new(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = read_frame(&mut cursor).expect("frame") {
            frames.push(serde_json::from_slice(&frame).expect("json"));
        }
        frames
    }

    #[test]
    fn call_returns_matching_reply_and_queues_other_frames() {
        let (tx, rx) = mpsc::channel();
        tx.send(frame(json!({"kind": "event", "event": {"type": "tab_removed", "tab_id": 3}})))
            .expect("send");
        tx.send(frame(json!({"kind": "reply", "call_id": 99, "result": "stale"})))
            .expect("send");
        tx.send(frame(json!({"kind": "reply", "call_id": 1, "result": {"a": 1}})))
            .expect("send");
        let bridge = Bridge::new(Vec::new(), rx, Duration::from_secs(1));

        let value = KeyValueStore::get(&bridge, "tabActivity").expect("get");
        assert_eq!(value, Some(json!({"a": 1})));
        assert_eq!(
            bridge.next_inbound(Duration::from_millis(1)),
            Next::Event(BrowserEvent::TabRemoved { tab_id: 3 })
        );

        let frames = written(bridge);
        assert_eq!(
            frames,
            vec![json!({
                "kind": "call",
                "call_id": 1,
                "method": "storage_get",
                "params": {"key": "tabActivity"},
            })]
        );
    }

    #[test]
    fn error_replies_are_classified() {
        let (tx, rx) = mpsc::channel();
        tx.send(frame(json!({
            "kind": "reply",
            "call_id": 1,
            "error": {
                "code": "runtime",
                "message": "Tabs cannot be edited right now (user may be dragging a tab).",
            },
        })))
        .expect("send");
        let bridge = Bridge::new(Vec::new(), rx, Duration::from_secs(1));

        let err = bridge.activate_tab(5).unwrap_err();
        assert!(err.is_busy());
    }

    #[test]
    fn silent_extension_times_out_as_unavailable() {
        let (_tx, rx) = mpsc::channel();
        let bridge = Bridge::new(Vec::new(), rx, Duration::from_millis(20));

        let err = bridge.query_tabs().unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn disconnect_fails_fast_and_ends_loop() {
        let (tx, rx) = mpsc::channel();
        tx.send(Incoming::Closed).expect("send");
        let bridge = Bridge::new(Vec::new(), rx, Duration::from_secs(5));

        let err = bridge.query_groups().unwrap_err();
        assert_eq!(err, HostError::Failed("Extension disconnected".to_string()));
        assert!(bridge.closed.get());
        assert_eq!(bridge.next_inbound(Duration::from_millis(1)), Next::Closed);
    }

    #[test]
    fn malformed_reply_payload_is_a_failure() {
        let (tx, rx) = mpsc::channel();
        tx.send(frame(json!({"kind": "reply", "call_id": 1, "result": "not a tab"})))
            .expect("send");
        let bridge = Bridge::new(Vec::new(), rx, Duration::from_secs(1));

        let err = bridge.get_tab(1).unwrap_err();
        assert!(err.to_string().starts_with("Malformed TabsGet reply"));
    }

    #[test]
    fn reader_thread_forwards_frames_then_close() {
        let mut input = Vec::new();
        write_frame(&mut input, br#"{"kind":"event","event":{"type":"startup"}}"#).expect("frame");
        let (tx, rx) = mpsc::channel();
        spawn_reader(Cursor::new(input), tx).join().expect("reader");

        let bridge = Bridge::new(Vec::new(), rx, Duration::from_secs(1));
        assert_eq!(
            bridge.next_inbound(Duration::from_millis(50)),
            Next::Event(BrowserEvent::Startup)
        );
        assert_eq!(bridge.next_inbound(Duration::from_millis(50)), Next::Closed);
    }
}
