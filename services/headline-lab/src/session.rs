//! Per-visitor state: the current headline slot, the last results shown, and
//! the busy flag enforcing one active request per session.

use crate::detection::Verdict;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState { Idle, Generating, Detecting }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel { Info, Success, Warning, Error }

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self { Self { level, message: message.into() } }
}

#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    /// Write-wins slot shared by both flows.
    pub current_headline: String,
    pub last_prompt: String,
    pub last_generated: Option<String>,
    pub last_verdict: Option<Verdict>,
    state: SessionState,
    notices: Vec<Notice>,
    last_seen: Instant,
}

impl Session {
    fn new(id: Uuid, default_headline: &str, default_prompt: &str) -> Self {
        Self {
            id,
            current_headline: default_headline.to_string(),
            last_prompt: default_prompt.to_string(),
            last_generated: None,
            last_verdict: None,
            state: SessionState::Idle,
            notices: Vec::new(),
            last_seen: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState { self.state }
    pub fn push_notice(&mut self, notice: Notice) { self.notices.push(notice); }
    /// Notices are transient: each is shown once.
    pub fn take_notices(&mut self) -> Vec<Notice> { std::mem::take(&mut self.notices) }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Marks a session busy for the lifetime of the guard.
pub struct BusyGuard { session: SessionHandle }

impl Drop for BusyGuard {
    fn drop(&mut self) { self.session.lock().state = SessionState::Idle; }
}

/// Moves an idle session into `next`; returns `None` when a request is already running.
pub fn begin(session: &SessionHandle, next: SessionState) -> Option<BusyGuard> {
    let mut s = session.lock();
    if s.state != SessionState::Idle { return None; }
    s.state = next;
    Some(BusyGuard { session: session.clone() })
}

pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    ttl: Duration,
    default_headline: String,
    default_prompt: String,
    greeting: Option<Notice>,
    last_sweep: Mutex<Instant>,
}

/// Upper bound on the gap between two sweeps of the whole map.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

impl SessionStore {
    pub fn new(ttl: Duration, default_headline: impl Into<String>, default_prompt: impl Into<String>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            default_headline: default_headline.into(),
            default_prompt: default_prompt.into(),
            greeting: None,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Notice queued on every new session, e.g. the startup config confirmation.
    pub fn with_greeting(mut self, greeting: Notice) -> Self { self.greeting = Some(greeting); self }

    /// Returns the live session for `id`, or a fresh one (with a new id) when
    /// `id` is absent, unknown or expired.
    pub fn get_or_create(&self, id: Option<Uuid>) -> SessionHandle {
        if self.sweep_due() { self.sweep(); }
        if let Some(id) = id {
            if let Some(existing) = self.sessions.read().get(&id).cloned() {
                let mut s = existing.lock();
                if !self.expired(&s) {
                    s.last_seen = Instant::now();
                    drop(s);
                    return existing;
                }
            }
            self.sessions.write().remove(&id);
        }
        let id = Uuid::new_v4();
        let mut session = Session::new(id, &self.default_headline, &self.default_prompt);
        if let Some(g) = &self.greeting { session.push_notice(g.clone()); }
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().insert(id, handle.clone());
        tracing::debug!(session = %id, "session created");
        handle
    }

    pub fn len(&self) -> usize { self.sessions.read().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn expired(&self, s: &Session) -> bool {
        s.state == SessionState::Idle && s.last_seen.elapsed() >= self.ttl
    }

    // Claims the next sweep slot, at most once per min(ttl, SWEEP_INTERVAL).
    fn sweep_due(&self) -> bool {
        let mut last = self.last_sweep.lock();
        if last.elapsed() < self.ttl.min(SWEEP_INTERVAL) { return false; }
        *last = Instant::now();
        true
    }

    /// Drops idle sessions not seen within the ttl.
    pub fn sweep(&self) {
        self.sessions.write().retain(|_, s| !self.expired(&s.lock()));
    }
}
