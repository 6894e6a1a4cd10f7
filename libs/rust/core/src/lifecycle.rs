//! Service startup finite state machine.
//!
//! Phases:
//! - ConfigRepair
//! - ModelLoad
//! - Serving
//!
//! Tracks the time spent in each phase and publishes the current phase for
//! the `/status` endpoint.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Instant, Duration};
use serde::{Serialize, Deserialize};

static CURRENT_PHASE: AtomicU8 = AtomicU8::new(0);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StartupPhase { ConfigRepair, ModelLoad, Serving }

impl StartupPhase {
    pub fn as_str(&self) -> &'static str {
        match self { StartupPhase::ConfigRepair => "config_repair", StartupPhase::ModelLoad => "model_load", StartupPhase::Serving => "serving" }
    }
    fn code(self) -> u8 { match self { StartupPhase::ConfigRepair => 0, StartupPhase::ModelLoad => 1, StartupPhase::Serving => 2 } }
    fn from_code(c: u8) -> Self { match c { 0 => StartupPhase::ConfigRepair, 1 => StartupPhase::ModelLoad, _ => StartupPhase::Serving } }
}

/// Phase most recently published by a `StartupState` in this process.
pub fn current_phase() -> StartupPhase { StartupPhase::from_code(CURRENT_PHASE.load(Ordering::SeqCst)) }

#[derive(Debug)]
pub struct StartupState {
    phase: StartupPhase,
    started_at: Instant,
    phase_started_at: Instant,
    phase_durations: Vec<(StartupPhase, Duration)>,
}

impl Default for StartupState { fn default() -> Self { Self::new() } }

impl StartupState {
    pub fn new() -> Self {
        let now = Instant::now();
        let st = Self { phase: StartupPhase::ConfigRepair, started_at: now, phase_started_at: now, phase_durations: Vec::new() };
        st.publish();
        st
    }
    pub fn phase(&self) -> StartupPhase { self.phase }
    pub fn advance(&mut self) {
        let now = Instant::now();
        let dur = now - self.phase_started_at;
        self.phase_durations.push((self.phase, dur));
        self.phase = match self.phase { StartupPhase::ConfigRepair => StartupPhase::ModelLoad, StartupPhase::ModelLoad => StartupPhase::Serving, StartupPhase::Serving => StartupPhase::Serving };
        self.phase_started_at = now;
        self.publish();
        tracing::info!(phase = self.phase.as_str(), took_ms = dur.as_secs_f64() * 1000.0, "startup phase advanced");
    }
    pub fn is_serving(&self) -> bool { self.phase == StartupPhase::Serving }
    pub fn elapsed(&self) -> Duration { self.started_at.elapsed() }
    pub fn durations(&self) -> &[(StartupPhase, Duration)] { &self.phase_durations }
    fn publish(&self) { CURRENT_PHASE.store(self.phase.code(), Ordering::SeqCst); }
}
