use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

/// Counters collected over one session. Shared with the runtime as
/// `Arc<Mutex<SessionMetrics>>`.
#[derive(Debug, Default, Clone)]
pub struct SessionMetrics {
    frames: u64,
    events: u64,
    moves: u64,
    resets: u64,
    impasses: u64,
    probe_answers: u64,
    renders: u64,
    log_failures: u64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&mut self) {
        self.frames = self.frames.saturating_add(1);
    }

    pub fn record_events(&mut self, count: usize) {
        if count > 0 {
            self.events = self.events.saturating_add(count as u64);
        }
    }

    pub fn record_move(&mut self) {
        self.moves = self.moves.saturating_add(1);
    }

    pub fn record_reset(&mut self) {
        self.resets = self.resets.saturating_add(1);
    }

    pub fn record_impasse(&mut self) {
        self.impasses = self.impasses.saturating_add(1);
    }

    pub fn record_probe_answer(&mut self) {
        self.probe_answers = self.probe_answers.saturating_add(1);
    }

    pub fn record_render(&mut self) {
        self.renders = self.renders.saturating_add(1);
    }

    /// A log sink rejected an event.
    pub fn record_log_failure(&mut self) {
        self.log_failures = self.log_failures.saturating_add(1);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            frames: self.frames,
            events: self.events,
            moves: self.moves,
            resets: self.resets,
            impasses: self.impasses,
            probe_answers: self.probe_answers,
            renders: self.renders,
            log_failures: self.log_failures,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub frames: u64,
    pub events: u64,
    pub moves: u64,
    pub resets: u64,
    pub impasses: u64,
    pub probe_answers: u64,
    pub renders: u64,
    pub log_failures: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(
            LogLevel::Info,
            target.to_string(),
            "session_metrics".to_string(),
            self.as_fields(),
        )
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("frames".to_string(), json!(self.frames));
        map.insert("events".to_string(), json!(self.events));
        map.insert("moves".to_string(), json!(self.moves));
        map.insert("resets".to_string(), json!(self.resets));
        map.insert("impasses".to_string(), json!(self.impasses));
        map.insert("probe_answers".to_string(), json!(self.probe_answers));
        map.insert("renders".to_string(), json!(self.renders));
        map.insert("log_failures".to_string(), json!(self.log_failures));
        map
    }
}
