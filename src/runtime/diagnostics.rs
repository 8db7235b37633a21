use std::sync::{Arc, Mutex};

use crate::Result;
use crate::bus::{EventPayload, ExperimentEvent, HandlerId};
use crate::flow::{Session, SessionBus};
use crate::logging::{LogLevel, Logger, event_with_fields};
use crate::metrics::SessionMetrics;

/// Logs every bus emission together with its payload fields.
pub struct EventLogger {
    logger: Logger,
    level: LogLevel,
    target: String,
    log_pointer: bool,
}

impl EventLogger {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            target: "katona::flow.events".to_string(),
            log_pointer: true,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Pointer updates arrive every frame; they are logged at trace level.
    pub fn log_pointer(mut self, enabled: bool) -> Self {
        self.log_pointer = enabled;
        self
    }

    /// Register one permanent handler per event kind.
    pub fn attach(self, bus: &SessionBus) -> Result<Vec<HandlerId>> {
        let mut ids = Vec::with_capacity(ExperimentEvent::ALL.len());
        for kind in ExperimentEvent::ALL {
            if kind == ExperimentEvent::MouseUpdate && !self.log_pointer {
                continue;
            }
            let level = if kind == ExperimentEvent::MouseUpdate {
                LogLevel::Trace
            } else {
                self.level
            };
            let logger = self.logger.clone();
            let target = self.target.clone();
            let message = format!("event.{}", kind.name().to_ascii_lowercase());
            let id = bus.on(
                kind,
                move |_: &mut Session, _: &SessionBus, payload: &EventPayload| {
                    let event = event_with_fields(level, &target, &message, payload.fields());
                    let _ = logger.log_event(event);
                    Ok(())
                },
            )?;
            ids.push(id);
        }
        Ok(ids)
    }
}

/// Count every emission into the shared metrics.
pub fn attach_event_counter(
    bus: &SessionBus,
    metrics: Arc<Mutex<SessionMetrics>>,
) -> Result<Vec<HandlerId>> {
    ExperimentEvent::ALL
        .into_iter()
        .map(|kind| {
            let metrics = Arc::clone(&metrics);
            bus.on(
                kind,
                move |_: &mut Session, _: &SessionBus, _: &EventPayload| {
                    if let Ok(mut guard) = metrics.lock() {
                        guard.record_events(1);
                    }
                    Ok(())
                },
            )
        })
        .collect()
}
