use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use crate::config::ExperimentConfig;
use crate::flow::{ExperimentFlowController, FrameOutcome, SessionSummary};
use crate::input::{InputFrame, InputSource};
use crate::logging::{LogLevel, Logger, NullSink, event_with_fields, json_kv};
use crate::metrics::SessionMetrics;
use crate::record::DataSink;
use crate::render::Renderer;
use crate::Result;

pub mod diagnostics;
pub mod driver;

use diagnostics::{EventLogger, attach_event_counter};

/// Configuration knobs for the runtime loop.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Longest wait for input before a frame runs anyway.
    pub tick_interval: Duration,
    /// Optional structured logger used by the runtime and the session.
    pub logger: Option<Logger>,
    /// Metrics accumulator used for periodic snapshots.
    pub metrics: Option<Arc<Mutex<SessionMetrics>>>,
    /// Interval between metrics snapshot emissions. Zero disables snapshots.
    pub metrics_interval: Duration,
    /// Target field used when emitting metrics snapshots.
    pub metrics_target: String,
    /// Log every bus emission on `katona::flow.events`.
    pub log_events: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(16),
            logger: None,
            metrics: None,
            metrics_interval: Duration::from_secs(5),
            metrics_target: "katona::runtime.metrics".to_string(),
            log_events: true,
        }
    }
}

impl RuntimeConfig {
    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(SessionMetrics::new())));
        }
    }

    /// Disable metrics collection and prevent further snapshots.
    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    /// Access the shared metrics handle if metrics are enabled.
    pub fn metrics_handle(&self) -> Option<Arc<Mutex<SessionMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

/// Frame loop around an [`ExperimentFlowController`]: pulls input, runs the
/// frame, clears input when asked to and redraws when something changed.
pub struct SessionRuntime {
    controller: ExperimentFlowController,
    renderer: Box<dyn Renderer>,
    config: RuntimeConfig,
    redraw_requested: bool,
    frames: u64,
    start_instant: Option<Instant>,
    last_metrics_emit: Option<Instant>,
}

impl SessionRuntime {
    pub fn new(
        experiment: &ExperimentConfig,
        sink: impl DataSink + 'static,
        renderer: impl Renderer + 'static,
        mut config: RuntimeConfig,
    ) -> Result<Self> {
        if config.metrics.is_none() && config.metrics_interval > Duration::ZERO {
            config.enable_metrics();
        }
        let logger = config
            .logger
            .clone()
            .unwrap_or_else(|| Logger::new(NullSink));
        let controller =
            ExperimentFlowController::new(experiment, sink, logger.clone(), config.metrics_handle())?;
        if config.logger.is_some() && config.log_events {
            EventLogger::new(logger).attach(controller.bus())?;
        }
        if let Some(metrics) = config.metrics_handle() {
            attach_event_counter(controller.bus(), metrics)?;
        }

        Ok(Self {
            controller,
            renderer: Box::new(renderer),
            config,
            redraw_requested: true,
            frames: 0,
            start_instant: None,
            last_metrics_emit: None,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn controller(&self) -> &ExperimentFlowController {
        &self.controller
    }

    /// Run until the session completes or the input source runs dry.
    pub fn run(
        &mut self,
        input: &mut dyn InputSource,
        stdout: &mut impl Write,
    ) -> Result<SessionSummary> {
        self.bootstrap(stdout)?;

        while !self.controller.is_finished() {
            let Some(frame) = input.poll(self.config.tick_interval)? else {
                self.log_runtime_event(LogLevel::Info, "input_exhausted", std::iter::empty());
                break;
            };
            let outcome = self.frame(&frame, stdout)?;
            if outcome.clear_input {
                input.clear_input();
            }
        }

        Ok(self.finalize())
    }

    /// Replay prepared frames. Input clearing requests are ignored because
    /// the reaction times are already part of the frames.
    pub fn run_scripted<I>(&mut self, stdout: &mut impl Write, frames: I) -> Result<SessionSummary>
    where
        I: IntoIterator<Item = InputFrame>,
    {
        self.bootstrap(stdout)?;
        for frame in frames {
            self.frame(&frame, stdout)?;
            if self.controller.is_finished() {
                break;
            }
        }
        Ok(self.finalize())
    }

    fn frame(&mut self, frame: &InputFrame, stdout: &mut impl Write) -> Result<FrameOutcome> {
        let outcome = self.controller.on_frame(frame)?;
        self.frames += 1;
        if outcome.redraw || outcome.finished {
            self.redraw_requested = true;
        }
        self.render_if_needed(stdout)?;
        self.maybe_emit_metrics();
        Ok(outcome)
    }

    fn render_if_needed(&mut self, stdout: &mut impl Write) -> Result<()> {
        if !self.redraw_requested {
            return Ok(());
        }
        self.redraw_requested = false;

        let view = self.controller.view();
        if self.renderer.render(stdout, &view)? {
            if let Some(metrics) = self.config.metrics.as_ref() {
                if let Ok(mut guard) = metrics.lock() {
                    guard.record_render();
                }
            }
            self.log_runtime_event(
                LogLevel::Trace,
                "render_completed",
                [json_kv("phase", json!(view.phase.label()))],
            );
        }
        Ok(())
    }

    fn bootstrap(&mut self, stdout: &mut impl Write) -> Result<()> {
        let now = Instant::now();
        self.start_instant = Some(now);
        self.last_metrics_emit = Some(now);
        self.redraw_requested = true;
        self.log_runtime_event(
            LogLevel::Info,
            "runtime_started",
            [json_kv("tick_ms", json!(self.config.tick_interval.as_millis()))],
        );
        self.controller.start()?;
        self.render_if_needed(stdout)
    }

    fn finalize(&mut self) -> SessionSummary {
        let summary = self.controller.summary();
        let uptime_ms = self
            .start_instant
            .map(|start| start.elapsed().as_millis())
            .unwrap_or(0);
        self.log_runtime_event(
            LogLevel::Info,
            "runtime_stopped",
            [
                json_kv("uptime_ms", json!(uptime_ms)),
                json_kv("frames", json!(self.frames)),
                json_kv("solved", json!(summary.solution.is_some())),
            ],
        );
        summary
    }

    fn log_runtime_event<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        if let Some(logger) = self.config.logger.as_ref() {
            let event = event_with_fields(level, "katona::runtime", message, fields);
            if logger.log_event(event).is_err() {
                self.record_log_failure();
            }
        }
    }

    fn record_log_failure(&self) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                guard.record_log_failure();
            }
        }
    }

    fn maybe_emit_metrics(&mut self) {
        if self.config.metrics.is_none() {
            return;
        }

        if self.config.metrics_interval == Duration::ZERO {
            return;
        }

        let now = Instant::now();
        match self.last_metrics_emit {
            Some(last) if now.duration_since(last) < self.config.metrics_interval => {
                return;
            }
            _ => {
                self.last_metrics_emit = Some(now);
            }
        }

        let uptime = self
            .start_instant
            .map(|start| now.duration_since(start))
            .unwrap_or_default();

        if let (Some(logger), Some(metrics)) =
            (self.config.logger.as_ref(), self.config.metrics.as_ref())
        {
            if let Ok(guard) = metrics.lock() {
                let target = self.config.metrics_target.as_str();
                let snapshot_event = guard.snapshot(uptime).to_log_event(target);
                drop(guard);
                if logger.log_event(snapshot_event).is_err() {
                    self.record_log_failure();
                }
            }
        }
    }
}
