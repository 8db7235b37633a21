use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::bus::{EventBus, EventPayload, ExperimentEvent};
use crate::config::{ExperimentConfig, FlowStep};
use crate::error::{KatonaError, Result};
use crate::geometry::CellId;
use crate::input::{InputFrame, InputSample};
use crate::logging::{LogLevel, Logger, json_kv, json_str};
use crate::metrics::SessionMetrics;
use crate::probe::{ProbeKind, ResponseKey};
use crate::record::DataSink;
use crate::render::FrameView;

use super::session::{Session, SessionBus, rearm_board, register_permanent_handlers};

const TARGET: &str = "katona::flow";

/// Where a training step is in its own little script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStage {
    /// Waiting for every target cell to be filled.
    Moving,
    /// Targets filled; waiting for a reset newer than `resets_seen`.
    AwaitingReset { resets_seen: usize },
    /// Done; the board stays on screen a little longer.
    Lingering { remaining: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Instruction { name: String },
    Training { name: String, stage: TrainingStage },
    ProbeTraining { remaining: usize },
    MainTask,
    ImpasseProbe { remaining: Duration },
    Complete,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Instruction { .. } => "instruction",
            Phase::Training { .. } => "training",
            Phase::ProbeTraining { .. } => "probe_training",
            Phase::MainTask => "main_task",
            Phase::ImpasseProbe { .. } => "impasse_probe",
            Phase::Complete => "complete",
        }
    }

    /// Whether the puzzle board takes input in this phase.
    pub fn is_board(&self) -> bool {
        matches!(self, Phase::Training { .. } | Phase::MainTask)
    }
}

/// What the runtime should do after a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    pub redraw: bool,
    pub clear_input: bool,
    pub finished: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    pub solution: Option<String>,
    pub timed_out: bool,
    pub quit: bool,
    pub moves: usize,
    pub resets: usize,
    pub impasses: usize,
    pub solving_time: Duration,
    pub records: usize,
}

struct TrainingPlan {
    targets: Vec<CellId>,
    requires_reset: bool,
    linger: Duration,
}

/// Runs the configured steps one after another and routes participant
/// input to the board, the probe or the instruction screens.
pub struct ExperimentFlowController {
    bus: SessionBus,
    session: Session,
    steps: Vec<FlowStep>,
    next_step: usize,
    phase: Phase,
    started: bool,
    phase_elapsed: Duration,
    trial_elapsed: Duration,
    probe_duration: Duration,
    time_limit: Option<Duration>,
    training: Option<TrainingPlan>,
    summary: SessionSummary,
}

impl ExperimentFlowController {
    pub fn new(
        config: &ExperimentConfig,
        sink: impl DataSink + 'static,
        logger: Logger,
        metrics: Option<Arc<Mutex<SessionMetrics>>>,
    ) -> Result<Self> {
        let session = Session::new(config, sink, logger, metrics)?;
        let bus = EventBus::new(ExperimentEvent::ALL);
        register_permanent_handlers(&bus)?;

        Ok(Self {
            bus,
            session,
            steps: config.flow.clone(),
            next_step: 0,
            phase: Phase::Complete,
            started: false,
            phase_elapsed: Duration::ZERO,
            trial_elapsed: Duration::ZERO,
            probe_duration: Duration::from_secs_f64(config.probe.impasse_duration_secs),
            time_limit: config.main_task_time_limit_secs.map(Duration::from_secs_f64),
            training: None,
            summary: SessionSummary::default(),
        })
    }

    pub fn bus(&self) -> &SessionBus {
        &self.bus
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.started && self.phase == Phase::Complete
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            moves: self.session.moves,
            resets: self.session.resets,
            solving_time: self.session.solving_time,
            records: self.session.recorder.written(),
            ..self.summary.clone()
        }
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            phase: &self.phase,
            grid: &self.session.grid,
            pieces: self.session.occupancy.pieces(),
            targets: match (&self.phase, self.training.as_ref()) {
                (
                    Phase::Training {
                        stage: TrainingStage::Moving,
                        ..
                    },
                    Some(plan),
                ) => plan.targets.as_slice(),
                _ => &[],
            },
            probe: self
                .session
                .probe
                .is_visible()
                .then(|| self.session.probe.probe_name())
                .flatten(),
            solving_time: self.session.solving_time,
            moves: self.session.moves,
        }
    }

    /// Enter the first step. Called implicitly by the first frame.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        self.session.log(
            LogLevel::Info,
            TARGET,
            "session_started",
            [json_kv("steps", json!(self.steps.len()))],
        );
        self.advance()
    }

    pub fn on_frame(&mut self, frame: &InputFrame) -> Result<FrameOutcome> {
        self.start()?;
        if self.phase == Phase::Complete {
            return Ok(FrameOutcome {
                finished: true,
                ..FrameOutcome::default()
            });
        }

        let sample = &frame.sample;
        let elapsed = frame.elapsed;
        let before = self.phase.clone();
        self.session.clear_requested = false;
        self.session.since_clear = self.session.since_clear.saturating_add(elapsed);
        self.session.update_metrics(SessionMetrics::record_frame);

        if sample.quit {
            self.summary.quit = true;
            self.session.log(LogLevel::Info, TARGET, "quit_requested", std::iter::empty());
            self.enter(Phase::Complete)?;
        } else {
            self.phase_elapsed = self.phase_elapsed.saturating_add(elapsed);
            self.trial_elapsed = self.trial_elapsed.saturating_add(elapsed);

            match self.phase.clone() {
                Phase::Instruction { name } => self.instruction_frame(sample, name)?,
                Phase::Training { name, stage } => self.training_frame(sample, elapsed, name, stage)?,
                Phase::ProbeTraining { remaining } => self.probe_training_frame(sample, remaining)?,
                Phase::MainTask => self.main_task_frame(sample, elapsed)?,
                Phase::ImpasseProbe { remaining } => {
                    self.impasse_probe_frame(sample, elapsed, remaining)?
                }
                Phase::Complete => {}
            }
        }

        Ok(FrameOutcome {
            redraw: !sample.is_idle() || self.phase != before,
            clear_input: self.session.clear_requested,
            finished: self.phase == Phase::Complete,
        })
    }

    fn instruction_frame(&mut self, sample: &InputSample, name: String) -> Result<()> {
        if !sample.proceed {
            return Ok(());
        }
        let payload = EventPayload::InstructionReading {
            name,
            rt: self.phase_elapsed.as_secs_f64(),
        };
        self.emit(ExperimentEvent::InstructionReading, &payload)?;
        self.advance()
    }

    fn training_frame(
        &mut self,
        sample: &InputSample,
        elapsed: Duration,
        name: String,
        stage: TrainingStage,
    ) -> Result<()> {
        self.board_frame(sample)?;

        let Some(plan) = self.training.as_ref() else {
            return self.advance();
        };
        let targets_filled = plan
            .targets
            .iter()
            .all(|&cell| self.session.occupancy.is_occupied(cell));
        let (requires_reset, linger) = (plan.requires_reset, plan.linger);

        let stage = match stage {
            TrainingStage::Moving if targets_filled => {
                if requires_reset {
                    TrainingStage::AwaitingReset {
                        resets_seen: self.session.resets,
                    }
                } else {
                    TrainingStage::Lingering { remaining: linger }
                }
            }
            TrainingStage::AwaitingReset { resets_seen } if self.session.resets > resets_seen => {
                TrainingStage::Lingering { remaining: linger }
            }
            TrainingStage::Lingering { remaining } => {
                let remaining = remaining.saturating_sub(elapsed);
                if remaining.is_zero() {
                    return self.advance();
                }
                TrainingStage::Lingering { remaining }
            }
            other => other,
        };
        self.phase = Phase::Training { name, stage };
        Ok(())
    }

    fn probe_training_frame(&mut self, sample: &InputSample, remaining: usize) -> Result<()> {
        if !self.answer_probe(sample, ExperimentEvent::TrainingProbeAnswer)? {
            return Ok(());
        }
        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            self.session.probe.stop();
            return self.advance();
        }
        self.phase = Phase::ProbeTraining { remaining };
        Ok(())
    }

    fn main_task_frame(&mut self, sample: &InputSample, elapsed: Duration) -> Result<()> {
        self.session.solving_time = self.session.solving_time.saturating_add(elapsed);
        self.session.impasse.advance(elapsed);
        self.board_frame(sample)?;

        if let Some(name) = self.session.interpreter.solution_name().map(str::to_string) {
            self.session.log(
                LogLevel::Info,
                TARGET,
                "solved",
                [
                    json_str("solution", name.as_str()),
                    json_kv("time_solving", json!(self.session.solving_time.as_secs_f64())),
                ],
            );
            self.summary.solution = Some(name);
            self.leave_board();
            return self.advance();
        }

        if self.session.impasse.poll_impasse() {
            let payload = EventPayload::Impasse {
                threshold: self.session.impasse.threshold().unwrap_or_default(),
                since_move: self.session.impasse.elapsed().as_secs_f64(),
                time_solving: self.session.solving_time.as_secs_f64(),
            };
            self.summary.impasses += 1;
            self.session.update_metrics(SessionMetrics::record_impasse);
            self.session.log(LogLevel::Info, TARGET, "impasse_detected", payload.fields());
            self.emit(ExperimentEvent::Impasse, &payload)?;

            self.session.probe.stop();
            self.session.probe.next_probe();
            self.enter(Phase::ImpasseProbe {
                remaining: self.probe_duration,
            })?;
            self.session.probe.set_auto_draw(true, 0.0);
            return Ok(());
        }

        if let Some(limit) = self.time_limit {
            if self.session.solving_time >= limit {
                self.summary.timed_out = true;
                self.session.log(LogLevel::Info, TARGET, "time_limit_reached", std::iter::empty());
                self.leave_board();
                return self.advance();
            }
        }
        Ok(())
    }

    fn impasse_probe_frame(
        &mut self,
        sample: &InputSample,
        elapsed: Duration,
        remaining: Duration,
    ) -> Result<()> {
        self.answer_probe(sample, ExperimentEvent::ProbeAnswer)?;

        let remaining = remaining.saturating_sub(elapsed);
        if remaining.is_zero() {
            self.session.probe.stop();
            return self.enter(Phase::MainTask);
        }
        self.phase = Phase::ImpasseProbe { remaining };
        Ok(())
    }

    /// Score a probe answer if one was given while the probe is visible.
    /// Returns whether an answer was recorded.
    fn answer_probe(&mut self, sample: &InputSample, event: ExperimentEvent) -> Result<bool> {
        let probe = &mut self.session.probe;
        probe.set_auto_draw(true, self.trial_elapsed.as_secs_f64());

        let key = sample.key.or_else(|| {
            (probe.kind() == ProbeKind::Control && sample.click.is_some()).then_some(ResponseKey::Click)
        });
        let Some(key) = key.filter(|_| probe.is_visible()) else {
            return Ok(false);
        };

        let correct = match probe.press_correctness(key) {
            Ok(correct) => correct,
            Err(KatonaError::ProhibitedKey { probe, key }) => {
                self.session.log(
                    LogLevel::Warn,
                    TARGET,
                    "prohibited_key",
                    [json_str("probeType", &probe), json_str("key", &key)],
                );
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        let payload = EventPayload::ProbeAnswer {
            probe_type: probe.kind().name().to_string(),
            probe_name: probe.probe_name().unwrap_or_default().to_string(),
            key,
            correct,
            rt: self.trial_elapsed.as_secs_f64(),
            time_from_start: self.phase_elapsed.as_secs_f64(),
        };
        self.emit(event, &payload)?;
        self.session.update_metrics(SessionMetrics::record_probe_answer);

        self.session.probe.next_probe();
        self.session.probe.set_auto_draw(false, 0.0);
        self.trial_elapsed = Duration::ZERO;
        Ok(true)
    }

    /// Translate one frame of input into board events.
    fn board_frame(&mut self, sample: &InputSample) -> Result<()> {
        if sample.reset {
            let payload = EventPayload::Reset {
                rt: self.session.since_clear.as_secs_f64(),
                time_solving: self.session.solving_time.as_secs_f64(),
            };
            self.emit(ExperimentEvent::Reset, &payload)?;
        }
        if let Some(position) = sample.pointer {
            self.emit(ExperimentEvent::MouseUpdate, &EventPayload::Pointer { position })?;
        }
        if sample.rotate {
            if let Some(piece) = self.session.occupancy.held() {
                self.session.occupancy.rotate(piece);
            }
        }
        if let Some(click) = sample.click {
            let payload = EventPayload::Click {
                position: click.position,
                rt: click.rt,
            };
            self.emit(ExperimentEvent::Click, &payload)?;
        }
        Ok(())
    }

    fn emit(&mut self, kind: ExperimentEvent, payload: &EventPayload) -> Result<()> {
        self.bus.emit(&mut self.session, kind, payload)
    }

    fn leave_board(&mut self) {
        self.session.measure_moves = false;
        self.bus.remove_all_expiring();
    }

    /// Move on to the next configured step, or finish.
    fn advance(&mut self) -> Result<()> {
        self.training = None;
        self.session.recorder.set_training(false);

        let Some(step) = self.steps.get(self.next_step).cloned() else {
            return self.enter(Phase::Complete);
        };
        self.next_step += 1;

        match step {
            FlowStep::Instruction { name } => self.enter(Phase::Instruction { name }),
            FlowStep::Training {
                name,
                targets,
                requires_reset,
                linger_secs,
            } => {
                let targets = targets
                    .into_iter()
                    .map(|index| self.session.grid.relative_to_absolute(index))
                    .collect::<Result<Vec<_>>>()?;
                self.training = Some(TrainingPlan {
                    targets,
                    requires_reset,
                    linger: Duration::from_secs_f64(linger_secs.max(0.0)),
                });
                self.session.recorder.set_training(true);
                self.session.measure_moves = false;
                rearm_board(&mut self.session, &self.bus)?;
                self.enter(Phase::Training {
                    name,
                    stage: TrainingStage::Moving,
                })
            }
            FlowStep::ProbeTraining { trials } => {
                self.session.recorder.set_training(true);
                self.session.probe.stop();
                self.session.probe.next_probe();
                self.enter(Phase::ProbeTraining { remaining: trials })
            }
            FlowStep::MainTask => {
                self.session.measure_moves = true;
                self.session.solving_time = Duration::ZERO;
                self.session.impasse.reset();
                self.session.impasse.start_clock();
                rearm_board(&mut self.session, &self.bus)?;
                self.enter(Phase::MainTask)
            }
        }
    }

    fn enter(&mut self, phase: Phase) -> Result<()> {
        self.session.log(
            LogLevel::Info,
            TARGET,
            "phase_entered",
            [
                json_str("phase", phase.label()),
                json_kv("step", json!(self.next_step)),
            ],
        );
        self.phase = phase;
        self.phase_elapsed = Duration::ZERO;
        self.trial_elapsed = Duration::ZERO;

        if self.phase == Phase::Complete {
            self.session.measure_moves = false;
            self.bus.remove_all_expiring();
            self.session.recorder.flush()?;
            let summary = self.summary();
            self.session.log(
                LogLevel::Info,
                TARGET,
                "session_complete",
                [
                    json_kv("solved", json!(summary.solution.is_some())),
                    json_kv("moves", json!(summary.moves)),
                    json_kv("impasses", json!(summary.impasses)),
                    json_kv("records", json!(summary.records)),
                ],
            );
        }
        Ok(())
    }
}
