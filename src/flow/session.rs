use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::bus::{EventBus, EventPayload, ExperimentEvent, HandlerId};
use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::grid::Grid;
use crate::impasse::ImpasseDetector;
use crate::logging::{LogLevel, Logger, LoggingError, event_with_fields, json_kv, json_str};
use crate::metrics::SessionMetrics;
use crate::occupancy::{GridOccupancy, PieceId};
use crate::probe::Probe;
use crate::record::{DataSink, TrialRecorder};
use crate::solution::{MoveSequenceInterpreter, Verdict};

pub type SessionBus = EventBus<ExperimentEvent, Session, EventPayload>;

/// Mutable experiment state handed to every bus handler.
pub struct Session {
    pub grid: Grid,
    pub occupancy: GridOccupancy,
    pub interpreter: MoveSequenceInterpreter,
    pub impasse: ImpasseDetector,
    pub probe: Probe,
    pub recorder: TrialRecorder,
    pub logger: Logger,
    pub metrics: Option<Arc<Mutex<SessionMetrics>>>,
    /// Feed placements into the impasse detector (main task only).
    pub measure_moves: bool,
    /// Set by the click handler; the runtime clears the input source.
    pub clear_requested: bool,
    /// Net time spent on the main task, probes excluded.
    pub solving_time: Duration,
    pub since_clear: Duration,
    pub moves: usize,
    pub resets: usize,
}

impl Session {
    pub fn new(
        config: &ExperimentConfig,
        sink: impl DataSink + 'static,
        logger: Logger,
        metrics: Option<Arc<Mutex<SessionMetrics>>>,
    ) -> Result<Self> {
        config.validate()?;
        let grid = config.build_grid()?;
        let homes = config.home_cells(&grid)?;
        let occupancy = GridOccupancy::new(&grid, &homes)?;
        let interpreter = MoveSequenceInterpreter::new(
            config.solution_patterns(&grid)?,
            config.solution_moves,
            homes,
        )?;
        let impasse =
            ImpasseDetector::new(config.impasse.min_samples, config.impasse.min_threshold_secs)?;
        let probe = Probe::new(config.probe.settings.clone())?;

        Ok(Self {
            grid,
            occupancy,
            interpreter,
            impasse,
            probe,
            recorder: TrialRecorder::new(sink),
            logger,
            metrics,
            measure_moves: false,
            clear_requested: false,
            solving_time: Duration::ZERO,
            since_clear: Duration::ZERO,
            moves: 0,
            resets: 0,
        })
    }

    pub fn update_metrics(&self, update: impl FnOnce(&mut SessionMetrics)) {
        if let Some(metrics) = self.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                update(&mut *guard);
            }
        }
    }

    pub(crate) fn log(
        &self,
        level: LogLevel,
        target: &str,
        message: &str,
        fields: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) {
        let event = event_with_fields(level, target, message, fields);
        if let Err(err) = self.logger.log_event(event) {
            self.report_log_failure(message, &err);
        }
    }

    /// Counts a rejected log event, or reports it on stderr when the session
    /// keeps no metrics.
    fn report_log_failure(&self, message: &str, err: &LoggingError) {
        match self.metrics.as_ref() {
            Some(_) => self.update_metrics(SessionMetrics::record_log_failure),
            None => eprintln!("katona: dropped log event `{message}`: {err}"),
        }
    }
}

/// Handlers that live for the whole session: input clearing, resets and
/// data recording.
pub(crate) fn register_permanent_handlers(bus: &SessionBus) -> Result<()> {
    bus.on(ExperimentEvent::Click, |session: &mut Session, _: &SessionBus, _: &EventPayload| {
        session.clear_requested = true;
        session.since_clear = Duration::ZERO;
        Ok(())
    })?;
    bus.on(ExperimentEvent::Reset, reset_board)?;

    for kind in ExperimentEvent::ALL {
        bus.on(kind, move |session: &mut Session, _: &SessionBus, payload: &EventPayload| {
            session.recorder.record(kind, payload)
        })?;
    }
    Ok(())
}

/// Put the board back to its starting layout and wait for a new choice.
pub(crate) fn rearm_board(session: &mut Session, bus: &SessionBus) -> Result<()> {
    session.occupancy.return_all_to_default(&session.grid)?;
    session.interpreter.reset();
    bus.remove_all_expiring();
    arm_choosing(bus)?;
    Ok(())
}

fn reset_board(session: &mut Session, bus: &SessionBus, _payload: &EventPayload) -> Result<()> {
    rearm_board(session, bus)?;
    session.resets += 1;
    session.update_metrics(SessionMetrics::record_reset);
    Ok(())
}

pub(crate) fn arm_choosing(bus: &SessionBus) -> Result<HandlerId> {
    bus.on_until(ExperimentEvent::Click, choose, ExperimentEvent::Chosen)
}

fn choose(session: &mut Session, bus: &SessionBus, payload: &EventPayload) -> Result<()> {
    let EventPayload::Click { position, rt } = *payload else {
        return Ok(());
    };
    let Some(cell) = session.grid.cell_at(position) else {
        return Ok(());
    };
    let Some(piece) = session.occupancy.choose(cell) else {
        return Ok(());
    };

    if session.measure_moves {
        session.impasse.record_move_start(rt);
    }

    bus.on_until(
        ExperimentEvent::MouseUpdate,
        move |session: &mut Session, _: &SessionBus, payload: &EventPayload| {
            if let EventPayload::Pointer { position } = *payload {
                session.occupancy.drag(piece, position);
            }
            Ok(())
        },
        ExperimentEvent::Placed,
    )?;
    bus.on_until(
        ExperimentEvent::Click,
        move |session: &mut Session, bus: &SessionBus, payload: &EventPayload| {
            place(session, bus, payload, piece)
        },
        ExperimentEvent::Placed,
    )?;

    bus.emit(
        session,
        ExperimentEvent::Chosen,
        &EventPayload::Chosen {
            piece,
            from: cell,
            rt,
        },
    )
}

fn place(session: &mut Session, bus: &SessionBus, payload: &EventPayload, piece: PieceId) -> Result<()> {
    let EventPayload::Click { position, rt } = *payload else {
        return Ok(());
    };
    let Some(cell) = session.grid.cell_at(position) else {
        return Ok(());
    };
    let Some(from) = session.occupancy.piece(piece).and_then(|held| held.taken_from) else {
        return Ok(());
    };
    if !session.occupancy.place(&session.grid, piece, cell) {
        return Ok(());
    }

    if session.measure_moves {
        if let Err(violation) = session.impasse.record_move_end(rt) {
            session.log(
                LogLevel::Warn,
                "katona::impasse",
                "protocol_violation",
                [
                    json_str("component", violation.component),
                    json_str("problem", violation.problem),
                ],
            );
        }
    }

    let moved = from != cell;
    if moved {
        session.interpreter.record_move(piece, from, cell);
        session.moves += 1;
        session.update_metrics(SessionMetrics::record_move);
    }

    arm_choosing(bus)?;
    bus.emit(
        session,
        ExperimentEvent::Placed,
        &EventPayload::Placed {
            piece,
            from,
            to: cell,
            rt,
            time_solving: session.solving_time.as_secs_f64(),
        },
    )?;

    if moved && session.interpreter.verdict() == Verdict::Wrong {
        let moves = session.interpreter.moves().len();
        session.log(
            LogLevel::Debug,
            "katona::flow",
            "wrong_solution",
            [json_kv("moves", json!(moves))],
        );
        bus.emit(session, ExperimentEvent::WrongSolution, &EventPayload::WrongSolution { moves })?;
    }
    Ok(())
}
