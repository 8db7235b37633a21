use std::fmt;

use serde_json::json;

use crate::geometry::{CellId, Point};
use crate::logging::LogFields;
use crate::occupancy::PieceId;
use crate::probe::ResponseKey;

/// Every event the experiment bus knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExperimentEvent {
    Click,
    Chosen,
    Placed,
    MouseUpdate,
    Reset,
    WrongSolution,
    ProbeAnswer,
    TrainingProbeAnswer,
    Impasse,
    InstructionReading,
}

impl ExperimentEvent {
    pub const ALL: [ExperimentEvent; 10] = [
        ExperimentEvent::Click,
        ExperimentEvent::Chosen,
        ExperimentEvent::Placed,
        ExperimentEvent::MouseUpdate,
        ExperimentEvent::Reset,
        ExperimentEvent::WrongSolution,
        ExperimentEvent::ProbeAnswer,
        ExperimentEvent::TrainingProbeAnswer,
        ExperimentEvent::Impasse,
        ExperimentEvent::InstructionReading,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExperimentEvent::Click => "CLICK",
            ExperimentEvent::Chosen => "CHOSEN",
            ExperimentEvent::Placed => "PLACED",
            ExperimentEvent::MouseUpdate => "MOUSE_UPDATE",
            ExperimentEvent::Reset => "RESET",
            ExperimentEvent::WrongSolution => "WRONG_SOLUTION",
            ExperimentEvent::ProbeAnswer => "PROBE_ANSWER",
            ExperimentEvent::TrainingProbeAnswer => "TRAINING_PROBE_ANSWER",
            ExperimentEvent::Impasse => "IMPASSE",
            ExperimentEvent::InstructionReading => "INSTRUCTION_READING",
        }
    }
}

impl fmt::Display for ExperimentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Data carried by an emission. Reaction times are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Empty,
    Click {
        position: Point,
        rt: f64,
    },
    Pointer {
        position: Point,
    },
    Chosen {
        piece: PieceId,
        from: CellId,
        rt: f64,
    },
    Placed {
        piece: PieceId,
        from: CellId,
        to: CellId,
        rt: f64,
        time_solving: f64,
    },
    Reset {
        rt: f64,
        time_solving: f64,
    },
    WrongSolution {
        moves: usize,
    },
    ProbeAnswer {
        probe_type: String,
        probe_name: String,
        key: ResponseKey,
        correct: bool,
        rt: f64,
        time_from_start: f64,
    },
    /// `since_move` is the think-time that crossed the threshold,
    /// `time_solving` the main task time so far.
    Impasse {
        threshold: f64,
        since_move: f64,
        time_solving: f64,
    },
    InstructionReading {
        name: String,
        rt: f64,
    },
}

impl EventPayload {
    /// Flat column view used by the data sink and the event logger.
    pub fn fields(&self) -> LogFields {
        let mut map = LogFields::new();
        let mut put = |key: &str, value: serde_json::Value| {
            map.insert(key.to_string(), value);
        };
        match self {
            EventPayload::Empty => {}
            EventPayload::Click { position, rt } => {
                put("x", json!(position.x));
                put("y", json!(position.y));
                put("clickRT", json!(rt));
            }
            EventPayload::Pointer { position } => {
                put("x", json!(position.x));
                put("y", json!(position.y));
            }
            EventPayload::Chosen { piece, from, rt } => {
                put("element", json!(piece.to_string()));
                put("takenFrom", json!(from.to_string()));
                put("takeRT", json!(rt));
            }
            EventPayload::Placed {
                piece,
                from,
                to,
                rt,
                time_solving,
            } => {
                put("element", json!(piece.to_string()));
                put("takenFrom", json!(from.to_string()));
                put("placedTo", json!(to.to_string()));
                put("placeRT", json!(rt));
                put("timeSolving", json!(time_solving));
            }
            EventPayload::Reset { rt, time_solving } => {
                put("resetRT", json!(rt));
                put("timeSolving", json!(time_solving));
            }
            EventPayload::WrongSolution { moves } => {
                put("moves", json!(moves));
            }
            EventPayload::ProbeAnswer {
                probe_type,
                probe_name,
                key,
                correct,
                rt,
                time_from_start,
            } => {
                put("probeType", json!(probe_type));
                put("probeName", json!(probe_name));
                put("probeRT", json!(rt));
                put("keyPressed", json!(key.name()));
                put("isCorrect", json!(correct));
                put("timeFromStart", json!(time_from_start));
            }
            EventPayload::Impasse {
                threshold,
                since_move,
                time_solving,
            } => {
                put("threshold", json!(threshold));
                put("timeSinceMove", json!(since_move));
                put("timeSolving", json!(time_solving));
            }
            EventPayload::InstructionReading { name, rt } => {
                put("instructionName", json!(name));
                put("instructionExitRT", json!(rt));
            }
        }
        map
    }
}
