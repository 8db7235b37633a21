//! Engine for the five-square Katona matchstick experiment.
//!
//! A lattice of cells holds movable sticks. Participants move sticks until
//! a target configuration appears, while the engine records every move,
//! watches for impasses and interrupts the task with secondary probes.
//! Everything runs on a synchronous event bus driven one frame at a time.

pub mod bus;
pub mod config;
pub mod error;
pub mod flow;
pub mod geometry;
pub mod grid;
pub mod impasse;
pub mod input;
pub mod logging;
pub mod metrics;
pub mod occupancy;
pub mod probe;
pub mod record;
pub mod render;
pub mod runtime;
pub mod solution;

pub use bus::{EventBus, EventPayload, ExperimentEvent, HandlerId};
pub use config::{ExperimentConfig, FlowStep, GridConfig, ImpasseConfig, ProbeConfig, SolutionConfig};
pub use error::{DriverError, DriverResult, KatonaError, ProtocolViolation, Result};
pub use flow::{
    ExperimentFlowController, FrameOutcome, Phase, Session, SessionBus, SessionSummary,
    TrainingStage,
};
pub use geometry::{CellId, Orientation, Point, Pose, RelativeIndex};
pub use grid::{Bounds, Cell, Grid};
pub use impasse::ImpasseDetector;
pub use input::{
    Click, InputFrame, InputSample, InputSource, RawInput, ScriptedInput, SingleClickDetector,
};
pub use logging::{LogEvent, LogFields, LogLevel, Logger, LoggingError, LoggingResult};
pub use metrics::{MetricSnapshot, SessionMetrics};
pub use occupancy::{GridOccupancy, Piece, PieceId, PieceState};
pub use probe::{Probe, ProbeKind, ProbeSettings, ResponseKey};
pub use record::{DataSink, JsonLinesDataSink, MemoryDataSink, TrialRecord, TrialRecorder};
pub use render::{
    FrameView, NullRenderer, Renderer, RendererSettings, TerminalGeometry, TerminalRenderer,
    display_width,
};
pub use runtime::diagnostics::{EventLogger, attach_event_counter};
pub use runtime::driver::terminal::{TerminalDriver, TerminalInput};
pub use runtime::{RuntimeConfig, SessionRuntime};
pub use solution::{MoveRecord, MoveSequenceInterpreter, SolutionPattern, Verdict};
