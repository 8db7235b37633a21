//! Experiment flow: the session state shared with bus handlers and the
//! controller that walks through the configured steps.

mod controller;
mod session;

pub use controller::{
    ExperimentFlowController, FrameOutcome, Phase, SessionSummary, TrainingStage,
};
pub use session::{Session, SessionBus};

#[cfg(test)]
mod tests;
