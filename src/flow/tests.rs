use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use super::*;
use crate::config::{ExperimentConfig, FlowStep, GridConfig, ImpasseConfig, SolutionConfig};
use crate::geometry::{CellId, Point, RelativeIndex};
use crate::input::{InputSource, ScriptedInput};
use crate::logging::{LogEvent, LogSink, Logger, LoggingError, LoggingResult, MemorySink, NullSink};
use crate::metrics::SessionMetrics;
use crate::occupancy::Piece;
use crate::probe::{ProbeKind, ResponseKey};
use crate::record::MemoryDataSink;

/// Lattice with a step of 4: vertical cells at `(4c, -2r)`, horizontal
/// cells at `(4c + 2, -2r)`.
fn lattice(square_count: usize) -> GridConfig {
    GridConfig {
        square_count,
        cell_length: 3.0,
        cell_width: 1.0,
        origin: Point::new(0.0, 0.0),
    }
}

fn at(row: usize, col: usize) -> Point {
    let x = 4.0 * col as f64 + if row % 2 == 0 { 2.0 } else { 0.0 };
    Point::new(x, -2.0 * row as f64)
}

fn config(flow: Vec<FlowStep>) -> ExperimentConfig {
    ExperimentConfig {
        grid: lattice(9),
        flow,
        ..ExperimentConfig::default()
    }
}

fn controller(config: &ExperimentConfig) -> (ExperimentFlowController, MemoryDataSink) {
    let sink = MemoryDataSink::new();
    let controller =
        ExperimentFlowController::new(config, sink.clone(), Logger::new(NullSink), None).unwrap();
    (controller, sink)
}

/// Feed every scripted frame, honouring clear requests, until the flow ends.
fn drive(controller: &mut ExperimentFlowController, mut input: ScriptedInput) -> ScriptedInput {
    while let Some(frame) = input.poll(Duration::ZERO).unwrap() {
        let outcome = controller.on_frame(&frame).unwrap();
        if outcome.clear_input {
            input.clear_input();
        }
        if outcome.finished {
            break;
        }
    }
    input
}

fn mv(input: ScriptedInput, from: (usize, usize), to: (usize, usize)) -> ScriptedInput {
    input.click(at(from.0, from.1)).click(at(to.0, to.1))
}

#[test]
fn solving_left_pattern_completes_the_session() {
    let (mut controller, sink) = controller(&config(vec![FlowStep::MainTask]));
    let mut input = ScriptedInput::default();
    input = mv(input, (9, 4), (9, 2));
    input = mv(input, (8, 3), (8, 2));
    input = mv(input, (10, 3), (10, 2));
    let input = drive(&mut controller, input.wait(1.0));

    assert_eq!(input.remaining(), 1);
    assert!(controller.is_finished());
    let summary = controller.summary();
    assert_eq!(summary.solution.as_deref(), Some("left"));
    assert_eq!(summary.moves, 3);
    assert_eq!(summary.records, 6);
    assert!(!summary.quit && !summary.timed_out);

    assert_eq!(
        sink.events(),
        vec!["CHOSEN", "PLACED", "CHOSEN", "PLACED", "CHOSEN", "PLACED"]
    );
    let records = sink.records();
    assert!(records.iter().all(|record| record.stage == "Katona"));
    assert_eq!(records[0].get("takenFrom"), Some(&json!("[9,4]")));
    assert_eq!(records[1].get("placedTo"), Some(&json!("[9,2]")));
    assert_eq!(records[5].get("placedTo"), Some(&json!("[10,2]")));
}

#[test]
fn full_set_of_moves_that_matches_nothing_is_a_wrong_solution() {
    let (mut controller, sink) = controller(&config(vec![FlowStep::MainTask]));
    let mut input = ScriptedInput::default();
    input = mv(input, (9, 4), (9, 2));
    input = mv(input, (8, 3), (8, 2));
    input = mv(input, (10, 3), (10, 1));
    drive(&mut controller, input);

    assert!(!controller.is_finished());
    assert_eq!(controller.phase(), &Phase::MainTask);
    let events = sink.events();
    assert_eq!(events.last().map(String::as_str), Some("WRONG_SOLUTION"));
    assert_eq!(sink.records().last().unwrap().get("moves"), Some(&json!(3)));
}

#[test]
fn placing_back_on_the_same_cell_is_not_a_move() {
    let (mut controller, sink) = controller(&config(vec![FlowStep::MainTask]));
    let input = mv(ScriptedInput::default(), (9, 4), (9, 4));
    drive(&mut controller, input);

    assert_eq!(controller.summary().moves, 0);
    assert!(controller.session().interpreter.moves().is_empty());
    assert_eq!(sink.events(), vec!["CHOSEN", "PLACED"]);
    assert!(controller.session().occupancy.pieces().iter().all(Piece::is_home));
}

#[test]
fn reset_restores_the_board_and_rearms_choosing() {
    let (mut controller, sink) = controller(&config(vec![FlowStep::MainTask]));
    let input = mv(ScriptedInput::default(), (9, 4), (9, 2))
        .reset()
        .click(at(9, 4));
    drive(&mut controller, input);

    assert_eq!(sink.events(), vec!["CHOSEN", "PLACED", "RESET", "CHOSEN"]);
    assert_eq!(controller.summary().resets, 1);
    assert!(controller.session().interpreter.moves().is_empty());
    assert!(!controller.session().occupancy.is_occupied(CellId::new(9, 2)));
    assert!(controller.session().occupancy.held().is_some());
}

#[test]
fn reset_while_holding_drops_the_stick_home() {
    let (mut controller, sink) = controller(&config(vec![FlowStep::MainTask]));
    let input = ScriptedInput::default()
        .click(at(9, 4))
        .reset()
        .click(at(9, 2));
    drive(&mut controller, input);

    assert_eq!(sink.events(), vec!["CHOSEN", "RESET"]);
    let session = controller.session();
    assert!(session.occupancy.held().is_none());
    assert!(session.occupancy.pieces().iter().all(Piece::is_home));
    assert!(!session.occupancy.is_occupied(CellId::new(9, 2)));
}

#[test]
fn long_pause_interrupts_with_a_probe_then_resumes() {
    let mut config = config(vec![FlowStep::MainTask]);
    config.impasse = ImpasseConfig {
        min_samples: 2,
        min_threshold_secs: 1.0,
    };
    config.probe.impasse_duration_secs = 2.0;
    let (mut controller, sink) = controller(&config);

    let mut input = ScriptedInput::default();
    input = mv(input, (9, 4), (9, 2));
    input = mv(input, (8, 3), (8, 2));
    let input = input.wait(1.5).key(ResponseKey::Right);
    drive(&mut controller, input);

    assert!(matches!(controller.phase(), Phase::ImpasseProbe { .. }));
    assert!(controller.session().probe.is_started());
    let solving_before = controller.session().solving_time;

    drive(&mut controller, ScriptedInput::default().wait(2.0));
    assert_eq!(controller.phase(), &Phase::MainTask);
    assert_eq!(
        controller.session().solving_time,
        solving_before,
        "probe time is not solving time"
    );

    drive(&mut controller, ScriptedInput::default().wait(3.0));
    assert_eq!(controller.summary().impasses, 1, "one impasse per pause");

    let events = sink.events();
    assert_eq!(
        events,
        vec!["CHOSEN", "PLACED", "CHOSEN", "PLACED", "IMPASSE", "PROBE_ANSWER"]
    );
    let records = sink.records();
    let impasse = records.iter().find(|record| record.event == "IMPASSE").unwrap();
    let since_move = impasse.get("timeSinceMove").and_then(|v| v.as_f64()).unwrap();
    let time_solving = impasse.get("timeSolving").and_then(|v| v.as_f64()).unwrap();
    let threshold = impasse.get("threshold").and_then(|v| v.as_f64()).unwrap();
    assert!(since_move >= threshold);
    assert!(time_solving > since_move, "solving time covers every move");
    assert!((time_solving - solving_before.as_secs_f64()).abs() < 1e-9);

    let answer = sink.records().pop().unwrap();
    assert_eq!(answer.stage, "Probe");
    assert_eq!(answer.get("probeType"), Some(&json!("UpdateProbe")));
    assert_eq!(answer.get("keyPressed"), Some(&json!("right")));
}

#[test]
fn training_waits_for_targets_reset_and_linger() {
    let flow = vec![FlowStep::Training {
        name: "moving".into(),
        targets: vec![RelativeIndex::new(0, -2)],
        requires_reset: true,
        linger_secs: 0.5,
    }];
    let (mut controller, sink) = controller(&config(flow));

    drive(&mut controller, ScriptedInput::default().wait(0.1));
    assert_eq!(controller.view().targets, &[CellId::new(9, 2)]);

    drive(&mut controller, mv(ScriptedInput::default(), (9, 4), (9, 2)));
    assert!(controller.view().targets.is_empty());
    assert!(matches!(
        controller.phase(),
        Phase::Training {
            stage: TrainingStage::AwaitingReset { .. },
            ..
        }
    ));

    drive(&mut controller, ScriptedInput::default().reset());
    assert!(matches!(
        controller.phase(),
        Phase::Training {
            stage: TrainingStage::Lingering { .. },
            ..
        }
    ));

    drive(&mut controller, ScriptedInput::default().wait(0.6));
    assert!(controller.is_finished());
    assert!(controller.summary().solution.is_none());

    let records = sink.records();
    assert_eq!(sink.events(), vec!["CHOSEN", "PLACED", "RESET"]);
    assert!(records.iter().all(|record| record.stage == "Training Katona"));
}

#[test]
fn probe_training_counts_answers() {
    let (mut controller, sink) = controller(&config(vec![FlowStep::ProbeTraining { trials: 2 }]));
    let input = ScriptedInput::default()
        .key(ResponseKey::Right)
        .key(ResponseKey::Left)
        .wait(1.0);
    let input = drive(&mut controller, input);

    assert_eq!(input.remaining(), 1);
    assert!(controller.is_finished());
    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record.event == "TRAINING_PROBE_ANSWER"));
    assert!(records.iter().all(|record| record.stage == "Training Probe"));
    assert_eq!(records[0].get("isCorrect"), Some(&json!(true)));
}

#[test]
fn click_answer_on_a_keyed_task_is_logged_and_ignored() {
    let mut config = config(vec![FlowStep::ProbeTraining { trials: 1 }]);
    config.probe.settings.kind = ProbeKind::Shift;
    config.probe.settings.answers = Some(vec![ResponseKey::Left; 3]);
    let logs = MemorySink::new();
    let sink = MemoryDataSink::new();
    let mut controller =
        ExperimentFlowController::new(&config, sink.clone(), Logger::new(logs.clone()), None)
            .unwrap();

    let input = ScriptedInput::default().key(ResponseKey::Click);
    drive(&mut controller, input);

    assert!(sink.records().is_empty());
    assert_eq!(controller.phase(), &Phase::ProbeTraining { remaining: 1 });
    assert!(logs.messages().iter().any(|m| m == "prohibited_key"));

    drive(&mut controller, ScriptedInput::default().key(ResponseKey::Left));
    assert!(controller.is_finished());
    assert_eq!(sink.records()[0].get("isCorrect"), Some(&json!(true)));
}

#[test]
fn time_limit_moves_on_to_the_next_step() {
    let mut config = config(vec![
        FlowStep::MainTask,
        FlowStep::Instruction {
            name: "debrief".into(),
        },
    ]);
    config.main_task_time_limit_secs = Some(1.0);
    let (mut controller, _sink) = controller(&config);

    drive(&mut controller, ScriptedInput::default().wait(1.2));

    assert!(controller.summary().timed_out);
    assert_eq!(
        controller.phase(),
        &Phase::Instruction {
            name: "debrief".into()
        }
    );
}

#[test]
fn instruction_reading_time_is_recorded() {
    let (mut controller, sink) = controller(&config(vec![FlowStep::Instruction {
        name: "intro".into(),
    }]));
    drive(&mut controller, ScriptedInput::default().wait(2.0).proceed());

    let record = sink.records().pop().unwrap();
    assert_eq!(record.event, "INSTRUCTION_READING");
    assert_eq!(record.stage, "Instruction");
    assert_eq!(record.get("instructionName"), Some(&json!("intro")));
    let rt = record.get("instructionExitRT").and_then(|v| v.as_f64()).unwrap();
    assert!((rt - 2.016).abs() < 1e-9, "rt was {rt}");
}

#[test]
fn single_move_on_three_square_lattice_solves_after_rotation() {
    let config = ExperimentConfig {
        grid: lattice(3),
        movable_pieces: vec![RelativeIndex::new(-2, 0)],
        solution_moves: 1,
        solutions: vec![SolutionConfig {
            name: "lift".into(),
            origins: vec![RelativeIndex::new(-2, 0)],
            destinations: vec![RelativeIndex::new(-3, 0)],
        }],
        flow: vec![FlowStep::MainTask],
        ..ExperimentConfig::default()
    };
    let (mut controller, sink) = controller(&config);

    let input = ScriptedInput::default()
        .click(at(1, 1))
        .click(at(1, 1))
        .click(at(1, 1))
        .rotate()
        .click(at(0, 1));
    drive(&mut controller, input);

    assert_eq!(controller.summary().solution.as_deref(), Some("lift"));
    assert_eq!(controller.summary().moves, 1);
    assert_eq!(sink.events(), vec!["CHOSEN", "PLACED", "CHOSEN", "PLACED"]);
    let records = sink.records();
    assert_eq!(records[1].get("placedTo"), Some(&json!("[1,1]")));
    assert_eq!(records[3].get("placedTo"), Some(&json!("[0,1]")));
}

#[test]
fn lifecycle_is_logged_on_the_flow_target() {
    let logs = MemorySink::new();
    let mut controller = ExperimentFlowController::new(
        &config(vec![FlowStep::MainTask]),
        MemoryDataSink::new(),
        Logger::new(logs.clone()),
        None,
    )
    .unwrap();
    drive(&mut controller, ScriptedInput::default().quit());

    let messages = logs.messages();
    assert_eq!(messages.first().map(String::as_str), Some("session_started"));
    assert!(messages.iter().any(|m| m == "quit_requested"));
    assert_eq!(messages.last().map(String::as_str), Some("session_complete"));
    assert!(logs.events().iter().all(|event| event.target == "katona::flow"));
    assert!(controller.summary().quit);
}

struct BrokenSink;

impl LogSink for BrokenSink {
    fn log(&self, _event: &LogEvent) -> LoggingResult<()> {
        Err(LoggingError::Poisoned)
    }
}

#[test]
fn rejected_log_events_are_counted() {
    let metrics = Arc::new(Mutex::new(SessionMetrics::new()));
    let mut controller = ExperimentFlowController::new(
        &config(vec![FlowStep::MainTask]),
        MemoryDataSink::new(),
        Logger::new(BrokenSink),
        Some(metrics.clone()),
    )
    .unwrap();
    drive(&mut controller, ScriptedInput::default().quit());

    assert!(controller.summary().quit);
    let snapshot = metrics.lock().unwrap().snapshot(Duration::ZERO);
    assert!(snapshot.log_failures >= 3, "started, entered, quit");
}
