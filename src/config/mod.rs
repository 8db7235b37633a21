//! Experiment configuration, loaded from JSON and validated up front.
//!
//! Every problem found here is a [`KatonaError::Configuration`] and is meant
//! to stop the session before the participant sees anything.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KatonaError, Result};
use crate::geometry::{CellId, Point, RelativeIndex};
use crate::grid::Grid;
use crate::impasse::ImpasseDetector;
use crate::probe::ProbeSettings;
use crate::solution::{MoveSequenceInterpreter, SolutionPattern};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub square_count: usize,
    pub cell_length: f64,
    pub cell_width: f64,
    pub origin: Point,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            square_count: 9,
            cell_length: 0.09,
            cell_width: 0.01,
            origin: Point::new(-0.4, 0.47),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionConfig {
    pub name: String,
    /// Pieces that must leave their home, relative to the center cell.
    pub origins: Vec<RelativeIndex>,
    /// Cells that must be filled, relative to the center cell.
    pub destinations: Vec<RelativeIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpasseConfig {
    pub min_samples: usize,
    pub min_threshold_secs: f64,
}

impl Default for ImpasseConfig {
    fn default() -> Self {
        Self {
            min_samples: 3,
            min_threshold_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    #[serde(flatten)]
    pub settings: ProbeSettings,
    /// How long an impasse interruption lasts.
    pub impasse_duration_secs: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            settings: ProbeSettings::default(),
            impasse_duration_secs: 10.0,
        }
    }
}

/// One step of the experiment, run in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FlowStep {
    /// Static screen left with the continue key.
    Instruction { name: String },
    /// Practice on the board: fill every target cell.
    Training {
        name: String,
        targets: Vec<RelativeIndex>,
        #[serde(default)]
        requires_reset: bool,
        #[serde(default)]
        linger_secs: f64,
    },
    /// Answer `trials` probes outside of the puzzle.
    ProbeTraining { trials: usize },
    MainTask,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub grid: GridConfig,
    pub movable_pieces: Vec<RelativeIndex>,
    pub solution_moves: usize,
    pub solutions: Vec<SolutionConfig>,
    pub impasse: ImpasseConfig,
    pub probe: ProbeConfig,
    pub main_task_time_limit_secs: Option<f64>,
    pub flow: Vec<FlowStep>,
}

fn rel(pairs: &[[isize; 2]]) -> Vec<RelativeIndex> {
    pairs.iter().copied().map(RelativeIndex::from).collect()
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let solution = |name: &str, origins: &[[isize; 2]], destinations: &[[isize; 2]]| {
            SolutionConfig {
                name: name.to_string(),
                origins: rel(origins),
                destinations: rel(destinations),
            }
        };

        Self {
            grid: GridConfig::default(),
            movable_pieces: rel(&[
                [-1, -1], [0, -1], [1, -1],
                [-2, 0], [-3, 0], [-2, 1],
                [0, 0], [-1, 0], [1, 0], [0, 1],
                [-1, 1], [0, 2], [1, 1],
                [2, 0], [3, 0], [2, 1],
            ]),
            solution_moves: 3,
            solutions: vec![
                solution("left", &[[0, 0], [-1, -1], [1, -1]], &[[0, -2], [-1, -2], [1, -2]]),
                solution("right", &[[0, 1], [-1, 1], [1, 1]], &[[0, 3], [-1, 2], [1, 2]]),
                solution("up", &[[-1, 0], [-2, 0], [-2, 1]], &[[-4, 0], [-5, 0], [-4, 1]]),
                solution("down", &[[1, 0], [2, 0], [2, 1]], &[[4, 0], [5, 0], [4, 1]]),
            ],
            impasse: ImpasseConfig::default(),
            probe: ProbeConfig::default(),
            main_task_time_limit_secs: None,
            flow: vec![
                FlowStep::Instruction {
                    name: "intro".to_string(),
                },
                FlowStep::Training {
                    name: "moving".to_string(),
                    targets: rel(&[[0, -2]]),
                    requires_reset: true,
                    linger_secs: 1.0,
                },
                FlowStep::Instruction {
                    name: "probe".to_string(),
                },
                FlowStep::ProbeTraining { trials: 5 },
                FlowStep::Instruction {
                    name: "task".to_string(),
                },
                FlowStep::MainTask,
            ],
        }
    }
}

impl ExperimentConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|err| KatonaError::Configuration(format!("invalid experiment config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            KatonaError::Configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn build_grid(&self) -> Result<Grid> {
        Grid::build(
            self.grid.square_count,
            self.grid.cell_length,
            self.grid.cell_width,
            self.grid.origin,
        )
    }

    pub fn home_cells(&self, grid: &Grid) -> Result<Vec<CellId>> {
        self.movable_pieces
            .iter()
            .map(|&index| grid.relative_to_absolute(index))
            .collect()
    }

    pub fn solution_patterns(&self, grid: &Grid) -> Result<Vec<SolutionPattern>> {
        self.solutions
            .iter()
            .map(|solution| {
                let resolve = |indexes: &[RelativeIndex]| -> Result<Vec<CellId>> {
                    indexes
                        .iter()
                        .map(|&index| grid.relative_to_absolute(index))
                        .collect()
                };
                Ok(SolutionPattern {
                    name: solution.name.clone(),
                    origins: resolve(&solution.origins)?,
                    destinations: resolve(&solution.destinations)?,
                })
            })
            .collect()
    }

    /// Check the whole configuration by building every component once.
    pub fn validate(&self) -> Result<()> {
        let grid = self.build_grid()?;
        let homes = self.home_cells(&grid).map_err(as_configuration)?;
        let unique: BTreeSet<CellId> = homes.iter().copied().collect();
        if unique.len() != homes.len() {
            return Err(KatonaError::Configuration(
                "movable pieces must have distinct home cells".to_string(),
            ));
        }
        let patterns = self.solution_patterns(&grid).map_err(as_configuration)?;
        MoveSequenceInterpreter::new(patterns, self.solution_moves, homes)?;
        ImpasseDetector::new(self.impasse.min_samples, self.impasse.min_threshold_secs)?;
        self.probe.settings.validate()?;

        if !(self.probe.impasse_duration_secs > 0.0) {
            return Err(KatonaError::Configuration(
                "impasse probe duration must be positive".to_string(),
            ));
        }
        if let Some(limit) = self.main_task_time_limit_secs {
            if !(limit > 0.0) {
                return Err(KatonaError::Configuration(
                    "main task time limit must be positive".to_string(),
                ));
            }
        }
        if self.flow.is_empty() {
            return Err(KatonaError::Configuration("experiment flow is empty".to_string()));
        }
        for step in &self.flow {
            match step {
                FlowStep::Training { name, targets, .. } => {
                    if targets.is_empty() {
                        return Err(KatonaError::Configuration(format!(
                            "training `{name}` has no targets"
                        )));
                    }
                    for &target in targets {
                        grid.relative_to_absolute(target).map_err(as_configuration)?;
                    }
                }
                FlowStep::ProbeTraining { trials: 0 } => {
                    return Err(KatonaError::Configuration(
                        "probe training needs at least one trial".to_string(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn as_configuration(err: KatonaError) -> KatonaError {
    match err {
        KatonaError::CellOutOfLattice(cell) => {
            KatonaError::Configuration(format!("cell {cell} is outside the lattice"))
        }
        other => other,
    }
}
