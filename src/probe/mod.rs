//! Secondary attention probes shown during impasses and probe training.

use std::collections::BTreeSet;
use std::fmt;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{KatonaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Same/different judgement against the previous stimulus.
    Update,
    Shift,
    Inhibition,
    /// Any click counts; used as a baseline.
    Control,
}

impl ProbeKind {
    pub fn name(self) -> &'static str {
        match self {
            ProbeKind::Update => "UpdateProbe",
            ProbeKind::Shift => "ShiftProbe",
            ProbeKind::Inhibition => "InhibitionProbe",
            ProbeKind::Control => "ControlProbe",
        }
    }

    fn needs_answers(self) -> bool {
        matches!(self, ProbeKind::Shift | ProbeKind::Inhibition)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKey {
    Left,
    Right,
    Click,
}

impl ResponseKey {
    pub fn name(self) -> &'static str {
        match self {
            ResponseKey::Left => "left",
            ResponseKey::Right => "right",
            ResponseKey::Click => "click",
        }
    }
}

impl fmt::Display for ResponseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub kind: ProbeKind,
    /// Stimulus identifiers, e.g. image names.
    pub stimuli: Vec<String>,
    /// Correct key per stimulus; unused by `Update` and `Control`.
    pub answers: Option<Vec<ResponseKey>>,
    /// Probes stay hidden until this many seconds into their phase.
    pub start_time_secs: f64,
    pub seed: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            kind: ProbeKind::Update,
            stimuli: vec![
                "circle".to_string(),
                "square".to_string(),
                "triangle".to_string(),
            ],
            answers: None,
            start_time_secs: 0.0,
            seed: 0x5EED,
        }
    }
}

impl ProbeSettings {
    pub fn validate(&self) -> Result<()> {
        if self.stimuli.is_empty() {
            return Err(KatonaError::Configuration(
                "probe without stimuli is prohibited".to_string(),
            ));
        }
        let unique: BTreeSet<&str> = self.stimuli.iter().map(String::as_str).collect();
        if unique.len() != self.stimuli.len() {
            return Err(KatonaError::Configuration(format!(
                "every probe must be unique, found {} repeats",
                self.stimuli.len() - unique.len()
            )));
        }
        match &self.answers {
            Some(answers) if answers.len() != self.stimuli.len() => {
                Err(KatonaError::Configuration(format!(
                    "every probe must have an answer: {} probes and {} answers",
                    self.stimuli.len(),
                    answers.len()
                )))
            }
            None if self.kind.needs_answers() => Err(KatonaError::Configuration(format!(
                "{} requires an answer per stimulus",
                self.kind.name()
            ))),
            _ => Ok(()),
        }
    }
}

/// Probe sequencing and answer scoring.
#[derive(Debug, Clone)]
pub struct Probe {
    settings: ProbeSettings,
    rng: SmallRng,
    current: Option<usize>,
    previous: Option<usize>,
    visible: bool,
}

impl Probe {
    pub fn new(settings: ProbeSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            rng: SmallRng::seed_from_u64(settings.seed),
            settings,
            current: None,
            previous: None,
            visible: false,
        })
    }

    pub fn kind(&self) -> ProbeKind {
        self.settings.kind
    }

    /// Draw the next stimulus uniformly at random.
    pub fn next_probe(&mut self) {
        self.previous = self.current;
        self.current = Some(self.rng.random_range(0..self.settings.stimuli.len()));
    }

    /// Score a key press against the current stimulus.
    pub fn press_correctness(&self, key: ResponseKey) -> Result<bool> {
        let prohibited = || KatonaError::ProhibitedKey {
            probe: self.settings.kind.name().to_string(),
            key: key.name().to_string(),
        };
        match self.settings.kind {
            ProbeKind::Update => {
                let Some(previous) = self.previous else {
                    return Ok(true);
                };
                match key {
                    ResponseKey::Right => Ok(self.current == Some(previous)),
                    ResponseKey::Left => Ok(self.current != Some(previous)),
                    ResponseKey::Click => Err(prohibited()),
                }
            }
            ProbeKind::Shift | ProbeKind::Inhibition => {
                if key == ResponseKey::Click {
                    return Err(prohibited());
                }
                let expected = self
                    .current
                    .zip(self.settings.answers.as_ref())
                    .and_then(|(index, answers)| answers.get(index).copied());
                Ok(expected == Some(key))
            }
            ProbeKind::Control => Ok(key == ResponseKey::Click),
        }
    }

    /// Name of the stimulus currently on display.
    pub fn probe_name(&self) -> Option<&str> {
        self.current
            .and_then(|index| self.settings.stimuli.get(index))
            .map(String::as_str)
    }

    pub fn is_started(&self) -> bool {
        self.current.is_some()
    }

    /// Hide the probe and forget the sequence, ready for a new start.
    pub fn stop(&mut self) {
        self.visible = false;
        self.current = None;
        self.previous = None;
    }

    /// Show or hide the probe. Showing only takes effect once `t` (seconds
    /// into the phase) reaches the configured start time.
    pub fn set_auto_draw(&mut self, show: bool, t: f64) {
        if !show {
            self.visible = false;
        } else if t >= self.settings.start_time_secs && self.current.is_some() {
            self.visible = true;
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}
