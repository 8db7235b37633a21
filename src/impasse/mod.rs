use std::time::Duration;

use crate::error::{KatonaError, ProtocolViolation, Result};

/// Watches the time between moves and flags an impasse when the current
/// pause is abnormally long compared to the participant's own history.
///
/// The stopwatch does not read a clock; the runtime advances it with the
/// frame time so that scripted sessions are deterministic.
#[derive(Debug, Clone)]
pub struct ImpasseDetector {
    min_samples: usize,
    min_threshold: f64,
    history: Vec<f64>,
    threshold: Option<f64>,
    pending_end: Option<f64>,
    just_recovered: bool,
    stopwatch: Duration,
}

impl ImpasseDetector {
    /// `min_samples` must be at least 2 so the sample deviation is defined.
    pub fn new(min_samples: usize, min_threshold_secs: f64) -> Result<Self> {
        if min_samples < 2 {
            return Err(KatonaError::Configuration(format!(
                "impasse detection needs at least 2 samples, got {min_samples}"
            )));
        }
        if !(min_threshold_secs >= 0.0) {
            return Err(KatonaError::Configuration(format!(
                "minimal impasse threshold must not be negative, got {min_threshold_secs}"
            )));
        }
        Ok(Self {
            min_samples,
            min_threshold: min_threshold_secs,
            history: Vec::new(),
            threshold: None,
            pending_end: None,
            just_recovered: false,
            stopwatch: Duration::ZERO,
        })
    }

    /// Restart the per-move stopwatch.
    pub fn start_clock(&mut self) {
        self.stopwatch = Duration::ZERO;
    }

    pub fn advance(&mut self, elapsed: Duration) {
        self.stopwatch = self.stopwatch.saturating_add(elapsed);
    }

    pub fn elapsed(&self) -> Duration {
        self.stopwatch
    }

    /// Record the latency until a move started. Any pending move-end
    /// latency is added to it.
    pub fn record_move_start(&mut self, latency_secs: f64) {
        self.just_recovered = false;
        let latency = latency_secs + self.pending_end.take().unwrap_or(0.0);
        self.history.push(latency);

        if self.history.len() >= self.min_samples {
            let (mean, deviation) = mean_and_sample_sd(&self.history);
            self.threshold = Some(f64::max(self.min_threshold, mean + 2.0 * deviation));
        }
        self.start_clock();
    }

    /// Store how long the move took; folded into the next move start.
    pub fn record_move_end(&mut self, latency_secs: f64) -> std::result::Result<(), ProtocolViolation> {
        let previous = self.pending_end.replace(latency_secs);
        match previous {
            Some(stale) => Err(ProtocolViolation::new(
                "ImpasseDetector",
                format!("move end recorded twice; dropping pending {stale:.3}s"),
            )),
            None => Ok(()),
        }
    }

    /// True once per impasse episode.
    pub fn poll_impasse(&mut self) -> bool {
        let Some(threshold) = self.threshold else {
            return false;
        };
        if self.just_recovered {
            return false;
        }
        if self.stopwatch.as_secs_f64() >= threshold {
            self.just_recovered = true;
            return true;
        }
        false
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// Forget everything, as at the start of a new task.
    pub fn reset(&mut self) {
        self.history.clear();
        self.threshold = None;
        self.pending_end = None;
        self.just_recovered = false;
        self.stopwatch = Duration::ZERO;
    }
}

fn mean_and_sample_sd(samples: &[f64]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let squares: f64 = samples.iter().map(|value| (value - mean).powi(2)).sum();
    (mean, (squares / (n - 1.0)).sqrt())
}
