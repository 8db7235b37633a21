//! Per-frame participant input and the sources that produce it.

mod scripted;

use std::time::Duration;

use crate::error::Result;
use crate::geometry::Point;
use crate::probe::ResponseKey;

pub use scripted::{RawInput, ScriptedInput};

/// A primary-button press, with the seconds since input was last cleared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Click {
    pub position: Point,
    pub rt: f64,
}

/// Everything the participant did during one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSample {
    pub click: Option<Click>,
    /// Latest pointer position seen during the frame.
    pub pointer: Option<Point>,
    /// Secondary gesture that turns a held piece.
    pub rotate: bool,
    pub reset: bool,
    pub key: Option<ResponseKey>,
    /// Leave the current instruction screen.
    pub proceed: bool,
    pub quit: bool,
}

impl InputSample {
    pub fn is_idle(&self) -> bool {
        *self == InputSample::default()
    }
}

/// One frame's worth of input plus the time that passed since the previous
/// frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFrame {
    pub elapsed: Duration,
    pub sample: InputSample,
}

pub trait InputSource {
    /// Collect input for the next frame, waiting at most `timeout`.
    /// `Ok(None)` means the source has nothing more to give.
    fn poll(&mut self, timeout: Duration) -> Result<Option<InputFrame>>;

    /// Start a new click cycle: reaction times are measured from here.
    fn clear_input(&mut self);
}

/// Turns a raw "button is down" signal into single press transitions.
///
/// A button that is already down when the detector starts does not count
/// as a click; it has to be released first.
#[derive(Debug, Clone)]
pub struct SingleClickDetector {
    was_pressed: bool,
    initialized: bool,
    since_clear: Duration,
}

impl Default for SingleClickDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleClickDetector {
    pub fn new() -> Self {
        Self {
            was_pressed: true,
            initialized: false,
            since_clear: Duration::ZERO,
        }
    }

    /// An initialized detector that treats the button as up.
    ///
    /// Event-driven sources only report transitions, so the first press they
    /// deliver is a real click.
    pub fn released() -> Self {
        Self {
            was_pressed: false,
            initialized: true,
            since_clear: Duration::ZERO,
        }
    }

    pub fn initialize(&mut self) {
        self.initialized = true;
        self.was_pressed = true;
        self.since_clear = Duration::ZERO;
    }

    pub fn stop(&mut self) {
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn advance(&mut self, elapsed: Duration) {
        self.since_clear = self.since_clear.saturating_add(elapsed);
    }

    /// Feed the current button state; returns the reaction time on a press.
    pub fn update(&mut self, pressed: bool) -> Option<f64> {
        if !self.initialized {
            return None;
        }
        if pressed && !self.was_pressed {
            self.was_pressed = true;
            return Some(self.since_clear.as_secs_f64());
        }
        if !pressed {
            self.was_pressed = false;
        }
        None
    }

    pub fn clear_input(&mut self) {
        self.since_clear = Duration::ZERO;
    }

    pub fn since_clear(&self) -> Duration {
        self.since_clear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_button_at_start_is_ignored() {
        let mut detector = SingleClickDetector::new();
        detector.initialize();
        assert_eq!(detector.update(true), None);
        assert_eq!(detector.update(false), None);
        assert!(detector.update(true).is_some());
        assert_eq!(detector.update(true), None, "still held");
    }

    #[test]
    fn released_detector_counts_the_first_press() {
        let mut detector = SingleClickDetector::released();
        assert!(detector.is_initialized());
        detector.advance(Duration::from_millis(400));
        assert_eq!(detector.update(true), Some(0.4));
        assert_eq!(detector.update(true), None, "still held");
    }

    #[test]
    fn reaction_time_counts_from_last_clear() {
        let mut detector = SingleClickDetector::new();
        detector.initialize();
        detector.update(false);
        detector.advance(Duration::from_millis(1500));
        assert_eq!(detector.update(true), Some(1.5));

        detector.clear_input();
        detector.update(false);
        detector.advance(Duration::from_millis(250));
        assert_eq!(detector.update(true), Some(0.25));
    }

    #[test]
    fn uninitialized_detector_reports_nothing() {
        let mut detector = SingleClickDetector::new();
        detector.update(false);
        assert_eq!(detector.update(true), None);
        detector.initialize();
        detector.stop();
        assert!(!detector.is_initialized());
    }

    #[test]
    fn default_sample_is_idle() {
        assert!(InputSample::default().is_idle());
        let sample = InputSample {
            rotate: true,
            ..InputSample::default()
        };
        assert!(!sample.is_idle());
    }
}
