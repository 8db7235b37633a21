use std::collections::VecDeque;
use std::time::Duration;

use crate::error::Result;
use crate::geometry::Point;
use crate::probe::ResponseKey;

use super::{Click, InputFrame, InputSample, InputSource, SingleClickDetector};

/// Device state for one scripted frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawInput {
    pub button_down: bool,
    pub pointer: Option<Point>,
    pub wheel: bool,
    pub reset: bool,
    pub key: Option<ResponseKey>,
    pub proceed: bool,
    pub quit: bool,
}

/// Replays a fixed list of frames. Clicks go through a
/// [`SingleClickDetector`] so reaction times behave like live input.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    frames: VecDeque<(Duration, RawInput)>,
    frame_time: Duration,
    detector: SingleClickDetector,
    last_pointer: Point,
}

impl Default for ScriptedInput {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

impl ScriptedInput {
    /// `frame_time` is the elapsed time of frames added by the helpers.
    pub fn new(frame_time: Duration) -> Self {
        let mut detector = SingleClickDetector::new();
        detector.initialize();
        Self {
            frames: VecDeque::new(),
            frame_time,
            detector,
            last_pointer: Point::default(),
        }
    }

    pub fn frame(mut self, elapsed: Duration, raw: RawInput) -> Self {
        self.frames.push_back((elapsed, raw));
        self
    }

    /// A single empty frame lasting `secs`.
    pub fn wait(self, secs: f64) -> Self {
        self.frame(Duration::from_secs_f64(secs), RawInput::default())
    }

    /// Release then press the primary button at `position`.
    pub fn click(self, position: Point) -> Self {
        let frame_time = self.frame_time;
        self.frame(
            frame_time,
            RawInput {
                pointer: Some(position),
                ..RawInput::default()
            },
        )
        .frame(
            frame_time,
            RawInput {
                button_down: true,
                pointer: Some(position),
                ..RawInput::default()
            },
        )
    }

    pub fn pointer(self, position: Point) -> Self {
        let frame_time = self.frame_time;
        self.frame(
            frame_time,
            RawInput {
                pointer: Some(position),
                ..RawInput::default()
            },
        )
    }

    pub fn rotate(self) -> Self {
        self.single(RawInput {
            wheel: true,
            ..RawInput::default()
        })
    }

    pub fn reset(self) -> Self {
        self.single(RawInput {
            reset: true,
            ..RawInput::default()
        })
    }

    pub fn key(self, key: ResponseKey) -> Self {
        self.single(RawInput {
            key: Some(key),
            ..RawInput::default()
        })
    }

    pub fn proceed(self) -> Self {
        self.single(RawInput {
            proceed: true,
            ..RawInput::default()
        })
    }

    pub fn quit(self) -> Self {
        self.single(RawInput {
            quit: true,
            ..RawInput::default()
        })
    }

    fn single(self, raw: RawInput) -> Self {
        let frame_time = self.frame_time;
        self.frame(frame_time, raw)
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<InputFrame>> {
        let Some((elapsed, raw)) = self.frames.pop_front() else {
            return Ok(None);
        };

        self.detector.advance(elapsed);
        if let Some(pointer) = raw.pointer {
            self.last_pointer = pointer;
        }
        let click = self.detector.update(raw.button_down).map(|rt| Click {
            position: self.last_pointer,
            rt,
        });

        Ok(Some(InputFrame {
            elapsed,
            sample: InputSample {
                click,
                pointer: raw.pointer,
                rotate: raw.wheel,
                reset: raw.reset,
                key: raw.key,
                proceed: raw.proceed,
                quit: raw.quit,
            },
        }))
    }

    fn clear_input(&mut self) {
        self.detector.clear_input();
    }
}
