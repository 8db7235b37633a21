use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::cursor::{Hide, Show};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};

use crate::error::{DriverError, DriverResult, Result};
use crate::flow::SessionSummary;
use crate::input::{Click, InputFrame, InputSample, InputSource, SingleClickDetector};
use crate::probe::ResponseKey;
use crate::render::TerminalGeometry;
use crate::runtime::SessionRuntime;

/// Mouse and keyboard input from the terminal.
///
/// Left button presses go through a [`SingleClickDetector`]; the wheel (or
/// the right button) rotates the held stick, `r` resets, arrow keys answer
/// probes, space or enter moves past instruction screens and `Esc` quits.
pub struct TerminalInput {
    geometry: TerminalGeometry,
    detector: SingleClickDetector,
    last_poll: Instant,
}

impl TerminalInput {
    pub fn new(geometry: TerminalGeometry) -> Self {
        Self {
            geometry,
            detector: SingleClickDetector::released(),
            last_poll: Instant::now(),
        }
    }

    /// Fold one terminal event into the sample for the current frame.
    pub fn apply(&mut self, event: &Event, sample: &mut InputSample) {
        match event {
            Event::Mouse(mouse) => self.apply_mouse(mouse, sample),
            Event::Key(key) => apply_key(key, sample),
            _ => {}
        }
    }

    fn apply_mouse(&mut self, mouse: &MouseEvent, sample: &mut InputSample) {
        let position = self.geometry.to_point(mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                sample.pointer = Some(position);
                if let Some(rt) = self.detector.update(true) {
                    sample.click = Some(Click { position, rt });
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                self.detector.update(false);
            }
            MouseEventKind::Moved | MouseEventKind::Drag(_) => {
                sample.pointer = Some(position);
            }
            MouseEventKind::ScrollUp
            | MouseEventKind::ScrollDown
            | MouseEventKind::Down(MouseButton::Right) => {
                sample.rotate = true;
            }
            _ => {}
        }
    }
}

fn apply_key(key: &KeyEvent, sample: &mut InputSample) {
    if key.kind != KeyEventKind::Press {
        return;
    }
    match key.code {
        KeyCode::Esc => sample.quit = true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => sample.quit = true,
        KeyCode::Char('r') | KeyCode::Char('R') => sample.reset = true,
        KeyCode::Char(' ') | KeyCode::Enter => sample.proceed = true,
        KeyCode::Left => sample.key = Some(ResponseKey::Left),
        KeyCode::Right => sample.key = Some(ResponseKey::Right),
        _ => {}
    }
}

impl InputSource for TerminalInput {
    fn poll(&mut self, timeout: Duration) -> Result<Option<InputFrame>> {
        let mut sample = InputSample::default();
        let mut ready = event::poll(timeout)?;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_poll);
        self.last_poll = now;
        self.detector.advance(elapsed);

        while ready {
            let next = event::read()?;
            self.apply(&next, &mut sample);
            ready = event::poll(Duration::ZERO)?;
        }

        Ok(Some(InputFrame { elapsed, sample }))
    }

    fn clear_input(&mut self) {
        self.detector.clear_input();
    }
}

/// Owns a [`SessionRuntime`] and manages raw mode, mouse capture and the
/// alternate screen around it.
pub struct TerminalDriver {
    runtime: SessionRuntime,
    input: TerminalInput,
}

impl TerminalDriver {
    pub fn new(runtime: SessionRuntime, geometry: TerminalGeometry) -> Self {
        Self {
            runtime,
            input: TerminalInput::new(geometry),
        }
    }

    pub fn run(mut self) -> DriverResult<SessionSummary> {
        let mut stdout = io::stdout();
        self.enter(&mut stdout)?;
        let result = self.run_inner(&mut stdout);
        self.exit(&mut stdout);
        result
    }

    fn run_inner(&mut self, stdout: &mut impl Write) -> DriverResult<SessionSummary> {
        let summary = self.runtime.run(&mut self.input, stdout)?;
        Ok(summary)
    }

    fn enter(&self, stdout: &mut impl Write) -> DriverResult<()> {
        terminal::enable_raw_mode().map_err(|err| DriverError::Terminal(err.to_string()))?;
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableMouseCapture,
            Hide,
            Clear(ClearType::All)
        )?;
        Ok(())
    }

    fn exit(&self, stdout: &mut impl Write) {
        execute!(stdout, Show, DisableMouseCapture, LeaveAlternateScreen).ok();
        terminal::disable_raw_mode().ok();
    }
}
