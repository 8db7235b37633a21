//! Drawing the session. The engine only hands out a [`FrameView`]; how it
//! ends up on screen is up to the [`Renderer`].

mod core;

use std::io::Write;
use std::time::Duration;

use crate::error::Result;
use crate::flow::Phase;
use crate::geometry::CellId;
use crate::grid::Grid;
use crate::occupancy::Piece;

pub use core::{RendererSettings, TerminalGeometry, TerminalRenderer};

/// Read-only snapshot of everything a renderer may show.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub phase: &'a Phase,
    pub grid: &'a Grid,
    pub pieces: &'a [Piece],
    /// Cells a training step asks to fill; empty outside training.
    pub targets: &'a [CellId],
    /// Stimulus name while a probe is visible.
    pub probe: Option<&'a str>,
    pub solving_time: Duration,
    pub moves: usize,
}

pub trait Renderer {
    /// Draw `view`. Returns whether anything was written.
    fn render(&mut self, writer: &mut dyn Write, view: &FrameView<'_>) -> Result<bool>;
}

/// Renderer for headless sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _writer: &mut dyn Write, _view: &FrameView<'_>) -> Result<bool> {
        Ok(false)
    }
}

/// Terminal columns taken by `text`, ignoring ANSI escape sequences.
pub fn display_width(text: &str) -> usize {
    use unicode_width::UnicodeWidthStr;

    let stripped = strip_ansi_escapes::strip_str(text);
    UnicodeWidthStr::width(stripped.as_str())
}
