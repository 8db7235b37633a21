use std::io::Write;

use blake3::Hash;

use crate::error::Result;
use crate::flow::{Phase, TrainingStage};
use crate::geometry::{Orientation, Point};
use crate::grid::Grid;
use crate::occupancy::PieceState;

use super::{FrameView, Renderer, display_width};

/// Maps lattice space onto terminal cells.
///
/// One lattice step is four columns wide and two lines tall, so a square
/// of the puzzle reads as `+---+` over `|   |`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalGeometry {
    origin: Point,
    step: f64,
    /// Screen line and column of the lattice origin.
    pub top: u16,
    pub left: u16,
}

impl TerminalGeometry {
    pub fn for_grid(grid: &Grid, top: u16, left: u16) -> Self {
        Self {
            origin: grid.origin(),
            step: grid.cell_length() + grid.cell_width(),
            top,
            left,
        }
    }

    /// Screen `(column, line)` of a lattice point, if it is on screen.
    pub fn to_screen(&self, point: Point) -> Option<(u16, u16)> {
        let column = (point.x - self.origin.x) * 4.0 / self.step + f64::from(self.left);
        let line = (self.origin.y - point.y) * 2.0 / self.step + f64::from(self.top);
        if column < 0.0 || line < 0.0 || column > f64::from(u16::MAX) || line > f64::from(u16::MAX) {
            return None;
        }
        Some((column.round() as u16, line.round() as u16))
    }

    /// Lattice point under a terminal cell.
    pub fn to_point(&self, column: u16, line: u16) -> Point {
        let column = f64::from(column) - f64::from(self.left);
        let line = f64::from(line) - f64::from(self.top);
        Point::new(
            self.origin.x + column * self.step / 4.0,
            self.origin.y - line * self.step / 2.0,
        )
    }
}

/// Renderer runtime parameters.
#[derive(Debug, Clone)]
pub struct RendererSettings {
    /// Screen position of the board's top-left corner.
    pub board_top: u16,
    pub board_left: u16,
    pub restore_cursor: Option<(u16, u16)>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            board_top: 2,
            board_left: 2,
            restore_cursor: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Plain,
    Dim,
    Piece,
    Held,
    Target,
}

impl Style {
    fn code(self) -> &'static str {
        match self {
            Style::Plain => "\x1b[0m",
            Style::Dim => "\x1b[2m",
            Style::Piece => "\x1b[1m",
            Style::Held => "\x1b[7m",
            Style::Target => "\x1b[33m",
        }
    }
}

struct Canvas {
    width: usize,
    rows: Vec<Vec<(char, Style)>>,
}

impl Canvas {
    fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            rows: vec![vec![(' ', Style::Plain); width]; height],
        }
    }

    fn put(&mut self, column: u16, line: u16, ch: char, style: Style) {
        if let Some(cell) = self
            .rows
            .get_mut(line as usize)
            .and_then(|row| row.get_mut(column as usize))
        {
            *cell = (ch, style);
        }
    }

    /// Draw a stick centred on `point`.
    fn stick(&mut self, geometry: &TerminalGeometry, point: Point, orientation: Orientation, style: Style) {
        let Some((column, line)) = geometry.to_screen(point) else {
            return;
        };
        match orientation {
            Orientation::Vertical => self.put(column, line, '|', style),
            Orientation::Horizontal => {
                for offset in [-1i32, 0, 1] {
                    let column = i32::from(column) + offset;
                    if column >= 0 {
                        self.put(column as u16, line, '-', style);
                    }
                }
            }
        }
    }

    fn text(&mut self, line: u16, text: &str) {
        for (column, ch) in text.chars().enumerate() {
            if column < self.width {
                self.put(column as u16, line, ch, Style::Plain);
            }
        }
    }

    fn into_lines(self) -> Vec<String> {
        self.rows
            .into_iter()
            .map(|row| {
                let mut line = String::new();
                let mut current = Style::Plain;
                for (ch, style) in row {
                    if style != current {
                        line.push_str(Style::Plain.code());
                        if style != Style::Plain {
                            line.push_str(style.code());
                        }
                        current = style;
                    }
                    line.push(ch);
                }
                if current != Style::Plain {
                    line.push_str(Style::Plain.code());
                }
                line
            })
            .collect()
    }
}

/// Draws the board, probes and instruction screens with ANSI sequences.
///
/// Identical frames are detected with a content hash and not written again.
pub struct TerminalRenderer {
    settings: RendererSettings,
    last_frame: Option<Hash>,
}

impl TerminalRenderer {
    pub fn new(settings: RendererSettings) -> Self {
        Self {
            settings,
            last_frame: None,
        }
    }

    pub fn with_default() -> Self {
        Self::new(RendererSettings::default())
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut RendererSettings {
        &mut self.settings
    }

    pub fn geometry(&self, grid: &Grid) -> TerminalGeometry {
        TerminalGeometry::for_grid(grid, self.settings.board_top, self.settings.board_left)
    }

    /// Forget the last frame so the next render always writes.
    pub fn invalidate(&mut self) {
        self.last_frame = None;
    }

    /// Lay out a frame as styled text lines.
    pub fn compose(&self, view: &FrameView<'_>) -> Vec<String> {
        let geometry = self.geometry(view.grid);
        let n = view.grid.square_count();
        let board_width = n * 4 + 1;
        let width = usize::from(self.settings.board_left) + board_width + 2;
        let board_bottom = usize::from(self.settings.board_top) + n * 2 + 1;
        let height = board_bottom + 3;
        let mut canvas = Canvas::new(width.max(48), height);

        canvas.text(0, &status_line(view));

        if view.phase.is_board() {
            for cell in view.grid.cells() {
                canvas.stick(&geometry, cell.position, cell.orientation, Style::Dim);
                if cell.orientation == Orientation::Horizontal {
                    if let Some((column, line)) = geometry.to_screen(cell.position) {
                        canvas.put(column.saturating_sub(2), line, '+', Style::Dim);
                        canvas.put(column + 2, line, '+', Style::Dim);
                    }
                }
            }
            for cell in view.targets.iter().filter_map(|id| view.grid.cell(*id)) {
                canvas.stick(&geometry, cell.position, cell.orientation, Style::Target);
            }
            for piece in view.pieces.iter().filter(|piece| !piece.is_held()) {
                canvas.stick(&geometry, piece.pose.position, piece.pose.orientation, Style::Piece);
            }
            for piece in view.pieces.iter().filter(|piece| piece.state == PieceState::Held) {
                canvas.stick(&geometry, piece.pose.position, piece.pose.orientation, Style::Held);
            }
        }

        let message_line = board_bottom as u16 + 1;
        canvas.text(message_line, &phase_message(view));
        canvas.into_lines()
    }
}

fn status_line(view: &FrameView<'_>) -> String {
    format!(
        "phase: {:<14} moves: {:<3} time: {:.1}s",
        view.phase.label(),
        view.moves,
        view.solving_time.as_secs_f64()
    )
}

fn phase_message(view: &FrameView<'_>) -> String {
    match view.phase {
        Phase::Instruction { name } => format!("[{name}] press space to continue"),
        Phase::Training { name, stage } => match stage {
            TrainingStage::Moving => format!("training `{name}`: fill the yellow cells"),
            TrainingStage::AwaitingReset { .. } => "now press r to reset the board".to_string(),
            TrainingStage::Lingering { .. } => "well done".to_string(),
        },
        Phase::ProbeTraining { remaining } => match view.probe {
            Some(probe) => format!("probe: {probe}  (left/right arrows, {remaining} left)"),
            None => String::new(),
        },
        Phase::ImpasseProbe { .. } => match view.probe {
            Some(probe) => format!("probe: {probe}  (left/right arrows)"),
            None => String::new(),
        },
        Phase::MainTask => {
            "click a stick, click its new place; wheel rotates, r resets, esc quits".to_string()
        }
        Phase::Complete => "session complete".to_string(),
    }
}

impl Renderer for TerminalRenderer {
    fn render(&mut self, writer: &mut dyn Write, view: &FrameView<'_>) -> Result<bool> {
        let lines = self.compose(view);
        let frame_hash = blake3::hash(lines.concat().as_bytes());
        if self.last_frame == Some(frame_hash) {
            return Ok(false);
        }
        self.last_frame = Some(frame_hash);

        let width = lines.iter().map(|line| display_width(line)).max().unwrap_or(0);
        for (offset, line) in lines.into_iter().enumerate() {
            let mut line = line;
            pad_line(&mut line, width);
            write!(writer, "\x1b[{};1H{}", offset + 1, line)?;
        }

        if let Some((row, col)) = self.settings.restore_cursor {
            write!(writer, "\x1b[{};{}H", row + 1, col + 1)?;
        }

        writer.flush()?;
        Ok(true)
    }
}

fn pad_line(line: &mut String, width: usize) {
    let display = display_width(line);
    for _ in display..width {
        line.push(' ');
    }
}
