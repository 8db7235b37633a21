//! Five-square Katona task in the terminal.
//!
//! Usage: `cargo run --example five_square [config.json]`
//!
//! Click a stick to pick it up, click a free cell to drop it. The mouse
//! wheel turns the held stick, `r` resets the board, the arrow keys answer
//! probes and `Esc` ends the session. Trial records go to
//! `katona_session.jsonl`, logs to `katona_session.log`.

use std::env;
use std::error::Error;
use std::fs::File;
use std::io::BufWriter;
use std::time::Duration;

use katona_engine::logging::FileSink;
use katona_engine::{
    ExperimentConfig, GridConfig, JsonLinesDataSink, LogLevel, Logger, Point, RuntimeConfig,
    SessionRuntime, TerminalDriver, TerminalRenderer,
};

fn main() -> Result<(), Box<dyn Error>> {
    let config = match env::args().nth(1) {
        Some(path) => ExperimentConfig::from_path(path)?,
        None => ExperimentConfig {
            // One lattice step per four terminal columns.
            grid: GridConfig {
                square_count: 9,
                cell_length: 3.0,
                cell_width: 1.0,
                origin: Point::new(0.0, 0.0),
            },
            ..ExperimentConfig::default()
        },
    };

    let logger = Logger::new(FileSink::new("katona_session.log", 4 * 1024 * 1024)?)
        .with_min_level(LogLevel::Debug);
    let records = JsonLinesDataSink::new(BufWriter::new(File::create("katona_session.jsonl")?));

    let renderer = TerminalRenderer::with_default();
    let geometry = renderer.geometry(&config.build_grid()?);
    let runtime_config = RuntimeConfig {
        tick_interval: Duration::from_millis(16),
        logger: Some(logger),
        metrics_interval: Duration::from_secs(10),
        ..RuntimeConfig::default()
    };
    let runtime = SessionRuntime::new(&config, records, renderer, runtime_config)?;

    let summary = TerminalDriver::new(runtime, geometry).run()?;

    match summary.solution.as_deref() {
        Some(name) => println!("solved `{name}` in {:.1}s", summary.solving_time.as_secs_f64()),
        None if summary.timed_out => println!("time limit reached"),
        None => println!("not solved"),
    }
    println!(
        "moves: {}  resets: {}  impasses: {}  records: {}",
        summary.moves, summary.resets, summary.impasses, summary.records
    );
    Ok(())
}
