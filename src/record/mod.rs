//! Trial records handed to the data sink, one per notable event.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::bus::{EventPayload, ExperimentEvent};
use crate::error::{KatonaError, Result};
use crate::logging::LogFields;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
    pub event: String,
    pub stage: String,
    #[serde(flatten)]
    pub fields: LogFields,
}

impl TrialRecord {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

pub trait DataSink {
    fn write(&mut self, record: &TrialRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects records in memory; clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataSink {
    records: Arc<Mutex<Vec<TrialRecord>>>,
}

impl MemoryDataSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TrialRecord> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<String> {
        self.records().into_iter().map(|record| record.event).collect()
    }
}

impl DataSink for MemoryDataSink {
    fn write(&mut self, record: &TrialRecord) -> Result<()> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| KatonaError::Backend("data sink poisoned".to_string()))?;
        guard.push(record.clone());
        Ok(())
    }
}

/// Writes one JSON object per record.
pub struct JsonLinesDataSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesDataSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DataSink for JsonLinesDataSink<W> {
    fn write(&mut self, record: &TrialRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Maps events to stage names and forwards them to a [`DataSink`].
pub struct TrialRecorder {
    sink: Box<dyn DataSink>,
    training: bool,
    written: usize,
}

impl TrialRecorder {
    pub fn new(sink: impl DataSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            training: false,
            written: 0,
        }
    }

    /// While set, stages are prefixed with `Training `.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn stage_for(&self, event: ExperimentEvent) -> Option<String> {
        let stage = match event {
            ExperimentEvent::Chosen
            | ExperimentEvent::Placed
            | ExperimentEvent::Reset
            | ExperimentEvent::Impasse
            | ExperimentEvent::WrongSolution => "Katona",
            ExperimentEvent::ProbeAnswer | ExperimentEvent::TrainingProbeAnswer => "Probe",
            ExperimentEvent::InstructionReading => "Instruction",
            ExperimentEvent::Click | ExperimentEvent::MouseUpdate => return None,
        };
        let prefix = if self.training || event == ExperimentEvent::TrainingProbeAnswer {
            "Training "
        } else {
            ""
        };
        Some(format!("{prefix}{stage}"))
    }

    /// Write a record for `event`. Raw input events are not recorded.
    pub fn record(&mut self, event: ExperimentEvent, payload: &EventPayload) -> Result<()> {
        let Some(stage) = self.stage_for(event) else {
            return Ok(());
        };
        let record = TrialRecord {
            event: event.name().to_string(),
            stage,
            fields: payload.fields(),
        };
        self.sink.write(&record)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }
}
