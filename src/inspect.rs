//! Debug capture of intermediate compute artifacts.
//!
//! Recording is best effort: the engine logs sink failures and carries on,
//! so enabling inspection never changes what a request returns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    Request,
    Axes,
    MatchFilter,
    Query,
    RawResults,
    Results,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectionRecord {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub artifact: Artifact,
    pub payload: Value,
}

impl InspectionRecord {
    pub fn new(request_id: Uuid, artifact: Artifact, payload: Value) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
            artifact,
            payload,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InspectionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("inspection channel closed")]
    Closed,
    #[error("inspection worker failed: {0}")]
    Join(String),
}

pub trait InspectionSink: Send + Sync {
    fn record(&self, record: InspectionRecord) -> Result<(), InspectionError>;
}

#[derive(Clone)]
pub struct JsonlInspectionSink {
    sender: mpsc::Sender<InspectionRecord>,
}

pub struct InspectionWorker {
    handle: Option<std::thread::JoinHandle<Result<usize, InspectionError>>>,
}

impl InspectionWorker {
    /// Wait for every queued record to be written. Returns the number of
    /// lines written.
    pub fn join(mut self) -> Result<usize, InspectionError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(InspectionError::Join(
                    "inspection worker panicked".to_string(),
                )),
            },
            None => Ok(0),
        }
    }
}

impl JsonlInspectionSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, InspectionWorker), InspectionError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel::<InspectionRecord>();
        let handle = std::thread::spawn(move || write_loop(file, receiver));
        Ok((
            Self { sender },
            InspectionWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl InspectionSink for JsonlInspectionSink {
    fn record(&self, record: InspectionRecord) -> Result<(), InspectionError> {
        self.sender.send(record).map_err(|_| InspectionError::Closed)
    }
}

fn write_loop(
    file: std::fs::File,
    receiver: mpsc::Receiver<InspectionRecord>,
) -> Result<usize, InspectionError> {
    let mut writer = BufWriter::new(file);
    let mut written = 0usize;
    for record in receiver {
        let line =
            serde_json::to_string(&record).map_err(|e| InspectionError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}
