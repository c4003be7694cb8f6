use crate::ParallelMapType;
use log::{error, info};
use serde::Serialize;
use std::fmt;
use std::time::SystemTime;

/// Coarse checkpoints of a run
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Loading,
    Filtering,
    Meshing,
    WritingLayers,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStage::Loading => "loading",
            RunStage::Filtering => "filtering",
            RunStage::Meshing => "meshing",
            RunStage::WritingLayers => "writing layers",
        })
    }
}

/// State of a run as seen by observers
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running { stage: RunStage, message: String },
    Completed { message: String },
    Failed { message: String },
}

impl RunStatus {
    pub fn running<S: Into<String>>(stage: RunStage, message: S) -> Self {
        RunStatus::Running {
            stage,
            message: message.into(),
        }
    }

    /// Returns whether the run has finished, successfully or not
    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Completed { .. } | RunStatus::Failed { .. })
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running { stage, message } => write!(f, "{}: {}", stage, message),
            RunStatus::Completed { message } => write!(f, "completed: {}", message),
            RunStatus::Failed { message } => write!(f, "failed: {}", message),
        }
    }
}

/// Receiver of the status updates pushed by a run
///
/// Implementations must not block, the pipeline calls `report` from its worker thread.
pub trait StatusReporter: Send + Sync {
    fn report(&self, run_id: &str, status: RunStatus);
}

/// Reporter that discards all updates
#[derive(Copy, Clone, Debug, Default)]
pub struct NullStatusReporter;

impl StatusReporter for NullStatusReporter {
    fn report(&self, _run_id: &str, _status: RunStatus) {}
}

/// Reporter that writes every update to the log
#[derive(Copy, Clone, Debug, Default)]
pub struct LogStatusReporter;

impl StatusReporter for LogStatusReporter {
    fn report(&self, run_id: &str, status: RunStatus) {
        match status {
            RunStatus::Failed { .. } => error!("[{}] {}", run_id, status),
            _ => info!("[{}] {}", run_id, status),
        }
    }
}

/// Last reported status of a run
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusEntry {
    pub status: RunStatus,
    pub updated: SystemTime,
}

/// Concurrent in-memory registry of the latest status of every run
#[derive(Default)]
pub struct StatusRegistry {
    entries: ParallelMapType<String, StatusEntry>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a run that has not started yet
    pub fn insert_pending(&self, run_id: &str) {
        self.report(run_id, RunStatus::Pending);
    }

    /// Returns the latest status of the run
    pub fn get(&self, run_id: &str) -> Option<RunStatus> {
        self.entries.get(run_id).map(|entry| entry.status.clone())
    }

    /// Returns the latest status of all runs sorted by run id
    pub fn snapshot(&self) -> Vec<(String, RunStatus)> {
        let mut statuses = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status.clone()))
            .collect::<Vec<_>>();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    /// Removes the run from the registry and returns its last status
    pub fn remove(&self, run_id: &str) -> Option<RunStatus> {
        self.entries.remove(run_id).map(|(_, entry)| entry.status)
    }

    /// Returns the number of runs in the given state
    pub fn count_where<F: Fn(&RunStatus) -> bool>(&self, predicate: F) -> usize {
        self.entries
            .iter()
            .filter(|entry| predicate(&entry.value().status))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StatusReporter for StatusRegistry {
    fn report(&self, run_id: &str, status: RunStatus) {
        self.entries.insert(
            run_id.to_string(),
            StatusEntry {
                status,
                updated: SystemTime::now(),
            },
        );
    }
}

/// Forwards every update to two reporters
pub struct TeeStatusReporter<'a, A: StatusReporter, B: StatusReporter> {
    pub first: &'a A,
    pub second: &'a B,
}

impl<A: StatusReporter, B: StatusReporter> StatusReporter for TeeStatusReporter<'_, A, B> {
    fn report(&self, run_id: &str, status: RunStatus) {
        self.first.report(run_id, status.clone());
        self.second.report(run_id, status);
    }
}
