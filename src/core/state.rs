//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Outcome of one step for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Completed,
    Failed,
}

/// Phase of the step state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepPhase {
    ReadInput,
    Dispatch,
    ParseResponse,
    WriteOutput,
    Archive,
    Completed,
}

impl std::fmt::Display for StepPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepPhase::ReadInput => "read input",
            StepPhase::Dispatch => "dispatch",
            StepPhase::ParseResponse => "parse response",
            StepPhase::WriteOutput => "write output",
            StepPhase::Archive => "archive",
            StepPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// A file written by a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: String,
    /// Step this output was routed to, if any
    pub next_step: Option<String>,
}

/// Result of running one step on one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    pub step_id: String,
    pub input_path: String,
    pub output_files: Vec<OutputFile>,
    /// Final location of the input (the input path itself if archiving fell back)
    pub archive_path: Option<String>,
    /// First routed next step
    pub next_step: Option<String>,
    /// Failure message
    pub error: Option<String>,
    /// Phase the step failed in
    pub failed_phase: Option<StepPhase>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl StepResult {
    pub fn completed(
        step_id: impl Into<String>,
        input_path: impl Into<String>,
        output_files: Vec<OutputFile>,
        archive_path: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        let next_step = output_files.iter().find_map(|f| f.next_step.clone());
        Self {
            status: StepStatus::Completed,
            step_id: step_id.into(),
            input_path: input_path.into(),
            output_files,
            archive_path: Some(archive_path),
            next_step,
            error: None,
            failed_phase: None,
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(
        step_id: impl Into<String>,
        input_path: impl Into<String>,
        phase: StepPhase,
        error: impl Into<String>,
        output_files: Vec<OutputFile>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: StepStatus::Failed,
            step_id: step_id.into(),
            input_path: input_path.into(),
            output_files,
            archive_path: None,
            next_step: None,
            error: Some(error.into()),
            failed_phase: Some(phase),
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// `(next step, output path)` pairs to follow
    pub fn routed_outputs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.output_files
            .iter()
            .filter_map(|f| f.next_step.as_deref().map(|next| (next, f.path.as_str())))
    }
}

/// Process-wide guard: one discovery/execution cycle at a time
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionState {
    pub processing: bool,
    pub active_files: HashSet<String>,
    pub last_execution_timestamp: Option<DateTime<Utc>>,
}

/// Shared handle injected into the engine
pub type SharedExecutionState = Arc<Mutex<ExecutionState>>;

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedExecutionState {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn is_active(&self, path: &str) -> bool {
        self.active_files.contains(path)
    }
}

/// Lock the state, recovering from a poisoned lock
pub fn lock_state(state: &SharedExecutionState) -> MutexGuard<'_, ExecutionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks a cycle as in flight; clears it on drop, whatever the outcome
///
/// The lock is only taken for the synchronous check-and-set, never across
/// an await.
#[derive(Debug)]
pub struct ProcessingGuard {
    state: SharedExecutionState,
    tracked: Vec<String>,
}

impl ProcessingGuard {
    /// Take the guard, or `None` if a cycle is already running
    pub fn acquire(state: &SharedExecutionState) -> Option<Self> {
        let mut locked = lock_state(state);
        if locked.processing {
            return None;
        }
        locked.processing = true;
        Some(Self {
            state: Arc::clone(state),
            tracked: Vec::new(),
        })
    }

    /// Add a file to the active set for the lifetime of this guard
    ///
    /// Returns `false` if the file was already active.
    pub fn track(&mut self, path: &str) -> bool {
        let inserted = lock_state(&self.state).active_files.insert(path.to_string());
        if inserted {
            self.tracked.push(path.to_string());
        }
        inserted
    }

    /// Snapshot of the active set
    pub fn active_files(&self) -> HashSet<String> {
        lock_state(&self.state).active_files.clone()
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        let mut locked = lock_state(&self.state);
        for path in &self.tracked {
            locked.active_files.remove(path);
        }
        locked.processing = false;
        locked.last_execution_timestamp = Some(Utc::now());
    }
}
