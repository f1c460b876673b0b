//! Per-file, per-step runtime context

use crate::core::path::{self, TemplateValues};
use chrono::{DateTime, Local};
use serde::Serialize;

/// Runtime data for one file going through one step
///
/// Created fresh for every step invocation and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingContext {
    /// Input file name without extension
    pub filename: String,

    /// Step being executed
    pub step_id: String,

    /// Path-safe timestamp shared by every path resolved in this invocation
    pub timestamp: String,

    /// Day portion of `timestamp`
    pub date: String,

    /// When this invocation started (written to output metadata)
    pub started_at: DateTime<Local>,

    /// Vault path of the input file
    pub input_path: String,

    /// Last output written
    pub output_path: Option<String>,

    /// Where the input was (or will be) archived
    pub archive_path: Option<String>,

    /// `nextStep` chosen by the model for the section being handled
    pub routing_decision: Option<String>,
}

impl ProcessingContext {
    pub fn new(step_id: impl Into<String>, input_path: impl Into<String>) -> Self {
        Self::at(step_id, input_path, Local::now())
    }

    /// Context pinned to a given clock reading
    pub fn at(
        step_id: impl Into<String>,
        input_path: impl Into<String>,
        now: DateTime<Local>,
    ) -> Self {
        let input_path = input_path.into();
        Self {
            filename: path::stem(&input_path).to_string(),
            step_id: step_id.into(),
            timestamp: path::format_timestamp(&now),
            date: path::format_date(&now),
            started_at: now,
            input_path,
            output_path: None,
            archive_path: None,
            routing_decision: None,
        }
    }

    /// Input file name with extension
    pub fn input_basename(&self) -> &str {
        path::basename(&self.input_path)
    }

    /// Values for path templates
    pub fn template_values(&self) -> TemplateValues {
        TemplateValues::new()
            .with_filename(self.filename.clone())
            .with_step_id(self.step_id.clone())
            .with_timestamp(self.timestamp.clone())
            .with_date(self.date.clone())
    }
}
