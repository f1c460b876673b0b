//! Error taxonomy for configuration, protocol, routing and I/O failures

use crate::agent::AgentError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors raised while resolving a path template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Unsupported template variable '{{{name}}}' in '{template}'")]
    UnsupportedVariable { name: String, template: String },

    #[error("Absolute paths are not allowed: {0}")]
    AbsolutePath(String),

    #[error("Directory traversal is not allowed: {0}")]
    DirectoryTraversal(String),

    #[error("Resolved path is empty")]
    EmptyPath,
}

/// Errors raised while parsing a model response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Response too large: {size} bytes exceeds limit of {max} bytes")]
    ResponseTooLarge { size: usize, max: usize },

    #[error("No closing delimiter found for section {section}")]
    NoClosingDelimiter { section: usize },

    #[error("Invalid frontmatter in section {section}: {reason}")]
    InvalidFrontmatter { section: usize, reason: String },
}

/// Errors surfaced by the pipeline engine
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(
        "No valid output directory for step '{step_id}' (nextStep: {}, available: [{}])",
        .next_step.as_deref().unwrap_or("none"),
        .available.join(", ")
    )]
    Routing {
        step_id: String,
        next_step: Option<String>,
        available: Vec<String>,
    },

    #[error("Storage error: {0}")]
    Io(#[from] StorageError),

    #[error("Model call failed: {0}")]
    Transport(#[from] AgentError),

    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Source file not found: {0}")]
    SourceNotFound(String),

    #[error("No entry points configured")]
    NoEntryPoints,

    #[error("No files found in entry point inputs")]
    NoFilesFound,

    #[error("A pipeline run is already in progress")]
    AlreadyProcessing,
}

impl PipelineError {
    /// Conditions a caller can simply retry later
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::NoEntryPoints
                | PipelineError::NoFilesFound
                | PipelineError::AlreadyProcessing
        )
    }
}
