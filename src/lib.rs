//! voxchain - routes voice notes and documents through model-driven steps

pub mod agent;
pub mod cli;
pub mod core;
pub mod execution;
pub mod protocol;
pub mod storage;

// Re-export commonly used types
pub use agent::{AgentError, Model, ModelClient, ModelRegistry, OpenAiClient, TranscriptionOptions};
pub use core::{
    ExecutionState, PipelineConfiguration, PipelineError, PipelineStep, StepResult,
    ValidationResult,
};
pub use execution::{ChainOutcome, ExecutionEvent, PipelineExecutor};
pub use storage::{FileStore, LocalFileStore, MemoryFileStore};
