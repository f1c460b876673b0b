//! Core domain models for the pipeline
//!
//! Step graph, model bundles, path templates and the per-file runtime
//! state. Everything here is plain data plus pure functions over it.

pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod ordered;
pub mod path;
pub mod state;
pub mod step;
pub mod validation;

pub use config::{EngineSettings, PipelineConfiguration};
pub use context::ProcessingContext;
pub use error::{PathError, PipelineError, ProtocolError};
pub use model::{ImplementationKind, ModelConfig};
pub use ordered::OrderedMap;
pub use state::{
    ExecutionState, OutputFile, SharedExecutionState, StepPhase, StepResult, StepStatus,
};
pub use step::{OutputSpec, PipelineStep, RoutingOutput};
pub use validation::{ValidationError, ValidationResult, ValidationWarning};
