//! Pipeline execution engine

pub mod archive;
pub mod discovery;
pub mod engine;
pub mod executor;
pub mod output;

pub use archive::{ArchivePlan, ArchiveResolver};
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use engine::{ChainOutcome, ChainStatus, EventHandler, ExecutionEvent, PipelineExecutor};
pub use executor::StepChainExecutor;
pub use output::{FileOperationResult, OutputHandler};
