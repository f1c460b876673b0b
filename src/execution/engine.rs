//! Pipeline executor - picks a file and follows it through the step chain

use crate::{
    agent::ModelRegistry,
    core::{
        config::PipelineConfiguration,
        error::PipelineError,
        state::{ProcessingGuard, SharedExecutionState, StepPhase, StepResult},
        validation::{self, ValidationResult},
    },
    execution::{
        discovery::{DiscoveredFile, FileDiscovery},
        executor::StepChainExecutor,
    },
    protocol::ProtocolStats,
    storage::FileStore,
};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur while a file moves through the pipeline
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    FileSelected {
        run_id: Uuid,
        step_id: String,
        path: String,
    },
    StepStarted {
        run_id: Uuid,
        step_id: String,
        path: String,
    },
    StepCompleted {
        run_id: Uuid,
        step_id: String,
        path: String,
        outputs: Vec<String>,
        next_steps: Vec<String>,
    },
    StepFailed {
        run_id: Uuid,
        step_id: String,
        path: String,
        phase: StepPhase,
        error: String,
    },
    ChainCompleted {
        run_id: Uuid,
        source: String,
        status: ChainStatus,
        steps_run: usize,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Overall outcome of one file's chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChainStatus {
    /// Every hop completed
    Completed,
    /// At least one hop failed
    Failed,
}

/// Everything that happened to one discovered file
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub run_id: Uuid,
    pub source: DiscoveredFile,
    /// One result per hop, in execution order
    pub results: Vec<StepResult>,
    pub status: ChainStatus,
}

impl ChainOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ChainStatus::Completed
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

/// Top-level façade: validates once, then processes one file per call
pub struct PipelineExecutor {
    config: Arc<PipelineConfiguration>,
    validation: ValidationResult,
    state: SharedExecutionState,
    discovery: FileDiscovery,
    executor: StepChainExecutor,
    event_handlers: Mutex<Vec<EventHandler>>,
}

impl PipelineExecutor {
    pub fn new(
        config: PipelineConfiguration,
        store: Arc<dyn FileStore>,
        models: ModelRegistry,
        state: SharedExecutionState,
    ) -> Self {
        let validation = validation::validate(&config);
        if validation.is_valid {
            for warning in &validation.warnings {
                warn!("Configuration warning: {}", warning);
            }
        } else {
            error!("Configuration is invalid: {}", validation.error_summary());
        }

        let config = Arc::new(config);
        Self {
            discovery: FileDiscovery::new(Arc::clone(&store)),
            executor: StepChainExecutor::new(Arc::clone(&config), store, models),
            config,
            validation,
            state,
            event_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfiguration {
        &self.config
    }

    pub fn validation(&self) -> &ValidationResult {
        &self.validation
    }

    pub fn stats(&self) -> ProtocolStats {
        self.executor.stats()
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.handlers().push(Arc::new(handler));
    }

    fn handlers(&self) -> std::sync::MutexGuard<'_, Vec<EventHandler>> {
        self.event_handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        let handlers: Vec<EventHandler> = self.handlers().clone();
        for handler in handlers {
            handler(event.clone());
        }
    }

    /// Process the next eligible file through its whole chain
    pub async fn process_next_file(&self) -> Result<ChainOutcome, PipelineError> {
        self.process_next_file_excluding(&HashSet::new()).await
    }

    /// Run chains until discovery runs dry or `limit` chains have run
    ///
    /// Every source handled in the batch is skipped afterwards, whatever its
    /// outcome. A source whose archive move failed is still in its inbox.
    pub async fn process_batch(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ChainOutcome>, PipelineError> {
        let mut handled = HashSet::new();
        let mut outcomes = Vec::new();

        while limit.map_or(true, |max| outcomes.len() < max) {
            match self.process_next_file_excluding(&handled).await {
                Ok(outcome) => {
                    handled.insert(outcome.source.path.clone());
                    outcomes.push(outcome);
                }
                Err(e) if e.is_recoverable() => {
                    debug!("Batch stopped after {} file(s): {}", outcomes.len(), e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcomes)
    }

    /// Like [`Self::process_next_file`], skipping `exclude` during discovery
    pub async fn process_next_file_excluding(
        &self,
        exclude: &HashSet<String>,
    ) -> Result<ChainOutcome, PipelineError> {
        if !self.validation.is_valid {
            return Err(PipelineError::Configuration(self.validation.error_summary()));
        }
        let mut guard =
            ProcessingGuard::acquire(&self.state).ok_or(PipelineError::AlreadyProcessing)?;

        let mut skip = guard.active_files();
        skip.extend(exclude.iter().cloned());
        let source = self.discovery.find_next_available_file(&self.config, &skip).await?;
        guard.track(&source.path);

        let run_id = Uuid::new_v4();
        info!("Processing {} with step {} ({})", source.path, source.step_id, run_id);
        self.emit_event(ExecutionEvent::FileSelected {
            run_id,
            step_id: source.step_id.clone(),
            path: source.path.clone(),
        });

        let mut queue = VecDeque::from([(source.step_id.clone(), source.path.clone())]);
        let mut results = Vec::new();

        while let Some((step_id, path)) = queue.pop_front() {
            self.emit_event(ExecutionEvent::StepStarted {
                run_id,
                step_id: step_id.clone(),
                path: path.clone(),
            });

            let result = self.executor.execute(&step_id, &path).await;

            if result.is_success() {
                let mut next_steps = Vec::new();
                for (next, output) in result.routed_outputs() {
                    if self.config.step(next).is_none() {
                        warn!("Output {} routed to unknown step '{}', not following", output, next);
                        continue;
                    }
                    if !guard.track(output) {
                        warn!(
                            "Output {} is already in flight, not queueing it again for '{}'",
                            output, next
                        );
                        continue;
                    }
                    queue.push_back((next.to_string(), output.to_string()));
                    next_steps.push(next.to_string());
                }
                self.emit_event(ExecutionEvent::StepCompleted {
                    run_id,
                    step_id: step_id.clone(),
                    path: path.clone(),
                    outputs: result.output_files.iter().map(|f| f.path.clone()).collect(),
                    next_steps,
                });
            } else {
                self.emit_event(ExecutionEvent::StepFailed {
                    run_id,
                    step_id: step_id.clone(),
                    path: path.clone(),
                    phase: result.failed_phase.unwrap_or(StepPhase::ReadInput),
                    error: result.error.clone().unwrap_or_default(),
                });
            }
            results.push(result);
        }

        let status = if results.iter().all(StepResult::is_success) {
            ChainStatus::Completed
        } else {
            ChainStatus::Failed
        };
        info!("Finished {}: {:?} after {} step(s)", source.path, status, results.len());
        self.emit_event(ExecutionEvent::ChainCompleted {
            run_id,
            source: source.path.clone(),
            status,
            steps_run: results.len(),
        });

        Ok(ChainOutcome {
            run_id,
            source,
            results,
            status,
        })
    }
}
