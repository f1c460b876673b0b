//! Step chain executor - drives one file through one step

use crate::{
    agent::{Model, ModelRegistry, TranscriptionOptions},
    core::{
        config::PipelineConfiguration,
        context::ProcessingContext,
        error::PipelineError,
        state::{OutputFile, StepPhase, StepResult},
        step::PipelineStep,
    },
    execution::{archive::ArchiveResolver, output::OutputHandler},
    protocol::{
        ParseMode, ProtocolRequest, ProtocolStats, ResponseParser, ResponseSection, RouteOption,
    },
    storage::FileStore,
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Input read according to the step's model kind
enum StepInput {
    Audio(Vec<u8>),
    Text(String),
}

struct Failure {
    phase: StepPhase,
    error: PipelineError,
}

impl Failure {
    fn at(phase: StepPhase) -> impl FnOnce(PipelineError) -> Failure {
        move |error| Failure { phase, error }
    }
}

/// Runs single steps: read, dispatch, parse, write, archive
pub struct StepChainExecutor {
    config: Arc<PipelineConfiguration>,
    store: Arc<dyn FileStore>,
    models: ModelRegistry,
    parser: ResponseParser,
    archive: ArchiveResolver,
    output: OutputHandler,
}

impl StepChainExecutor {
    pub fn new(
        config: Arc<PipelineConfiguration>,
        store: Arc<dyn FileStore>,
        models: ModelRegistry,
    ) -> Self {
        let mode = if config.settings.strict_protocol {
            ParseMode::Strict
        } else {
            ParseMode::Lenient
        };
        let parser = ResponseParser::new(mode, config.settings.max_response_bytes);
        Self {
            archive: ArchiveResolver::new(Arc::clone(&store)),
            output: OutputHandler::new(Arc::clone(&store)),
            config,
            store,
            models,
            parser,
        }
    }

    pub fn stats(&self) -> ProtocolStats {
        self.parser.stats()
    }

    /// Run `step_id` on `input_path`; failures are reported in the result
    pub async fn execute(&self, step_id: &str, input_path: &str) -> StepResult {
        let mut ctx = ProcessingContext::new(step_id, input_path);
        let started_at = ctx.started_at.with_timezone(&Utc);
        let mut outputs = Vec::new();
        info!("Executing step: {} on {}", step_id, input_path);

        match self.run(&mut ctx, &mut outputs).await {
            Ok(archive_path) => {
                info!(
                    "Step {} completed: {} output(s), archived to {}",
                    step_id,
                    outputs.len(),
                    archive_path
                );
                StepResult::completed(step_id, input_path, outputs, archive_path, started_at)
            }
            Err(Failure { phase, error }) => {
                error!("Step {} failed during {} on {}: {}", step_id, phase, input_path, error);
                let message = error.to_string();
                StepResult::failed(step_id, input_path, phase, message, outputs, started_at)
            }
        }
    }

    async fn run(
        &self,
        ctx: &mut ProcessingContext,
        outputs: &mut Vec<OutputFile>,
    ) -> Result<String, Failure> {
        let step = self.config.step(&ctx.step_id).ok_or_else(|| Failure {
            phase: StepPhase::ReadInput,
            error: PipelineError::Configuration(format!("Unknown step '{}'", ctx.step_id)),
        })?;
        let model = self.models.get(&step.model_config_ref).ok_or_else(|| Failure {
            phase: StepPhase::Dispatch,
            error: PipelineError::Configuration(format!(
                "No model client registered for '{}' (step '{}')",
                step.model_config_ref, ctx.step_id
            )),
        })?;

        // ReadInput
        let input = self
            .read_input(model, &ctx.input_path)
            .await
            .map_err(Failure::at(StepPhase::ReadInput))?;
        let prompts = self
            .read_refs(&step.prompt_refs)
            .await
            .map_err(Failure::at(StepPhase::ReadInput))?;
        let context = self
            .read_refs(&step.context_refs)
            .await
            .map_err(Failure::at(StepPhase::ReadInput))?;

        // Dispatch + ParseResponse
        let client = model.client();
        let sections = match input {
            StepInput::Audio(audio) => {
                let options = TranscriptionOptions {
                    prompt: (!prompts.is_empty()).then(|| {
                        prompts.iter().map(|(_, body)| body.trim()).collect::<Vec<_>>().join("\n\n")
                    }),
                    language: None,
                };
                let transcript = client
                    .transcribe(&audio, ctx.input_basename(), &options)
                    .await
                    .map_err(PipelineError::from)
                    .map_err(Failure::at(StepPhase::Dispatch))?;
                debug!("Transcript for {}: {} chars", ctx.input_path, transcript.len());
                vec![ResponseSection {
                    filename: format!("{}.md", ctx.filename),
                    next_step: implied_route(step),
                    content: transcript.trim().to_string(),
                }]
            }
            StepInput::Text(text) => {
                let request =
                    self.build_request(step, ctx.input_basename(), text, prompts, context);
                let payload = request.format();
                debug!(
                    "Request for {}: {} bytes, {} section(s)",
                    ctx.input_path,
                    payload.len(),
                    request.sections().len()
                );
                let response = client
                    .complete(&payload)
                    .await
                    .map_err(PipelineError::from)
                    .map_err(Failure::at(StepPhase::Dispatch))?;
                debug!("Response for {}: {} bytes", ctx.input_path, response.len());
                self.parser
                    .parse(&response)
                    .map_err(PipelineError::from)
                    .map_err(Failure::at(StepPhase::ParseResponse))?
            }
        };

        // Outputs link to the archived original, so plan the archive first
        let planned = match self.archive.plan(&ctx.input_path, &step.archive_pattern, ctx).await {
            Ok(plan) => plan.target,
            Err(e) => {
                warn!("Could not plan archive for {}: {}", ctx.input_path, e);
                ctx.input_path.clone()
            }
        };
        ctx.archive_path = Some(planned.clone());

        // WriteOutput
        let mut claimed = HashSet::new();
        for section in &sections {
            ctx.routing_decision = section.next_step.clone();
            let written = self
                .output
                .save(section, step, ctx, &claimed)
                .await
                .map_err(Failure::at(StepPhase::WriteOutput))?;
            claimed.insert(written.path.clone());
            ctx.output_path = Some(written.path.clone());
            outputs.push(OutputFile {
                path: written.path,
                next_step: written.next_step,
            });
        }

        // Archive
        let archived = self
            .archive
            .archive(&ctx.input_path, &step.archive_pattern, ctx)
            .await
            .map_err(Failure::at(StepPhase::Archive))?;
        if archived != planned {
            warn!(
                "Archive of {} landed at {} but outputs link to {}",
                ctx.input_path, archived, planned
            );
        }
        ctx.archive_path = Some(archived.clone());
        Ok(archived)
    }

    async fn read_input(
        &self,
        model: &Model,
        input_path: &str,
    ) -> Result<StepInput, PipelineError> {
        Ok(match model {
            Model::Transcription(_) => StepInput::Audio(self.store.read(input_path).await?),
            Model::Chat(_) => StepInput::Text(self.store.read_to_string(input_path).await?),
        })
    }

    /// Read prompt/context files as `(path, body)` pairs
    async fn read_refs(&self, refs: &[String]) -> Result<Vec<(String, String)>, PipelineError> {
        let mut loaded = Vec::with_capacity(refs.len());
        for reference in refs {
            let body = self.store.read_to_string(reference).await?;
            loaded.push((reference.clone(), body));
        }
        Ok(loaded)
    }

    fn build_request(
        &self,
        step: &PipelineStep,
        input_name: &str,
        input: String,
        prompts: Vec<(String, String)>,
        context: Vec<(String, String)>,
    ) -> ProtocolRequest {
        let mut request = ProtocolRequest::new().input(input_name, input);
        for (name, body) in prompts {
            request = request.prompt(name, body);
        }
        for (name, body) in context {
            request = request.context(name, body);
        }
        request.routing(&self.route_options(step))
    }

    /// Next steps offered to the model, described by the target step
    pub fn route_options(&self, step: &PipelineStep) -> Vec<RouteOption> {
        step.output_spec
            .targets()
            .into_iter()
            .map(|target| RouteOption {
                step_id: target.to_string(),
                condition: self
                    .config
                    .step(target)
                    .and_then(|s| s.description.clone())
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| target.to_string()),
            })
            .collect()
    }
}

/// A transcript can't name its next step; a lone route is taken as given
fn implied_route(step: &PipelineStep) -> Option<String> {
    let targets = step.output_spec.targets();
    match targets.as_slice() {
        [only] => Some(only.to_string()),
        _ => None,
    }
}
