//! Writes response sections to their destination

use crate::core::context::ProcessingContext;
use crate::core::error::PipelineError;
use crate::core::path::{self, ResolveOptions};
use crate::core::step::{OutputSpec, PipelineStep};
use crate::protocol::ResponseSection;
use crate::storage::{FileStore, WriteOptions};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Placeholder names models tend to invent; these never replace the input's name
const GENERIC_NAMES: [&str; 5] = ["response", "output", "untitled", "result", "document"];

/// A file written for one section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOperationResult {
    pub path: String,
    /// Step the file was routed to (only when a routing entry matched)
    pub next_step: Option<String>,
    pub bytes_written: usize,
}

#[derive(Serialize)]
struct OutputMetadata<'a> {
    source: String,
    processed: String,
    step: &'a str,
    #[serde(rename = "nextStep", skip_serializing_if = "Option::is_none")]
    next_step: Option<&'a str>,
}

/// Whether a model-supplied name is a meaningless placeholder
pub fn is_generic_name(filename: &str) -> bool {
    let stem = path::stem(filename).trim().to_ascii_lowercase();
    stem.is_empty() || GENERIC_NAMES.contains(&stem.as_str())
}

/// Output name (without extension) for a section
pub fn effective_stem<'a>(section: &'a ResponseSection, ctx: &'a ProcessingContext) -> &'a str {
    if is_generic_name(&section.filename) {
        &ctx.filename
    } else {
        path::stem(&section.filename)
    }
}

/// Pick the output template for a section
///
/// Returns the template and the next step it routes to.
pub fn select_template<'a>(
    spec: &'a OutputSpec,
    next_step: Option<&str>,
    step_id: &str,
) -> Result<(&'a str, Option<String>), PipelineError> {
    match spec {
        OutputSpec::Single(template) => Ok((template.as_str(), None)),
        OutputSpec::Routing(routing) => {
            if let Some(next) = next_step {
                if let Some(template) = routing.route(next).filter(|t| !t.trim().is_empty()) {
                    return Ok((template, Some(next.to_string())));
                }
            }
            if let Some(template) = routing.default_template().filter(|t| !t.trim().is_empty()) {
                return Ok((template, None));
            }
            Err(PipelineError::Routing {
                step_id: step_id.to_string(),
                next_step: next_step.map(str::to_string),
                available: routing.available_keys(),
            })
        }
    }
}

/// Resolves output paths and persists sections with metadata
pub struct OutputHandler {
    store: Arc<dyn FileStore>,
}

impl OutputHandler {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }

    /// Destination path plus routed next step, without writing anything
    pub fn resolve_destination(
        &self,
        section: &ResponseSection,
        step: &PipelineStep,
        ctx: &ProcessingContext,
    ) -> Result<(String, Option<String>), PipelineError> {
        let (template, next_step) =
            select_template(&step.output_spec, section.next_step.as_deref(), &ctx.step_id)?;
        let stem = effective_stem(section, ctx);
        let values = ctx.template_values().with_filename(stem);
        let resolved = path::resolve(template, &values, &ResolveOptions::default())?;
        if !resolved.is_complete {
            return Err(PipelineError::Configuration(format!(
                "Output template '{}' of step '{}' is missing {}",
                template,
                ctx.step_id,
                resolved.missing_variables.join(", ")
            )));
        }

        let destination = if template.contains("{filename}") {
            resolved.resolved_path
        } else {
            path::join(&resolved.resolved_path, &format!("{}.md", stem))
        };
        debug!("Section '{}' of {} -> {}", section.filename, ctx.input_path, destination);
        Ok((destination, next_step))
    }

    /// Write one section; `ctx.archive_path` should already be planned
    ///
    /// `claimed` holds paths already written for the same response. A section
    /// landing on one of them gets the next free `-N` name instead.
    pub async fn save(
        &self,
        section: &ResponseSection,
        step: &PipelineStep,
        ctx: &ProcessingContext,
        claimed: &HashSet<String>,
    ) -> Result<FileOperationResult, PipelineError> {
        let (resolved, next_step) = self.resolve_destination(section, step, ctx)?;
        let destination = unclaimed(&resolved, claimed);
        if destination != resolved {
            warn!(
                "Section '{}' of {} collides with {}, writing {}",
                section.filename, ctx.input_path, resolved, destination
            );
        }
        let document = render(section, next_step.as_deref(), ctx)?;

        self.store
            .write(&destination, document.as_bytes(), WriteOptions::replace())
            .await?;
        info!("Wrote {} ({} bytes)", destination, document.len());

        Ok(FileOperationResult {
            path: destination,
            next_step,
            bytes_written: document.len(),
        })
    }
}

/// First of `path`, `stem-1.ext`, `stem-2.ext`, ... not in `claimed`
fn unclaimed(path: &str, claimed: &HashSet<String>) -> String {
    if !claimed.contains(path) {
        return path.to_string();
    }
    let (dir, name) = (path::parent(path), path::basename(path));
    (1u32..)
        .map(|counter| path::join(dir, &path::numbered(name, counter)))
        .find(|candidate| !claimed.contains(candidate))
        .unwrap_or_else(|| path.to_string())
}

fn render(
    section: &ResponseSection,
    next_step: Option<&str>,
    ctx: &ProcessingContext,
) -> Result<String, PipelineError> {
    let source = ctx.archive_path.as_deref().unwrap_or(&ctx.input_path);
    let metadata = OutputMetadata {
        source: format!("[[{}]]", source),
        processed: ctx.started_at.to_rfc3339(),
        step: &ctx.step_id,
        next_step,
    };
    let frontmatter = serde_yaml::to_string(&metadata)
        .map_err(|e| PipelineError::Configuration(format!("Failed to render metadata: {}", e)))?;
    Ok(format!("---\n{}---\n\n{}\n", frontmatter, section.content))
}
