//! Finds the next file waiting at an entry-point step

use crate::core::config::PipelineConfiguration;
use crate::core::error::PipelineError;
use crate::core::path::{self, ResolveOptions, TemplateValues};
use crate::core::validation;
use crate::storage::FileStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// A file and the step that should process it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub step_id: String,
    pub path: String,
}

pub struct FileDiscovery {
    store: Arc<dyn FileStore>,
}

impl FileDiscovery {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }

    /// First eligible file, by entry-point order then file name
    pub async fn find_next_available_file(
        &self,
        config: &PipelineConfiguration,
        exclude: &HashSet<String>,
    ) -> Result<DiscoveredFile, PipelineError> {
        let entry_points = validation::entry_points(&config.steps);
        if entry_points.is_empty() {
            return Err(PipelineError::NoEntryPoints);
        }

        for step_id in entry_points {
            let candidates = self.list_pending(config, &step_id).await?;
            if let Some(found) = candidates.into_iter().find(|p| !exclude.contains(p)) {
                debug!("Next file: {} for step {}", found, step_id);
                return Ok(DiscoveredFile { step_id, path: found });
            }
        }
        Err(PipelineError::NoFilesFound)
    }

    /// Files in a step's input folder that the step would accept, sorted by name
    pub async fn list_pending(
        &self,
        config: &PipelineConfiguration,
        step_id: &str,
    ) -> Result<Vec<String>, PipelineError> {
        let Some(step) = config.step(step_id) else {
            return Ok(Vec::new());
        };
        let Some(kind) = config.model_for(step).map(|m| m.implementation) else {
            warn!("Step {} refers to unknown model '{}'", step_id, step.model_config_ref);
            return Ok(Vec::new());
        };

        let values = TemplateValues::new().with_step_id(step_id);
        let resolved = path::resolve(&step.input_pattern, &values, &ResolveOptions::default())?;
        if !resolved.is_complete {
            debug!(
                "Input pattern '{}' of step {} needs {}; skipping",
                step.input_pattern,
                step_id,
                resolved.missing_variables.join(", ")
            );
            return Ok(Vec::new());
        }
        let folder = resolved.resolved_path;
        if !self.store.is_directory(&folder).await? {
            debug!("Input folder {} of step {} does not exist", folder, step_id);
            return Ok(Vec::new());
        }

        let mut files: Vec<(String, String)> = self
            .store
            .list_children(&folder)
            .await?
            .into_iter()
            .filter(|entry| !entry.is_dir && config.settings.accepts(kind, &entry.name))
            .map(|entry| (entry.name, entry.path))
            .collect();
        files.sort();
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }
}
