//! Pipeline configuration from YAML

use crate::core::{
    model::{ImplementationKind, ModelConfig},
    ordered::OrderedMap,
    step::PipelineStep,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the vault root
pub const CONFIG_FILE_NAME: &str = "voxchain.yaml";

/// The full configuration set: models, the step graph and engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfiguration {
    /// Vault root (the CLI flag wins over this)
    #[serde(default)]
    pub vault: Option<PathBuf>,

    /// Named model bundles
    #[serde(default)]
    pub models: OrderedMap<ModelConfig>,

    /// stepId -> step; this is the routing graph
    #[serde(default)]
    pub steps: OrderedMap<PipelineStep>,

    /// Engine tunables
    #[serde(default)]
    pub settings: EngineSettings,
}

/// Engine tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Fail on malformed response frontmatter instead of degrading per section
    pub strict_protocol: bool,

    /// Responses larger than this are rejected before parsing
    pub max_response_bytes: usize,

    /// Extensions picked up by transcription steps
    pub audio_extensions: Vec<String>,

    /// Extensions picked up by chat steps
    pub text_extensions: Vec<String>,

    /// Per-request timeout for model calls
    pub request_timeout_secs: u64,

    /// Retries for retryable model errors
    pub max_retries: u32,

    /// First backoff delay; doubles per retry
    pub retry_backoff_ms: u64,

    /// Backoff ceiling
    pub max_retry_backoff_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            strict_protocol: false,
            max_response_bytes: 5 * 1024 * 1024,
            audio_extensions: [
                "mp3", "m4a", "wav", "webm", "ogg", "flac", "mp4", "mpeg", "mpga", "oga",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            text_extensions: vec!["md".to_string(), "txt".to_string()],
            request_timeout_secs: 120,
            max_retries: 3,
            retry_backoff_ms: 500,
            max_retry_backoff_ms: 8_000,
        }
    }
}

impl EngineSettings {
    /// Extension allow-list for a model kind
    pub fn extensions_for(&self, kind: ImplementationKind) -> &[String] {
        match kind {
            ImplementationKind::Transcription => &self.audio_extensions,
            ImplementationKind::Chat => &self.text_extensions,
        }
    }

    /// Whether `path` has an extension accepted for `kind` (case-insensitive)
    pub fn accepts(&self, kind: ImplementationKind, path: &str) -> bool {
        let Some(ext) = crate::core::path::extension(path) else {
            return false;
        };
        self.extensions_for(kind)
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

impl PipelineConfiguration {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parse configuration from a YAML string
    ///
    /// Only the shape is checked here; graph validation lives in
    /// [`crate::core::validation::validate`].
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfiguration = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Candidate config locations, most specific first
    pub fn default_locations(vault: &Path) -> Vec<PathBuf> {
        let mut locations = vec![vault.join(CONFIG_FILE_NAME)];
        if let Some(config_dir) = dirs::config_dir() {
            locations.push(config_dir.join("voxchain").join("config.yaml"));
        }
        locations
    }

    pub fn step(&self, id: &str) -> Option<&PipelineStep> {
        self.steps.get(id)
    }

    /// Model bundle a step refers to
    pub fn model_for(&self, step: &PipelineStep) -> Option<&ModelConfig> {
        self.models.get(&step.model_config_ref)
    }

    /// Add a step (builder style, mostly for tests and tooling)
    pub fn with_step(mut self, id: impl Into<String>, step: PipelineStep) -> Self {
        self.steps.insert(id, step);
        self
    }

    pub fn with_model(mut self, name: impl Into<String>, model: ModelConfig) -> Self {
        self.models.insert(name, model);
        self
    }
}
