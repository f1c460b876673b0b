//! Model configuration bundles referenced by pipeline steps

use serde::{Deserialize, Serialize};

/// What a model does with its input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImplementationKind {
    /// Takes a text request, returns a text response
    Chat,
    /// Takes audio bytes, returns a transcript
    Transcription,
}

impl ImplementationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImplementationKind::Chat => "chat",
            ImplementationKind::Transcription => "transcription",
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Named credential and model selection
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// API base URL (OpenAI-compatible)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Literal API key
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Organization header value
    #[serde(default)]
    pub organization: Option<String>,

    /// Chat or transcription
    pub implementation: ImplementationKind,

    /// Model identifier sent to the API
    pub model: String,
}

impl ModelConfig {
    pub fn new(implementation: ImplementationKind, model: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: None,
            organization: None,
            implementation,
            model: model.into(),
        }
    }

    /// The literal key if set, otherwise the value of `api_key_env`
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|k| !k.is_empty())
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_env", &self.api_key_env)
            .field("organization", &self.organization)
            .field("implementation", &self.implementation)
            .field("model", &self.model)
            .finish()
    }
}
