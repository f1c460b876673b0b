//! Model clients for transcription and chat completion

pub mod client;
pub mod error;
pub mod openai;

use crate::core::config::PipelineConfiguration;
use crate::core::model::ImplementationKind;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub use client::{with_retry, ClientConfig, RetryPolicy};
pub use error::AgentError;
pub use openai::OpenAiClient;

/// Extra parameters for a transcription call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptionOptions {
    /// Vocabulary/style hint passed to the model
    pub prompt: Option<String>,
    pub language: Option<String>,
}

/// The model collaborator; implementations own their retry policy
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Turn audio into text
    async fn transcribe(
        &self,
        audio: &[u8],
        filename: &str,
        options: &TranscriptionOptions,
    ) -> Result<String, AgentError>;

    /// Send a formatted protocol request, get the raw response text
    async fn complete(&self, request: &str) -> Result<String, AgentError>;
}

pub type ModelHandle = Arc<dyn ModelClient>;

/// A client tagged with the capability a step uses it for
#[derive(Clone)]
pub enum Model {
    Chat(ModelHandle),
    Transcription(ModelHandle),
}

impl Model {
    pub fn new(kind: ImplementationKind, client: ModelHandle) -> Self {
        match kind {
            ImplementationKind::Chat => Model::Chat(client),
            ImplementationKind::Transcription => Model::Transcription(client),
        }
    }

    pub fn kind(&self) -> ImplementationKind {
        match self {
            Model::Chat(_) => ImplementationKind::Chat,
            Model::Transcription(_) => ImplementationKind::Transcription,
        }
    }

    pub fn client(&self) -> &ModelHandle {
        match self {
            Model::Chat(client) | Model::Transcription(client) => client,
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Model::{:?}", self.kind())
    }
}

/// Models by configuration name
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Model>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a REST client for every configured model
    pub fn from_config(config: &PipelineConfiguration) -> Result<Self, AgentError> {
        let client_config = ClientConfig::from_settings(&config.settings);
        let mut registry = Self::new();
        for (name, model) in config.models.iter() {
            let client = OpenAiClient::new(model, &client_config)?;
            registry.register(name, Model::new(model.implementation, Arc::new(client)));
        }
        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, model: Model) {
        self.models.insert(name.into(), model);
    }

    pub fn with(mut self, name: impl Into<String>, model: Model) -> Self {
        self.register(name, model);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
