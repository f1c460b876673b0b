//! Test utility functions for voxchain
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxchain::agent::{AgentError, Model, ModelClient, ModelRegistry, TranscriptionOptions};
use voxchain::core::{state::ExecutionState, state::SharedExecutionState, PipelineConfiguration};
use voxchain::execution::{ExecutionEvent, PipelineExecutor};
use voxchain::storage::MemoryFileStore;

/// A call the mock model received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Transcribe { filename: String, bytes: usize },
    Complete { request: String },
}

/// Mock model that returns predefined responses in order
#[derive(Clone)]
pub struct MockModel {
    responses: Arc<Mutex<VecDeque<Result<String, AgentError>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    simulate_delay: Option<Duration>,
}

impl MockModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect())),
            calls: Arc::new(Mutex::new(Vec::new())),
            simulate_delay: None,
        }
    }

    pub fn failing(error: AgentError) -> Self {
        let mock = Self::new(Vec::<String>::new());
        mock.push_error(error);
        mock
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.simulate_delay = Some(delay);
        self
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(response.into()));
    }

    pub fn push_error(&self, error: AgentError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Complete { request } => Some(request),
                MockCall::Transcribe { .. } => None,
            })
            .collect()
    }

    async fn next(&self, call: MockCall) -> Result<String, AgentError> {
        if let Some(delay) = self.simulate_delay {
            tokio::time::sleep(delay).await;
        }
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len()
        };
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(AgentError::InvalidResponse(format!(
                "MockModel: No response available for request {}",
                index
            )))
        })
    }
}

#[async_trait]
impl ModelClient for MockModel {
    async fn transcribe(
        &self,
        audio: &[u8],
        filename: &str,
        _options: &TranscriptionOptions,
    ) -> Result<String, AgentError> {
        self.next(MockCall::Transcribe {
            filename: filename.to_string(),
            bytes: audio.len(),
        })
        .await
    }

    async fn complete(&self, request: &str) -> Result<String, AgentError> {
        self.next(MockCall::Complete {
            request: request.to_string(),
        })
        .await
    }
}

/// The three-step voice-note pipeline used across scenarios
pub const VOICE_PIPELINE: &str = r#"
models:
  whisper:
    implementation: transcription
    model: whisper-1
  gpt:
    implementation: chat
    model: gpt-4o-mini
steps:
  transcribe:
    model: whisper
    input: inbox/audio
    output:
      classify: inbox/transcripts/{filename}.md
    archive: archive/{stepId}
  classify:
    model: gpt
    input: inbox/transcripts
    output:
      summarize: inbox/meetings/{filename}.md
      journal: journal/{date}
      default: inbox/notes
    archive: archive/{stepId}
    prompts: [prompts/classify.md]
    description: Route transcripts by topic
  summarize:
    model: gpt
    input: inbox/meetings
    output: notes/summaries/{filename}.md
    archive: archive/{stepId}
    description: Meeting recordings that need a summary
  journal:
    model: gpt
    input: inbox/journal
    output: journal/entries
    archive: archive/{stepId}
    description: Personal reflections
"#;

pub fn voice_config() -> PipelineConfiguration {
    PipelineConfiguration::from_yaml(VOICE_PIPELINE).expect("voice pipeline parses")
}

/// Engine over an in-memory vault, plus the pieces tests inspect
pub struct Harness {
    pub engine: Arc<PipelineExecutor>,
    pub store: MemoryFileStore,
    pub whisper: MockModel,
    pub gpt: MockModel,
    pub state: SharedExecutionState,
    pub events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl Harness {
    pub fn new(
        config: PipelineConfiguration,
        store: MemoryFileStore,
        whisper: MockModel,
        gpt: MockModel,
    ) -> Self {
        let models = ModelRegistry::new()
            .with("whisper", Model::Transcription(Arc::new(whisper.clone())))
            .with("gpt", Model::Chat(Arc::new(gpt.clone())));
        let state = ExecutionState::shared();
        let engine = PipelineExecutor::new(config, Arc::new(store.clone()), models, state.clone());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

        Self {
            engine: Arc::new(engine),
            store,
            whisper,
            gpt,
            state,
            events,
        }
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }
}

/// Vault with the standard prompt files
pub fn seeded_store() -> MemoryFileStore {
    let store = MemoryFileStore::new();
    store.insert("prompts/classify.md", "Decide what kind of note this is.");
    store
}

/// A response block in wire format
pub fn block(filename: &str, next_step: Option<&str>, content: &str) -> String {
    let mut out = format!("---\nfilename: {}\n", filename);
    if let Some(next) = next_step {
        out.push_str(&format!("nextStep: {}\n", next));
    }
    out.push_str("---\n");
    out.push_str(content);
    out.push_str("\n\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_model_replays_in_order() {
        let mock = MockModel::new(["first", "second"]);
        assert_eq!(mock.complete("a").await.unwrap(), "first");
        assert_eq!(mock.complete("b").await.unwrap(), "second");
        assert!(mock.complete("c").await.is_err());
        assert_eq!(mock.requests(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_voice_pipeline_is_valid() {
        let result = voxchain::core::validation::validate(&voice_config());
        assert!(result.is_valid, "{}", result.error_summary());
        assert_eq!(result.entry_points, vec!["transcribe".to_string()]);
    }
}
