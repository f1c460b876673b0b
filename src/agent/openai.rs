//! OpenAI-compatible REST client
//!
//! Transcription goes to `/audio/transcriptions` as multipart form data,
//! chat goes to `/chat/completions` with the whole protocol request as a
//! single user message.

use crate::agent::client::{with_retry, ClientConfig, RetryPolicy};
use crate::agent::{AgentError, ModelClient, TranscriptionOptions};
use crate::core::model::ModelConfig;
use async_trait::async_trait;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// REST client for one configured model
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    organization: Option<String>,
    model: String,
    timeout_secs: u64,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiClient {
    pub fn new(model: &ModelConfig, config: &ClientConfig) -> Result<Self, AgentError> {
        let api_key = model.resolve_api_key().ok_or_else(|| {
            AgentError::Config(format!(
                "No API key for model '{}' (set api_key or api_key_env)",
                model.model
            ))
        })?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: model.base_url.trim_end_matches('/').to_string(),
            api_key,
            organization: model.organization.clone().filter(|o| !o.is_empty()),
            model: model.model.clone(),
            timeout_secs: config.timeout.as_secs(),
            retry: config.retry,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.bearer_auth(&self.api_key);
        match &self.organization {
            Some(org) => request.header("OpenAI-Organization", org),
            None => request,
        }
    }

    fn map_transport(&self, error: reqwest::Error) -> AgentError {
        if error.is_timeout() {
            AgentError::Timeout(self.timeout_secs)
        } else {
            AgentError::Network(error.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AgentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AgentError::from_status(status.as_u16(), body))
    }

    async fn transcribe_once(
        &self,
        audio: &[u8],
        filename: &str,
        options: &TranscriptionOptions,
    ) -> Result<String, AgentError> {
        let part = multipart::Part::bytes(audio.to_vec())
            .file_name(filename.to_string())
            .mime_str(mime_for(filename))
            .map_err(|e| AgentError::InvalidRequest(format!("Failed to create multipart: {}", e)))?;
        let mut form = multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(prompt) = options.prompt.as_ref().filter(|p| !p.trim().is_empty()) {
            form = form.text("prompt", prompt.clone());
        }
        if let Some(language) = &options.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .authorize(self.http.post(self.endpoint("audio/transcriptions")))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        let parsed: TranscriptionResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;
        Ok(parsed.text)
    }

    async fn complete_once(&self, request: &str) -> Result<String, AgentError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: request,
            }],
        };
        let response = self
            .authorize(self.http.post(self.endpoint("chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        let parsed: ChatResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AgentError::InvalidResponse("No completion choices returned".to_string())
            })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn transcribe(
        &self,
        audio: &[u8],
        filename: &str,
        options: &TranscriptionOptions,
    ) -> Result<String, AgentError> {
        debug!("Transcribing {} ({} bytes) with {}", filename, audio.len(), self.model);
        with_retry(&self.retry, "transcribe", || {
            self.transcribe_once(audio, filename, options)
        })
        .await
    }

    async fn complete(&self, request: &str) -> Result<String, AgentError> {
        debug!("Sending {} byte request to {}", request.len(), self.model);
        with_retry(&self.retry, "complete", || self.complete_once(request)).await
    }
}

fn mime_for(filename: &str) -> &'static str {
    match crate::core::path::extension(filename)
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp3") | Some("mpeg") | Some("mpga") => "audio/mpeg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("wav") => "audio/wav",
        Some("webm") => "audio/webm",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}
