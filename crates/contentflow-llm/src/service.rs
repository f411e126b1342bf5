use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use contentflow_types::ContentflowError;

use crate::{FinishReason, LlmClient, Message, Request, ResponseFormat};

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

/// The JSON schema a caller wants the output constrained to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseShape {
    pub name: String,
    pub schema: serde_json::Value,
}

impl ResponseShape {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub response_shape: Option<ResponseShape>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            response_shape: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_shape(mut self, shape: ResponseShape) -> Self {
        self.response_shape = Some(shape);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// What a generation call produced: free text, or an already-decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    Text(String),
    Structured(serde_json::Value),
}

impl Generated {
    pub fn as_text(&self) -> String {
        match self {
            Generated::Text(t) => t.clone(),
            Generated::Structured(v) => v.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationService
// ---------------------------------------------------------------------------

/// The single call pipeline stages make to a language model.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Generated, ContentflowError>;
}

// ---------------------------------------------------------------------------
// ClientService
// ---------------------------------------------------------------------------

/// `GenerationService` backed by an `LlmClient`.
pub struct ClientService {
    client: LlmClient,
    model: String,
    provider: Option<String>,
}

impl ClientService {
    pub fn new(client: LlmClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: GenerationRequest) -> Request {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(request.prompt));

        Request {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.response_shape.map(|s| ResponseFormat {
                name: s.name,
                schema: s.schema,
            }),
            provider: self.provider.clone(),
        }
    }
}

#[async_trait]
impl GenerationService for ClientService {
    async fn generate(&self, request: GenerationRequest) -> Result<Generated, ContentflowError> {
        let structured = request.response_shape.is_some();
        let req = self.build_request(request);
        let resp = self.client.complete(&req).await?;

        match resp.finish_reason {
            FinishReason::ContentFilter => {
                return Err(ContentflowError::GenerationServiceError {
                    provider: self.provider.clone().unwrap_or_else(|| "default".into()),
                    status: 200,
                    message: "output blocked by content filter".into(),
                    retryable: false,
                });
            }
            FinishReason::MaxTokens => {
                tracing::warn!(model = %resp.model, "generation hit the token limit");
            }
            FinishReason::EndTurn => {}
        }

        // Structured replies that decode cleanly skip the text path entirely
        if structured {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(resp.text.trim()) {
                if value.is_object() {
                    return Ok(Generated::Structured(value));
                }
            }
        }
        Ok(Generated::Text(resp.text))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
