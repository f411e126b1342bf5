use async_trait::async_trait;
use serde_json::json;

use crate::{FinishReason, Message, ProviderAdapter, Request, Response, Role, Usage};
use contentflow_types::ContentflowError;

// ---------------------------------------------------------------------------
// OpenAiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct OpenAiAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_string(),
            default_model: "gpt-5-mini".to_string(),
        }
    }

    /// Build from `OPENAI_API_KEY`, honouring `OPENAI_BASE_URL` when set.
    pub fn from_env() -> Result<Self, ContentflowError> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| ContentflowError::AuthError {
            provider: "openai".into(),
        })?;
        let adapter = Self::new(key);
        Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => adapter.with_base_url(url),
            _ => adapter,
        })
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn build_request_body(&self, request: &Request) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request.messages.iter().map(convert_message).collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_completion_tokens"] = json!(max_tokens);
        }

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        if let Some(ref format) = request.response_format {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": format.name,
                    "schema": format.schema,
                    "strict": true,
                }
            });
        }

        body
    }

    fn parse_response(&self, body: serde_json::Value) -> Result<Response, ContentflowError> {
        let id = body["id"].as_str().unwrap_or("").to_string();
        let model = body["model"].as_str().unwrap_or("").to_string();

        let choice = &body["choices"][0];
        if choice.is_null() {
            return Err(ContentflowError::GenerationServiceError {
                provider: "openai".into(),
                status: 200,
                message: "response contained no choices".into(),
                retryable: true,
            });
        }

        let finish_reason = match choice["finish_reason"].as_str() {
            Some("length") => FinishReason::MaxTokens,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::EndTurn,
        };

        // A refusal arrives in its own field with null content
        let text = choice["message"]["content"]
            .as_str()
            .or_else(|| choice["message"]["refusal"].as_str())
            .unwrap_or("")
            .to_string();

        let usage_obj = &body["usage"];
        let input_tokens = usage_obj["prompt_tokens"].as_u64().unwrap_or(0);
        let output_tokens = usage_obj["completion_tokens"].as_u64().unwrap_or(0);
        let usage = Usage {
            input_tokens,
            output_tokens,
            total_tokens: usage_obj["total_tokens"]
                .as_u64()
                .unwrap_or(input_tokens + output_tokens),
        };

        Ok(Response {
            id,
            text,
            usage,
            model,
            finish_reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Message conversion
// ---------------------------------------------------------------------------

fn convert_message(msg: &Message) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    json!({
        "role": role,
        "content": msg.content,
    })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: reqwest::StatusCode, body: &str) -> ContentflowError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => {
            let retry_ms = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v["error"]["retry_after"].as_f64())
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            ContentflowError::RateLimited {
                provider: "openai".into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => ContentflowError::AuthError {
            provider: "openai".into(),
        },
        500 | 502 | 503 | 504 => ContentflowError::GenerationServiceError {
            provider: "openai".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => ContentflowError::GenerationServiceError {
            provider: "openai".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn map_transport_error(e: reqwest::Error) -> ContentflowError {
    if e.is_timeout() {
        return ContentflowError::RequestTimeout {
            provider: "openai".into(),
            timeout_ms: 0,
        };
    }
    ContentflowError::GenerationServiceError {
        provider: "openai".into(),
        status: 0,
        message: e.to_string(),
        retryable: true,
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, ContentflowError> {
        let body = self.build_request_body(request);

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = resp.status();
        let response_body = resp.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value = serde_json::from_str(&response_body).map_err(|e| {
            ContentflowError::GenerationServiceError {
                provider: "openai".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
                retryable: false,
            }
        })?;

        self.parse_response(json)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn supports_structured_output(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResponseFormat;

    fn make_basic_request() -> Request {
        Request {
            model: "gpt-5-mini".into(),
            messages: vec![Message::system("You are helpful."), Message::user("Hello")],
            max_tokens: Some(4096),
            temperature: Some(0.7),
            response_format: None,
            provider: Some("openai".into()),
        }
    }

    // from_env reads process-wide state, so both branches live in one test.
    #[test]
    fn from_env_with_key_returns_ok_and_without_key_returns_err() {
        std::env::set_var("OPENAI_API_KEY", "test-key-12345");
        std::env::remove_var("OPENAI_BASE_URL");
        let adapter = OpenAiAdapter::from_env().unwrap();
        assert_eq!(adapter.name(), "openai");
        assert_eq!(adapter.default_model(), "gpt-5-mini");
        assert_eq!(adapter.base_url, "https://api.openai.com");

        std::env::remove_var("OPENAI_API_KEY");
        let err = OpenAiAdapter::from_env().unwrap_err();
        assert!(matches!(err, ContentflowError::AuthError { provider } if provider == "openai"));
    }

    #[test]
    fn build_request_body_produces_chat_structure() {
        let adapter = OpenAiAdapter::new("test-key".into());
        let body = adapter.build_request_body(&make_basic_request());

        assert_eq!(body["model"], "gpt-5-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert_eq!(body["max_completion_tokens"], 4096);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn build_request_body_includes_json_schema() {
        let adapter = OpenAiAdapter::new("test-key".into());
        let mut req = make_basic_request();
        req.response_format = Some(ResponseFormat {
            name: "score".into(),
            schema: json!({"type": "object"}),
        });
        let body = adapter.build_request_body(&req);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "score");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
    }

    #[test]
    fn parse_response_extracts_text_and_usage() {
        let adapter = OpenAiAdapter::new("k".into());
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-5-mini",
            "choices": [{
                "message": {"role": "assistant", "content": "{\"value\": 9, \"reason\": \"good\"}"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
        });
        let resp = adapter.parse_response(body).unwrap();
        assert_eq!(resp.id, "chatcmpl-1");
        assert!(resp.text.contains("\"value\": 9"));
        assert_eq!(resp.usage.total_tokens, 20);
        assert_eq!(resp.finish_reason, FinishReason::EndTurn);
    }

    #[test]
    fn parse_response_maps_length_finish() {
        let adapter = OpenAiAdapter::new("k".into());
        let body = json!({
            "choices": [{"message": {"content": "partial"}, "finish_reason": "length"}]
        });
        let resp = adapter.parse_response(body).unwrap();
        assert_eq!(resp.finish_reason, FinishReason::MaxTokens);
    }

    #[test]
    fn parse_response_without_choices_is_retryable() {
        let adapter = OpenAiAdapter::new("k".into());
        let err = adapter.parse_response(json!({"choices": []})).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn map_error_classifies_status_codes() {
        let rate = map_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error": {"retry_after": 2.5}}"#,
        );
        assert!(matches!(rate, ContentflowError::RateLimited { retry_after_ms: 2500, .. }));

        let auth = map_error(reqwest::StatusCode::UNAUTHORIZED, "");
        assert!(matches!(auth, ContentflowError::AuthError { .. }));

        let unavailable = map_error(reqwest::StatusCode::SERVICE_UNAVAILABLE, "down");
        assert!(unavailable.is_retryable());

        let bad = map_error(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error": {"message": "schema invalid"}}"#,
        );
        assert!(!bad.is_retryable());
        assert!(bad.to_string().contains("schema invalid"));
    }
}
