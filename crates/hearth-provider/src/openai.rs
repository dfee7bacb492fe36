use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{JsonSchemaFormat, LlmMessage, LlmProvider, LlmRequest, LlmResponse};

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderErrorKind {
    RateLimit,
    ServerError,
    Timeout,
    AuthError,
    InvalidRequest,
    Unknown,
}

impl ProviderErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            429 => Self::RateLimit,
            401 | 403 => Self::AuthError,
            400 | 422 => Self::InvalidRequest,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::AuthError => "auth",
            Self::InvalidRequest => "invalid_request",
            Self::Unknown => "unknown",
        }
    }
}

impl OpenAiProvider {
    /// No client-side timeout: the transport default applies.
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_key, api_base)
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self::with_client(client, api_key, api_base))
    }

    fn with_client(
        client: reqwest::Client,
        api_key: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn to_api_request(request: LlmRequest) -> ApiRequest {
        ApiRequest {
            model: request.model,
            messages: to_api_messages(request.system, request.messages),
            max_tokens: request.max_tokens,
            response_format: request.response_format.map(ApiResponseFormat::json_schema),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let payload = Self::to_api_request(request);
        tracing::debug!(
            model = %payload.model,
            messages = payload.messages.len(),
            "sending chat completion request"
        );

        let resp = match self
            .client
            .post(url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(anyhow!(
                    "openai api error ({}): {e}",
                    ProviderErrorKind::Timeout.as_str()
                ));
            }
            Err(e) if e.is_connect() => {
                return Err(anyhow!("openai api error (connect): {e}"));
            }
            Err(e) => return Err(e.into()),
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await?;
            let parsed = serde_json::from_str::<ApiErrorEnvelope>(&text).ok();
            return Err(format_api_error(status, parsed));
        }

        let body: ApiResponse = resp.json().await?;
        Ok(to_llm_response(body))
    }
}

fn to_api_messages(system: Option<String>, messages: Vec<LlmMessage>) -> Vec<ApiMessage> {
    let mut result = Vec::with_capacity(messages.len() + 1);

    if let Some(system_text) = system {
        result.push(ApiMessage {
            role: "system".to_string(),
            content: system_text,
        });
    }

    result.extend(messages.into_iter().map(|message| ApiMessage {
        role: message.role,
        content: message.content,
    }));

    result
}

fn to_llm_response(body: ApiResponse) -> LlmResponse {
    let choice = body.choices.into_iter().next();
    let finish_reason = choice.as_ref().and_then(|c| c.finish_reason.clone());
    let text = choice
        .and_then(|c| c.message.content)
        .filter(|text| !text.is_empty());

    LlmResponse {
        text,
        input_tokens: body.usage.as_ref().map(|u| u.prompt_tokens),
        output_tokens: body.usage.as_ref().map(|u| u.completion_tokens),
        stop_reason: normalize_finish_reason(finish_reason),
    }
}

fn normalize_finish_reason(reason: Option<String>) -> Option<String> {
    match reason.as_deref() {
        Some("stop") => Some("end_turn".to_string()),
        Some("length") => Some("max_tokens".to_string()),
        _ => reason,
    }
}

fn format_api_error(status: StatusCode, parsed: Option<ApiErrorEnvelope>) -> anyhow::Error {
    let kind = ProviderErrorKind::from_status(status);
    if let Some(api_error) = parsed {
        anyhow!(
            "openai api error ({status}, {}): {} ({})",
            kind.as_str(),
            api_error.error.message,
            api_error.error.r#type.unwrap_or_default()
        )
    } else {
        anyhow!("openai api error ({status}, {})", kind.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ApiResponseFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub json_schema: JsonSchemaFormat,
}

impl ApiResponseFormat {
    fn json_schema(format: JsonSchemaFormat) -> Self {
        Self {
            format_type: "json_schema".to_string(),
            json_schema: format,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiResponse {
    #[serde(default)]
    pub choices: Vec<ApiChoice>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiChoice {
    pub message: ApiAssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiAssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(rename = "type", default)]
    pub r#type: Option<String>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reply_format() -> JsonSchemaFormat {
        JsonSchemaFormat {
            name: "therapist_response".into(),
            strict: true,
            schema: serde_json::json!({"type": "object"}),
        }
    }

    fn hello() -> LlmRequest {
        LlmRequest {
            model: "gpt-4o".into(),
            system: None,
            messages: vec![LlmMessage::user("hi")],
            max_tokens: None,
            response_format: None,
        }
    }

    #[test]
    fn to_api_request_puts_system_first_and_keeps_order() {
        let req = LlmRequest {
            model: "gpt-4o".into(),
            system: Some("be kind".into()),
            messages: vec![
                LlmMessage::user("one"),
                LlmMessage::assistant("two"),
                LlmMessage::user("three"),
            ],
            max_tokens: None,
            response_format: Some(reply_format()),
        };

        let payload = OpenAiProvider::to_api_request(req);
        let roles: Vec<&str> = payload.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(payload.messages[0].content, "be kind");
        assert_eq!(payload.messages[3].content, "three");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(
            json["response_format"]["json_schema"]["name"],
            "therapist_response"
        );
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn to_llm_response_treats_empty_content_as_none() {
        let body: ApiResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": ""}, "finish_reason": "stop"}]
        }))
        .unwrap();
        let resp = to_llm_response(body);
        assert!(resp.text.is_none());
        assert_eq!(resp.stop_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn to_llm_response_without_choices() {
        let body: ApiResponse = serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        let resp = to_llm_response(body);
        assert!(resp.text.is_none());
        assert!(resp.stop_reason.is_none());
    }

    #[test]
    fn error_kind_from_status() {
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::TOO_MANY_REQUESTS),
            ProviderErrorKind::RateLimit
        );
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::UNAUTHORIZED),
            ProviderErrorKind::AuthError
        );
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::BAD_GATEWAY),
            ProviderErrorKind::ServerError
        );
    }

    #[test]
    fn api_base_trailing_slash_trimmed() {
        let provider = OpenAiProvider::new("key", "https://api.example.com/v1/");
        assert_eq!(provider.api_base, "https://api.example.com/v1");
    }

    #[tokio::test]
    async fn chat_sends_bearer_and_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"segments\":[]}"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("test-key", server.uri());
        let resp = provider
            .chat(hello())
            .await
            .unwrap();

        assert_eq!(resp.text.as_deref(), Some("{\"segments\":[]}"));
        assert_eq!(resp.input_tokens, Some(10));
        assert_eq!(resp.output_tokens, Some(5));
    }

    #[tokio::test]
    async fn chat_maps_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"type": "rate_limit_exceeded", "message": "slow down"}
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("test-key", server.uri());
        let err = provider
            .chat(hello())
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("429"));
        assert!(err.contains("rate_limit"));
        assert!(err.contains("slow down"));
    }

    #[tokio::test]
    async fn configured_timeout_is_reported_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"choices": []}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let provider =
            OpenAiProvider::with_timeout("test-key", server.uri(), Duration::from_millis(100))
                .unwrap();
        let err = provider.chat(hello()).await.unwrap_err().to_string();
        assert!(err.starts_with("openai api error (timeout)"), "{err}");
    }
}
