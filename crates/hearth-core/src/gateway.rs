use std::sync::Arc;

use hearth_provider::{JsonSchemaFormat, LlmMessage, LlmProvider, LlmRequest};
use hearth_schema::{join_segments, Segment, Strategy, Turn};
use serde::Deserialize;
use serde_json::json;

use crate::error::GatewayError;
use crate::prompt::default_system_prompt;

pub const DEFAULT_MODEL: &str = "gpt-4o-2024-08-06";
pub const RESPONSE_SCHEMA_NAME: &str = "therapist_response";

/// A new therapist reply: the segments plus their joined text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub segments: Vec<Segment>,
}

/// The reply document the provider is constrained to produce.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TherapistReply {
    segments: Vec<ReplySegment>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReplySegment {
    text: String,
    strategies: Vec<Strategy>,
}

/// JSON schema for [`TherapistReply`], strict mode compatible.
pub fn response_schema() -> serde_json::Value {
    let labels: Vec<&str> = Strategy::ALL.iter().map(Strategy::as_str).collect();
    json!({
        "type": "object",
        "properties": {
            "segments": {
                "type": "array",
                "description": "The reply broken into meaningful segments, each annotated with the techniques it uses.",
                "items": {
                    "type": "object",
                    "properties": {
                        "text": {
                            "type": "string",
                            "description": "A portion of the reply text"
                        },
                        "strategies": {
                            "type": "array",
                            "description": "Techniques used in this segment",
                            "items": { "type": "string", "enum": labels }
                        }
                    },
                    "required": ["text", "strategies"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["segments"],
        "additionalProperties": false
    })
}

/// Parse a provider reply into segments. The document must match
/// [`response_schema`] exactly and carry at least one segment.
pub fn parse_reply(raw: &str) -> Result<Vec<Segment>, GatewayError> {
    let reply: TherapistReply = serde_json::from_str(raw)
        .map_err(|e| GatewayError::InvalidCompletion(e.to_string()))?;
    if reply.segments.is_empty() {
        return Err(GatewayError::InvalidCompletion(
            "reply contains no segments".to_string(),
        ));
    }
    Ok(reply
        .segments
        .into_iter()
        .map(|segment| Segment {
            text: segment.text,
            strategies: segment.strategies,
        })
        .collect())
}

/// Exchanges conversation state for a new structured therapist reply.
///
/// One attempt per call: no retry and no backoff.
pub struct CompletionGateway {
    provider: Arc<dyn LlmProvider>,
    model: String,
    system_prompt: String,
}

impl CompletionGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: default_system_prompt(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// System instruction, then `prior` in order, then `new_text` last.
    pub fn build_request(&self, prior: &[Turn], new_text: &str) -> LlmRequest {
        let mut messages: Vec<LlmMessage> = prior
            .iter()
            .map(|turn| LlmMessage {
                role: turn.role.as_llm_role().to_string(),
                content: turn.content.clone(),
            })
            .collect();
        messages.push(LlmMessage::user(new_text));

        LlmRequest {
            model: self.model.clone(),
            system: Some(self.system_prompt.clone()),
            messages,
            max_tokens: None,
            response_format: Some(JsonSchemaFormat {
                name: RESPONSE_SCHEMA_NAME.to_string(),
                strict: true,
                schema: response_schema(),
            }),
        }
    }

    pub async fn complete(&self, prior: &[Turn], new_text: &str) -> Result<Completion, GatewayError> {
        let request = self.build_request(prior, new_text);
        let response = self
            .provider
            .chat(request)
            .await
            .map_err(GatewayError::Provider)?;

        let raw = response
            .text
            .filter(|text| !text.trim().is_empty())
            .ok_or(GatewayError::EmptyCompletion)?;
        let segments = parse_reply(&raw)?;

        tracing::debug!(
            segments = segments.len(),
            input_tokens = ?response.input_tokens,
            output_tokens = ?response.output_tokens,
            "completion parsed"
        );

        Ok(Completion {
            content: join_segments(&segments),
            segments,
        })
    }
}
