//! Chat-completion provider abstraction.
//!
//! Defines the wire-level message types, the [`Generator`] capability
//! trait, and the OpenAI-compatible implementation over
//! `POST {base_url}/chat/completions`. The model may answer with text or
//! request one of the offered tools; the orchestrator drives that loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::provider::{api_key, http_client, post_json_with_retry, ProviderError};

/// One message in the chat transcript sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    /// Result of a tool execution, echoed back to the provider.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// A model-initiated request to invoke a named tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments as produced by the model.
    pub arguments: String,
}

/// A tool offered to the model, in OpenAI function-calling shape.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Provider output for one completion call: final text, tool requests, or
/// both.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Capability seam for text generation. Substitutable in tests with a
/// scripted stub.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier used for this generator.
    fn model(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<Completion, ProviderError>;
}

/// Chat provider backed by an OpenAI-compatible completions endpoint.
pub struct OpenAIGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &ModelConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key: api_key()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.id.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<Completion, ProviderError> {
        let wire_messages: Vec<serde_json::Value> = messages.iter().map(message_to_wire).collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": wire_messages,
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::Value::Array(tools.iter().map(|t| t.to_wire()).collect());
        }

        let url = format!("{}/chat/completions", self.base_url);
        let json =
            post_json_with_retry(&self.client, &url, &self.api_key, &body, self.max_retries)
                .await?;

        parse_completion_response(&json)
    }
}

fn message_to_wire(message: &ChatMessage) -> serde_json::Value {
    let mut wire = serde_json::json!({ "role": message.role });

    if let Some(content) = &message.content {
        wire["content"] = serde_json::Value::String(content.clone());
    }
    if let Some(id) = &message.tool_call_id {
        wire["tool_call_id"] = serde_json::Value::String(id.clone());
    }
    if !message.tool_calls.is_empty() {
        let calls: Vec<serde_json::Value> = message
            .tool_calls
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "type": "function",
                    "function": { "name": c.name, "arguments": c.arguments },
                })
            })
            .collect();
        wire["tool_calls"] = serde_json::Value::Array(calls);
    }

    wire
}

/// Extract `choices[0].message` into a [`Completion`].
fn parse_completion_response(json: &serde_json::Value) -> Result<Completion, ProviderError> {
    let message = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| ProviderError::InvalidResponse("missing choices[0].message".to_string()))?;

    let text = message
        .get("content")
        .and_then(|c| c.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(|t| t.as_array()) {
        for call in calls {
            let id = call
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ProviderError::InvalidResponse("tool call without id".to_string()))?;
            let function = call.get("function").ok_or_else(|| {
                ProviderError::InvalidResponse("tool call without function".to_string())
            })?;
            let name = function.get("name").and_then(|v| v.as_str()).ok_or_else(|| {
                ProviderError::InvalidResponse("tool call without name".to_string())
            })?;
            let arguments = function
                .get("arguments")
                .and_then(|v| v.as_str())
                .unwrap_or("{}");

            tool_calls.push(ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            });
        }
    }

    Ok(Completion { text, tool_calls })
}
