//! Provider adapters
//!
//! Each LLM backend differs in auth scheme, request-body flags, response
//! envelope shape, and how tool-call arguments are encoded. An adapter
//! hides those differences behind one contract so the client and engine
//! never see provider-specific JSON.

mod ollama;
mod openai;

pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::ProviderKind;
use crate::conversation::{ConversationTurn, ToolCallRef};
use crate::tools::ToolSchema;
use crate::{Error, Result};

/// A provider response normalized across envelope shapes
#[derive(Debug, Clone, Default)]
pub struct CompletionPayload {
    /// Assistant text, absent when the model only requested tools
    pub content: Option<String>,

    /// Tool invocations the model asked for, in the order received
    pub tool_calls: Vec<ToolCallRef>,
}

/// Normalization layer over one provider family's wire format
pub trait ProviderAdapter: Send + Sync {
    /// Full chat endpoint URL for a possibly partial base URL
    fn endpoint(&self, base_url: &str) -> String;

    /// Request headers for this provider
    fn headers(&self, api_key: &str) -> Vec<(&'static str, String)>;

    /// Build the request body.
    ///
    /// With `use_tools` the tool schemas are embedded and no structured
    /// output flag is set (backends reject combining the two); without
    /// it, the provider's JSON-object mode flag is set to bias the model
    /// toward parseable output.
    fn request_body(
        &self,
        model: &str,
        turns: &[ConversationTurn],
        tools: &[ToolSchema],
        use_tools: bool,
    ) -> Value;

    /// Decode a raw response body into the normalized payload
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] with the raw body attached when the
    /// envelope cannot be decoded
    fn parse_response(&self, raw: &str) -> Result<CompletionPayload>;

    /// Re-encode normalized JSON-text arguments the way this provider
    /// expects them when a prior assistant tool call is replayed into
    /// history: a JSON string for the OpenAI family, a decoded object
    /// for Ollama.
    fn format_tool_arguments(&self, arguments: &str) -> Value;
}

/// Select the adapter for a provider kind
#[must_use]
pub fn adapter_for(kind: ProviderKind) -> &'static dyn ProviderAdapter {
    match kind {
        ProviderKind::OpenAi | ProviderKind::Volcengine => &OpenAiAdapter,
        ProviderKind::Ollama => &OllamaAdapter,
    }
}

/// Message decoded from either envelope family
#[derive(Debug, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireToolCall {
    /// Some providers omit the id; one is synthesized per request
    #[serde(default)]
    pub id: Option<String>,
    pub function: WireFunction,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFunction {
    pub name: String,
    /// JSON-encoded string for the OpenAI family, native object for Ollama
    pub arguments: Value,
}

impl WireMessage {
    /// Normalize into a [`CompletionPayload`], synthesizing missing
    /// tool-call ids deterministically within this response.
    pub(crate) fn into_payload(self) -> CompletionPayload {
        let tool_calls = self
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, call)| ToolCallRef {
                id: call.id.unwrap_or_else(|| format!("call_{index}")),
                name: call.function.name,
                arguments: match call.function.arguments {
                    Value::String(text) => text,
                    other => other.to_string(),
                },
            })
            .collect();

        CompletionPayload {
            content: self.content.filter(|c| !c.is_empty()),
            tool_calls,
        }
    }
}

/// Decode error with the raw body logged and attached for diagnosis
pub(crate) fn decode_error(e: &serde_json::Error, raw: &str) -> Error {
    tracing::error!(error = %e, body = %raw, "failed to decode provider response");
    Error::Decode {
        reason: e.to_string(),
        raw: raw.to_string(),
    }
}

/// Map conversation turns to wire messages.
///
/// Shared by both families; only the argument encoding inside replayed
/// assistant tool calls differs, so it is delegated back to the adapter.
pub(crate) fn wire_messages(adapter: &dyn ProviderAdapter, turns: &[ConversationTurn]) -> Value {
    let messages: Vec<Value> = turns
        .iter()
        .map(|turn| {
            let mut message = json!({
                "role": turn.role.as_str(),
                "content": turn.content,
            });
            if !turn.tool_calls.is_empty() {
                message["tool_calls"] = turn
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": adapter.format_tool_arguments(&call.arguments),
                            },
                        })
                    })
                    .collect();
            }
            if let Some(id) = &turn.tool_call_id {
                message["tool_call_id"] = json!(id);
            }
            if let Some(name) = &turn.name {
                message["name"] = json!(name);
            }
            message
        })
        .collect();
    Value::Array(messages)
}

/// Tool schema array in the `function` wrapper both families share
pub(crate) fn wire_tools(tools: &[ToolSchema]) -> Value {
    let entries: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                },
            })
        })
        .collect();
    Value::Array(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_selection_by_family() {
        // Volcengine speaks the OpenAI wire format
        let openai = adapter_for(ProviderKind::OpenAi);
        let volcengine = adapter_for(ProviderKind::Volcengine);
        assert_eq!(
            openai.endpoint("https://x/v1"),
            volcengine.endpoint("https://x/v1")
        );
        let ollama = adapter_for(ProviderKind::Ollama);
        assert_ne!(openai.endpoint("https://x"), ollama.endpoint("https://x"));
    }

    #[test]
    fn payload_drops_empty_content() {
        let message = WireMessage {
            content: Some(String::new()),
            tool_calls: None,
        };
        assert!(message.into_payload().content.is_none());
    }

    #[test]
    fn missing_tool_call_ids_are_synthesized_in_order() {
        let message = WireMessage {
            content: None,
            tool_calls: Some(vec![
                WireToolCall {
                    id: None,
                    function: WireFunction {
                        name: "get_weather".to_string(),
                        arguments: serde_json::json!({"city": "北京"}),
                    },
                },
                WireToolCall {
                    id: None,
                    function: WireFunction {
                        name: "web_search".to_string(),
                        arguments: Value::String(r#"{"query":"rust"}"#.to_string()),
                    },
                },
            ]),
        };
        let payload = message.into_payload();
        assert_eq!(payload.tool_calls[0].id, "call_0");
        assert_eq!(payload.tool_calls[1].id, "call_1");
        // Object arguments are normalized to JSON text, strings pass through
        assert_eq!(payload.tool_calls[0].arguments, r#"{"city":"北京"}"#);
        assert_eq!(payload.tool_calls[1].arguments, r#"{"query":"rust"}"#);
    }
}
