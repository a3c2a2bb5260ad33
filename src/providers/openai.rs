//! OpenAI-compatible adapter (OpenAI, Volcengine Ark)

use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    CompletionPayload, ProviderAdapter, WireMessage, decode_error, wire_messages, wire_tools,
};
use crate::conversation::ConversationTurn;
use crate::tools::ToolSchema;
use crate::Result;

/// Adapter for the `choices[0].message` envelope family
pub struct OpenAiAdapter;

/// `/chat/completions` response envelope
#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

impl ProviderAdapter for OpenAiAdapter {
    fn endpoint(&self, base_url: &str) -> String {
        // Users paste base URLs with and without the endpoint path
        let trimmed = base_url.trim_end_matches('/');
        if trimmed.ends_with("/chat/completions") {
            trimmed.to_string()
        } else {
            format!("{trimmed}/chat/completions")
        }
    }

    fn headers(&self, api_key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("Authorization", format!("Bearer {api_key}")),
            ("Content-Type", "application/json".to_string()),
        ]
    }

    fn request_body(
        &self,
        model: &str,
        turns: &[ConversationTurn],
        tools: &[ToolSchema],
        use_tools: bool,
    ) -> Value {
        let mut body = json!({
            "model": model,
            "messages": wire_messages(self, turns),
            "stream": false,
        });
        if use_tools {
            body["tools"] = wire_tools(tools);
        } else {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }

    fn parse_response(&self, raw: &str) -> Result<CompletionPayload> {
        let envelope: ChatCompletion =
            serde_json::from_str(raw).map_err(|e| decode_error(&e, raw))?;
        Ok(envelope
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.into_payload())
            .unwrap_or_default())
    }

    fn format_tool_arguments(&self, arguments: &str) -> Value {
        // This family expects arguments as a JSON-encoded string
        Value::String(arguments.to_string())
    }
}
