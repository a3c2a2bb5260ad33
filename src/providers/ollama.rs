//! Ollama native adapter (`/api/chat`)

use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    CompletionPayload, ProviderAdapter, WireMessage, decode_error, wire_messages, wire_tools,
};
use crate::conversation::ConversationTurn;
use crate::tools::ToolSchema;
use crate::Result;

/// Adapter for the top-level `message` envelope family
pub struct OllamaAdapter;

/// `/api/chat` response envelope
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: WireMessage,
}

impl ProviderAdapter for OllamaAdapter {
    fn endpoint(&self, base_url: &str) -> String {
        let trimmed = base_url.trim_end_matches('/');
        // Leave URLs alone when the user already chose an API flavor
        if trimmed.contains("/api") || trimmed.contains("/v1") {
            trimmed.to_string()
        } else {
            format!("{trimmed}/api/chat")
        }
    }

    fn headers(&self, api_key: &str) -> Vec<(&'static str, String)> {
        // Ollama itself ignores auth, but fronting proxies may not;
        // a dummy token keeps strict proxies happy.
        let token = if api_key.is_empty() { "ollama" } else { api_key };
        vec![
            ("Authorization", format!("Bearer {token}")),
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
            // `format: "json"` combined with tool definitions makes some
            // models emit the tool call as content; only one of the two
            // may be present.
            body["tools"] = wire_tools(tools);
        } else {
            body["format"] = json!("json");
        }
        body
    }

    fn parse_response(&self, raw: &str) -> Result<CompletionPayload> {
        let envelope: ChatResponse =
            serde_json::from_str(raw).map_err(|e| decode_error(&e, raw))?;
        Ok(envelope.message.into_payload())
    }

    fn format_tool_arguments(&self, arguments: &str) -> Value {
        // Ollama expects a decoded object when history is replayed
        serde_json::from_str(arguments)
            .unwrap_or_else(|_| Value::String(arguments.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ToolCallRef;

    #[test]
    fn endpoint_normalization() {
        let adapter = OllamaAdapter;
        assert_eq!(
            adapter.endpoint("http://localhost:11434/"),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(
            adapter.endpoint("http://localhost:11434/api/chat"),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(
            adapter.endpoint("http://localhost:11434/v1"),
            "http://localhost:11434/v1"
        );
    }

    #[test]
    fn blank_key_becomes_dummy_token() {
        let headers = OllamaAdapter.headers("");
        assert!(headers.contains(&("Authorization", "Bearer ollama".to_string())));
        let headers = OllamaAdapter.headers("real-key");
        assert!(headers.contains(&("Authorization", "Bearer real-key".to_string())));
    }

    #[test]
    fn body_uses_format_json_without_tools() {
        let turns = vec![ConversationTurn::user("hi".to_string())];
        let body = OllamaAdapter.request_body("llama3.1", &turns, &[], false);
        assert_eq!(body["format"], json!("json"));
        assert!(body.get("tools").is_none());
        assert_eq!(body["stream"], json!(false));
    }

    #[test]
    fn body_omits_format_with_tools() {
        let tools = vec![ToolSchema {
            name: "web_search".to_string(),
            description: "search".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let turns = vec![ConversationTurn::user("hi".to_string())];
        let body = OllamaAdapter.request_body("llama3.1", &turns, &tools, true);
        assert!(body.get("format").is_none());
        assert_eq!(body["tools"][0]["function"]["name"], "web_search");
    }

    #[test]
    fn parses_top_level_message_envelope() {
        let raw = r#"{
            "model": "llama3.1",
            "created_at": "2024-05-01T00:00:00Z",
            "message": {"role": "assistant", "content": "{\"reply\":\"在的\",\"emoji_keyword\":\"开心\"}"},
            "done": true
        }"#;
        let payload = OllamaAdapter.parse_response(raw).unwrap();
        assert!(payload.content.unwrap().contains("在的"));
    }

    #[test]
    fn parses_object_encoded_tool_call_and_synthesizes_id() {
        let raw = r#"{
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "get_weather", "arguments": {"city": "北京"}}}]
            },
            "done": true
        }"#;
        let payload = OllamaAdapter.parse_response(raw).unwrap();
        assert!(payload.content.is_none());
        assert_eq!(payload.tool_calls[0].id, "call_0");
        assert_eq!(payload.tool_calls[0].name, "get_weather");
        assert_eq!(payload.tool_calls[0].arguments, r#"{"city":"北京"}"#);
    }

    #[test]
    fn replayed_tool_call_arguments_become_objects() {
        let turns = vec![ConversationTurn::assistant_calls(
            String::new(),
            vec![ToolCallRef {
                id: "call_0".to_string(),
                name: "get_weather".to_string(),
                arguments: r#"{"city":"北京"}"#.to_string(),
            }],
        )];
        let body = OllamaAdapter.request_body("m", &turns, &[], false);
        let arguments = &body["messages"][0]["tool_calls"][0]["function"]["arguments"];
        assert_eq!(*arguments, json!({"city": "北京"}));
    }

    #[test]
    fn argument_formatting_round_trips() {
        // Object style: parse normalizes to text, format restores the object
        let normalized = r#"{"city":"北京"}"#;
        let formatted = OllamaAdapter.format_tool_arguments(normalized);
        assert_eq!(formatted, json!({"city": "北京"}));
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let result = OllamaAdapter.parse_response("not json");
        assert!(matches!(result, Err(crate::Error::Decode { .. })));
    }
}
