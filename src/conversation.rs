//! Conversation assembly for the chat completion protocol

use chrono::{DateTime, Local};

use crate::store::HistoryEntry;

/// Chat role of one conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Wire-format role name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model.
///
/// Created while decoding a provider response, consumed within the same
/// request cycle to execute the tool and append its result turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRef {
    /// Call id; synthesized when the provider omits one
    pub id: String,

    /// Tool name
    pub name: String,

    /// Arguments as JSON text, regardless of how the provider encoded them
    pub arguments: String,
}

/// One request-scoped message; built fresh per request, never persisted
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,

    /// Tool invocations carried by an assistant turn
    pub tool_calls: Vec<ToolCallRef>,

    /// Which call a tool-result turn answers
    pub tool_call_id: Option<String>,

    /// Tool name on a tool-result turn
    pub name: Option<String>,
}

impl ConversationTurn {
    /// Create a `system` turn
    #[must_use]
    pub const fn system(content: String) -> Self {
        Self::plain(Role::System, content)
    }

    /// Create a `user` turn
    #[must_use]
    pub const fn user(content: String) -> Self {
        Self::plain(Role::User, content)
    }

    /// Create an `assistant` turn
    #[must_use]
    pub const fn assistant(content: String) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Create an `assistant` turn replaying the model's tool-call request
    #[must_use]
    pub const fn assistant_calls(content: String, tool_calls: Vec<ToolCallRef>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    /// Create a `tool` result turn answering `call_id`
    #[must_use]
    pub fn tool(call_id: &str, name: &str, content: String) -> Self {
        Self {
            role: Role::Tool,
            content,
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.to_string()),
            name: Some(name.to_string()),
        }
    }

    const fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }
}

/// Build the ordered message list for one request.
///
/// One system turn (persona plus wall-clock time, so the model has
/// temporal grounding), then the bounded history oldest-first with the
/// local account's messages as `assistant`, then the new input as the
/// final `user` turn. History must already be bounded by the caller.
#[must_use]
pub fn build(
    history: &[HistoryEntry],
    input: &str,
    system_prompt: &str,
    now: DateTime<Local>,
) -> Vec<ConversationTurn> {
    let mut turns = Vec::with_capacity(history.len() + 2);
    turns.push(ConversationTurn::system(format!(
        "{system_prompt}\n\nCurrent time: {}",
        now.format("%Y-%m-%d %H:%M:%S")
    )));

    for entry in history {
        let turn = if entry.is_from_me {
            ConversationTurn::assistant(entry.text.clone())
        } else {
            ConversationTurn::user(entry.text.clone())
        };
        turns.push(turn);
    }

    turns.push(ConversationTurn::user(input.to_string()));
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn build_orders_system_history_input() {
        let history = vec![
            HistoryEntry { text: "hey".to_string(), is_from_me: false },
            HistoryEntry { text: "hi there".to_string(), is_from_me: true },
        ];
        let turns = build(&history, "how are you", "persona", fixed_now());

        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[1].role, Role::User);
        assert_eq!(turns[1].content, "hey");
        assert_eq!(turns[2].role, Role::Assistant);
        assert_eq!(turns[2].content, "hi there");
        assert_eq!(turns[3].role, Role::User);
        assert_eq!(turns[3].content, "how are you");
    }

    #[test]
    fn system_turn_carries_wall_clock() {
        let turns = build(&[], "ping", "persona", fixed_now());
        assert!(turns[0].content.starts_with("persona"));
        assert!(turns[0].content.contains("2024-05-01 12:30:00"));
    }

    #[test]
    fn empty_history_yields_two_turns() {
        let turns = build(&[], "ping", "p", fixed_now());
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "ping");
    }
}
