//! LLM client and tool-calling orchestration
//!
//! One request is a small state machine: the initial call goes out with
//! tool schemas attached; if the model asks for tools, each call is
//! executed in the order received and the augmented conversation is sent
//! again with tools disabled. The depth cap of one round is structural —
//! the follow-up request carries no tool schemas, so there is nothing
//! for the model to call recursively.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::conversation::{ConversationTurn, ToolCallRef};
use crate::providers::{ProviderAdapter, adapter_for};
use crate::tools::ToolRegistry;
use crate::{Error, Result};

/// Local-model backends can take minutes on long prompts; with no retry
/// policy, this timeout is the only bound on a request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// The structured payload every successful model call must yield
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reply {
    /// Message text to send back
    #[serde(rename = "reply")]
    pub text: String,

    /// Keyword for the optional reaction image; empty when nothing fits
    pub emoji_keyword: String,
}

/// Anything that can turn a conversation into a [`Reply`].
///
/// The engine depends on this seam instead of the concrete client, so
/// tests can drive the polling logic without a live provider.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Produce the reply for one built conversation
    async fn generate(&self, turns: Vec<ConversationTurn>) -> Result<Reply>;
}

/// Request state; each request walks this machine exactly once
enum TurnState {
    /// Send the conversation; `use_tools` only on the initial request
    Request { use_tools: bool },
    /// Execute requested tools and append their result turns
    ExecuteTools {
        content: Option<String>,
        calls: Vec<ToolCallRef>,
    },
    /// Terminal: structured reply decoded
    Done(Reply),
}

/// Chat-completion client over the configured provider adapter
pub struct LlmClient {
    http: reqwest::Client,
    provider: ProviderConfig,
    tools: Arc<ToolRegistry>,
}

impl LlmClient {
    /// Create a client for `provider` with the given tool registry
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed
    pub fn new(provider: ProviderConfig, tools: Arc<ToolRegistry>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, provider, tools })
    }

    /// Run one full request cycle and return the structured reply
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`], [`Error::Decode`], or [`Error::Parse`]
    /// as described in the respective layers; tool execution failures
    /// are conversation content and never surface here.
    pub async fn complete(&self, mut turns: Vec<ConversationTurn>) -> Result<Reply> {
        let adapter = adapter_for(self.provider.kind);
        let schemas = self.tools.schemas();

        let mut state = TurnState::Request {
            use_tools: !schemas.is_empty(),
        };

        loop {
            state = match state {
                TurnState::Request { use_tools } => {
                    let payload = self
                        .dispatch(adapter, &turns, use_tools)
                        .await?;
                    if use_tools && !payload.tool_calls.is_empty() {
                        TurnState::ExecuteTools {
                            content: payload.content,
                            calls: payload.tool_calls,
                        }
                    } else {
                        let content = payload.content.ok_or_else(|| Error::Decode {
                            reason: "response carried no content".to_string(),
                            raw: String::new(),
                        })?;
                        TurnState::Done(parse_reply(&content)?)
                    }
                }
                TurnState::ExecuteTools { content, calls } => {
                    tracing::info!(count = calls.len(), "model requested tools");
                    turns.push(ConversationTurn::assistant_calls(
                        content.unwrap_or_default(),
                        calls.clone(),
                    ));
                    // Execution order matters: side effects happen in the
                    // order the model asked, and result turns line up
                    // with their call ids.
                    for call in &calls {
                        let result = self.tools.execute(&call.name, &call.arguments).await;
                        tracing::debug!(tool = %call.name, id = %call.id, "tool finished");
                        turns.push(ConversationTurn::tool(&call.id, &call.name, result));
                    }
                    TurnState::Request { use_tools: false }
                }
                TurnState::Done(reply) => return Ok(reply),
            };
        }
    }

    async fn dispatch(
        &self,
        adapter: &dyn ProviderAdapter,
        turns: &[ConversationTurn],
        use_tools: bool,
    ) -> Result<crate::providers::CompletionPayload> {
        let url = adapter.endpoint(&self.provider.base_url);
        let schemas = self.tools.schemas();
        let body = adapter.request_body(&self.provider.model, turns, &schemas, use_tools);

        tracing::debug!(url = %url, use_tools, "requesting completion");
        let mut request = self.http.post(&url).json(&body);
        for (name, value) in adapter.headers(&self.provider.api_key) {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        let raw = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %raw, "provider request failed");
            return Err(Error::Http {
                status: status.as_u16(),
                body: raw,
            });
        }

        adapter.parse_response(&raw)
    }
}

#[async_trait]
impl ReplyGenerator for LlmClient {
    async fn generate(&self, turns: Vec<ConversationTurn>) -> Result<Reply> {
        self.complete(turns).await
    }
}

/// Strip a leading/trailing markdown code fence from model content.
///
/// Models in JSON mode still sometimes wrap their output in a fenced
/// `json` block; the payload inside is what we want.
#[must_use]
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence's language tag line ("json", possibly empty)
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim()
}

/// Decode model content into the structured [`Reply`].
///
/// # Errors
///
/// Returns [`Error::Parse`] with the offending content attached when the
/// JSON does not match the expected two-field shape.
pub fn parse_reply(content: &str) -> Result<Reply> {
    let cleaned = strip_code_fence(content);
    serde_json::from_str(cleaned).map_err(|e| {
        tracing::error!(error = %e, content = %content, "reply was not structured JSON");
        Error::Parse {
            reason: e.to_string(),
            raw: content.to_string(),
        }
    })
}
