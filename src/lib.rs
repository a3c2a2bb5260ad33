//! Murmur - iMessage auto-reply bridge for conversational AI providers
//!
//! Murmur watches the local Messages store for new inbound messages
//! carrying a trigger prefix, builds a bounded conversation, asks a
//! configurable LLM backend for a structured reply (with one round of
//! tool calling), and sends the reply back in human-paced segments —
//! aborting if new input arrives mid-reply.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  PollingEngine                   │
//! │   cursor  │  poll loop  │  per-sender reply task │
//! └──────┬─────────────────────────────┬─────────────┘
//!        │                             │
//! ┌──────▼──────┐               ┌──────▼─────────────┐
//! │ MessageStore │               │     LlmClient      │
//! │  (chat.db)   │               │ adapter + tool loop│
//! └──────────────┘               └──────┬─────────────┘
//!                                       │
//!                          ┌────────────▼───────────┐
//!                          │ OpenAI-family │ Ollama │
//!                          └────────────────────────┘
//! ```

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod llm;
pub mod providers;
pub mod reaction;
pub mod segment;
pub mod sink;
pub mod store;
pub mod tools;

pub use config::{Config, ProviderConfig, ProviderKind, ReactionConfig};
pub use conversation::{ConversationTurn, Role, ToolCallRef};
pub use engine::Engine;
pub use error::{Error, Result};
pub use llm::{LlmClient, Reply, ReplyGenerator};
pub use reaction::ReactionFetcher;
pub use segment::split_segments;
pub use sink::{MessageSink, OsaScriptSink};
pub use store::{ChatDb, HistoryEntry, LatestMessage, MessageStore};
pub use tools::{ToolHandler, ToolRegistry, ToolSchema};
