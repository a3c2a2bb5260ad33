//! Callable tools exposed to the model
//!
//! Tools run only inside an already-isolated reply task, so a slow
//! network-bound handler never blocks the polling loop. Failures here
//! are conversation content, not faults: the model is told what went
//! wrong and keeps going.

pub mod builtin;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

pub use builtin::{QueryBackend, UnconfiguredBackend, WeatherTool, WebSearchTool};

/// Declaration of one callable tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,

    /// JSON-schema description of the arguments object
    pub parameters: Value,
}

/// A named capability the model may invoke.
///
/// Handlers must never panic; any internal fault has to come back as
/// result text so the conversation can continue.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Declaration embedded into requests
    fn schema(&self) -> ToolSchema;

    /// Execute with decoded arguments, returning result text
    async fn call(&self, args: &Map<String, Value>) -> String;
}

/// Registry of available tools; dispatches calls by name
#[derive(Default)]
pub struct ToolRegistry {
    handlers: Vec<Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    pub fn register(&mut self, handler: Box<dyn ToolHandler>) {
        self.handlers.push(handler);
    }

    /// Whether any tools are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Schemas of every registered tool
    #[must_use]
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.handlers.iter().map(|h| h.schema()).collect()
    }

    /// Dispatch a named call with JSON-text arguments.
    ///
    /// An unknown name or undecodable arguments yield a textual error
    /// result rather than a fault, so the model sees what happened and
    /// the request pipeline keeps going.
    pub async fn execute(&self, name: &str, arguments: &str) -> String {
        let Some(handler) = self
            .handlers
            .iter()
            .find(|h| h.schema().name == name)
        else {
            tracing::warn!(tool = name, "model requested unknown tool");
            return format!("unknown tool: {name}");
        };

        let args = match serde_json::from_str::<Value>(arguments) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                tracing::warn!(tool = name, "tool arguments were not an object");
                return format!("tool arguments must be a JSON object, got: {other}");
            }
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "undecodable tool arguments");
                return format!("tool arguments were not valid JSON: {e}");
            }
        };

        tracing::debug!(tool = name, "executing tool");
        handler.call(&args).await
    }
}
