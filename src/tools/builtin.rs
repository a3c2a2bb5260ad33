//! Built-in tool declarations
//!
//! The schemas live here; the actual weather and search services are
//! external collaborators reached through [`QueryBackend`]. The binary
//! wires whatever backends it has — an unconfigured backend degrades to
//! a textual explanation the model can relay.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{ToolHandler, ToolSchema};

/// Opaque async backend answering one kind of query
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Run the query, returning result text. Must not panic; faults come
    /// back as text.
    async fn query(&self, input: &str) -> String;
}

/// Backend placeholder used when no real service is configured
pub struct UnconfiguredBackend(pub &'static str);

#[async_trait]
impl QueryBackend for UnconfiguredBackend {
    async fn query(&self, _input: &str) -> String {
        format!("the {} backend is not configured", self.0)
    }
}

#[derive(Deserialize)]
struct WeatherArgs {
    city: String,
}

/// Current weather lookup for a named city
pub struct WeatherTool {
    backend: Arc<dyn QueryBackend>,
}

impl WeatherTool {
    #[must_use]
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for WeatherTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_weather".to_string(),
            description: "Look up current weather for a city. Use when the user asks \
about weather, temperature, or rain."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "city": {
                        "type": "string",
                        "description": "City name, e.g. Beijing, Shanghai, Shenzhen",
                    },
                },
                "required": ["city"],
            }),
        }
    }

    async fn call(&self, args: &Map<String, Value>) -> String {
        match serde_json::from_value::<WeatherArgs>(Value::Object(args.clone())) {
            Ok(args) => self.backend.query(&args.city).await,
            Err(_) => "missing required argument: city".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

/// Real-time web search
pub struct WebSearchTool {
    backend: Arc<dyn QueryBackend>,
}

impl WebSearchTool {
    #[must_use]
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "web_search".to_string(),
            description: "Search the web for current information. Use for recent news, \
documentation, version numbers, or anything that needs live retrieval."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search keywords",
                    },
                },
                "required": ["query"],
            }),
        }
    }

    async fn call(&self, args: &Map<String, Value>) -> String {
        match serde_json::from_value::<SearchArgs>(Value::Object(args.clone())) {
            Ok(args) => self.backend.query(&args.query).await,
            Err(_) => "missing required argument: query".to_string(),
        }
    }
}
