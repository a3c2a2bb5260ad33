//! Configuration management for murmur
//!
//! Configuration is an immutable snapshot taken at engine start: a TOML
//! file under the platform config directory, with environment overrides
//! for secrets so keys can stay out of the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Output-format contract appended to every persona prompt. The model
/// must answer with a bare JSON object so the reply can be decoded into
/// [`crate::llm::Reply`].
pub const FORMAT_INSTRUCTION: &str = "\n\nYou must answer with a single JSON object \
containing exactly two fields:\n\
- \"reply\": the message text to send back to the user.\n\
- \"emoji_keyword\": a short keyword describing the mood of your reply, used to \
search for a matching reaction image (for example \"happy\", \"angry\", \
\"hug\"). Use an empty string when nothing fits.";

/// Which LLM backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// `OpenAI` or any OpenAI-compatible endpoint
    OpenAi,
    /// Volcengine Ark (OpenAI-compatible wire format)
    Volcengine,
    /// Ollama native `/api/chat` endpoint
    Ollama,
}

impl ProviderKind {
    /// Stable lowercase name, matching the config file spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Volcengine => "volcengine",
            Self::Ollama => "ollama",
        }
    }

    /// Whether this backend refuses requests without a real API key
    #[must_use]
    pub const fn requires_api_key(self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// LLM backend selection, immutable for the duration of one request
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Adapter family
    pub kind: ProviderKind,

    /// Base URL; the adapter appends the chat endpoint path when missing
    pub base_url: String,

    /// Bearer token (may be blank for Ollama)
    #[serde(default)]
    pub api_key: String,

    /// Model identifier
    pub model: String,
}

/// Reaction asset lookup service
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionConfig {
    /// Keyword search endpoint
    pub endpoint: String,

    /// API key for the search endpoint
    #[serde(default)]
    pub api_key: String,
}

/// Murmur configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// LLM provider selection
    pub provider: ProviderConfig,

    /// Only inbound messages starting with this prefix are handled
    #[serde(default = "default_trigger_prefix")]
    pub trigger_prefix: String,

    /// Persona text prepended to every conversation
    #[serde(default = "default_persona_prompt")]
    pub persona_prompt: String,

    /// How many history messages accompany a new input
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Seconds between store polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Chance of following a reply with a reaction image, 0.0..=1.0
    #[serde(default = "default_reaction_probability")]
    pub reaction_probability: f64,

    /// Reaction asset service; reactions are disabled when absent
    #[serde(default)]
    pub reaction: Option<ReactionConfig>,

    /// Message store override; defaults to `~/Library/Messages/chat.db`
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

fn default_trigger_prefix() -> String {
    ".".to_string()
}

fn default_persona_prompt() -> String {
    "You are a warm, playful friend chatting over iMessage. Keep replies \
short and conversational, like a real person typing on their phone."
        .to_string()
}

const fn default_history_limit() -> usize {
    10
}

const fn default_poll_interval_secs() -> u64 {
    2
}

const fn default_reaction_probability() -> f64 {
    0.3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig {
                kind: ProviderKind::Ollama,
                base_url: "http://localhost:11434".to_string(),
                api_key: String::new(),
                model: "llama3.1".to_string(),
            },
            trigger_prefix: default_trigger_prefix(),
            persona_prompt: default_persona_prompt(),
            history_limit: default_history_limit(),
            poll_interval_secs: default_poll_interval_secs(),
            reaction_probability: default_reaction_probability(),
            reaction: None,
            store_path: None,
        }
    }
}

impl Config {
    /// Default config file location (`~/.config/murmur/murmur.toml` on Linux)
    #[must_use]
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("dev", "murmur", "murmur").map_or_else(
            || PathBuf::from("murmur.toml"),
            |dirs| dirs.config_dir().join("murmur.toml"),
        )
    }

    /// Load configuration from `path` (or the default location), then
    /// apply environment overrides.
    ///
    /// A missing file yields the built-in defaults so a local Ollama
    /// setup works with zero configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but cannot be read,
    /// or [`Error::Toml`] if it fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("cannot read {}: {e}", path.display()))
            })?;
            let config: Self = toml::from_str(&raw)?;
            tracing::info!(path = %path.display(), "configuration loaded");
            config
        } else {
            tracing::warn!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        if let Ok(key) = std::env::var("MURMUR_API_KEY") {
            config.provider.api_key = key;
        }
        if let Ok(key) = std::env::var("MURMUR_REACTION_API_KEY") {
            if let Some(reaction) = config.reaction.as_mut() {
                reaction.api_key = key;
            }
        }

        Ok(config)
    }

    /// Full system prompt: persona text plus the output-format contract
    #[must_use]
    pub fn system_prompt(&self) -> String {
        format!("{}{FORMAT_INSTRUCTION}", self.persona_prompt)
    }

    /// Check that the selected provider has the credentials it needs.
    ///
    /// Runs before the engine starts so a missing key blocks startup
    /// instead of failing the first reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the provider requires an API key and
    /// none is configured.
    pub fn validate(&self) -> Result<()> {
        if self.provider.kind.requires_api_key() && self.provider.api_key.trim().is_empty() {
            return Err(Error::Config(format!(
                "provider {} requires an API key; set provider.api_key or MURMUR_API_KEY",
                self.provider.kind
            )));
        }
        Ok(())
    }
}
