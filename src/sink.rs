//! Outbound message sink
//!
//! Sending is an external, asynchronous act: the system never gets a
//! direct acknowledgment and instead infers success by re-polling the
//! store. Errors from the sink are logged by callers, not retried.

use std::path::Path;

use async_trait::async_trait;

use crate::{Error, Result};

/// Destination for outbound replies
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send one text message to `recipient`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sink`] when the transport rejects the send
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()>;

    /// Send a file attachment to `recipient`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sink`] when the transport rejects the send
    async fn send_attachment(&self, recipient: &str, path: &Path) -> Result<()>;
}

/// Sink driving Messages.app through `osascript`
pub struct OsaScriptSink;

impl OsaScriptSink {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    async fn run_script(script: String) -> Result<()> {
        let output = tokio::process::Command::new("osascript")
            .arg("-e")
            .arg(&script)
            .output()
            .await
            .map_err(|e| Error::Sink(format!("failed to run osascript: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Sink(format!(
                "osascript exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Default for OsaScriptSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape text for embedding inside an AppleScript string literal
fn applescript_escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[async_trait]
impl MessageSink for OsaScriptSink {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()> {
        let script = format!(
            "tell application \"Messages\" to send \"{}\" to buddy \"{}\"",
            applescript_escape(text),
            applescript_escape(recipient)
        );
        Self::run_script(script).await
    }

    async fn send_attachment(&self, recipient: &str, path: &Path) -> Result<()> {
        let script = format!(
            "tell application \"Messages\" to send POSIX file \"{}\" to buddy \"{}\"",
            applescript_escape(&path.display().to_string()),
            applescript_escape(recipient)
        );
        Self::run_script(script).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_newlines_backslashes() {
        assert_eq!(
            applescript_escape("say \"hi\"\nnew\\line"),
            "say \\\"hi\\\"\\nnew\\\\line"
        );
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(applescript_escape("hello there"), "hello there");
    }
}
