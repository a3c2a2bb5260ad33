//! Shared test utilities

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use murmur::llm::{Reply, ReplyGenerator};
use murmur::store::{HistoryEntry, LatestMessage, MessageStore};
use murmur::{Config, ConversationTurn, Error, MessageSink, Result};

/// Engine config pointing at nothing real: keyless provider, reactions
/// disabled by probability
#[must_use]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.trigger_prefix = ".".to_string();
    config.history_limit = 10;
    config.poll_interval_secs = 2;
    config.reaction_probability = 0.0;
    config
}

/// A `MessageStore` whose contents the test scripts directly
pub struct ScriptedStore {
    open_ok: bool,
    closed: AtomicBool,
    max: AtomicI64,
    latest: Mutex<Option<LatestMessage>>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl ScriptedStore {
    #[must_use]
    pub fn new(open_ok: bool) -> Arc<Self> {
        Arc::new(Self {
            open_ok,
            closed: AtomicBool::new(true),
            max: AtomicI64::new(0),
            latest: Mutex::new(None),
            history: Mutex::new(Vec::new()),
        })
    }

    /// Append a message: becomes both `latest()` and the new `max_id()`
    pub fn set_message(&self, id: i64, text: &str, sender: &str, is_from_me: bool) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(LatestMessage {
                id,
                text: text.to_string(),
                sender: sender.to_string(),
                is_from_me,
            });
        }
        self.max.store(id, Ordering::SeqCst);
    }

    /// Advance `max_id()` without touching `latest()` — an inbound row
    /// the poll loop has not looked at yet
    pub fn set_max(&self, id: i64) {
        self.max.store(id, Ordering::SeqCst);
    }

    pub fn set_history(&self, entries: Vec<HistoryEntry>) {
        if let Ok(mut history) = self.history.lock() {
            *history = entries;
        }
    }
}

impl MessageStore for ScriptedStore {
    fn open(&self) -> Result<()> {
        if self.open_ok {
            self.closed.store(false, Ordering::SeqCst);
            Ok(())
        } else {
            Err(Error::Connection("scripted open failure".to_string()))
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn max_id(&self) -> i64 {
        if self.closed.load(Ordering::SeqCst) {
            0
        } else {
            self.max.load(Ordering::SeqCst)
        }
    }

    fn latest(&self) -> Option<LatestMessage> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.latest.lock().ok()?.clone()
    }

    fn recent_for(&self, _sender: &str, limit: usize) -> Vec<HistoryEntry> {
        let Ok(history) = self.history.lock() else {
            return Vec::new();
        };
        if history.len() > limit {
            history[history.len() - limit..].to_vec()
        } else {
            history.clone()
        }
    }
}

/// Planned store mutation fired after the first text send
pub struct BumpPlan {
    pub store: Arc<ScriptedStore>,
    pub id: i64,
    pub delay: Duration,
}

/// A `MessageSink` that records sends; optionally simulates an external
/// message arriving some time after the first send
#[derive(Default)]
pub struct RecordingSink {
    texts: Mutex<Vec<(String, String)>>,
    attachments: Mutex<Vec<(String, PathBuf)>>,
    bump: Mutex<Option<BumpPlan>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// After the first `send_text`, advance the store's max id by `plan`
    pub fn bump_after_first_send(&self, plan: BumpPlan) {
        if let Ok(mut bump) = self.bump.lock() {
            *bump = Some(plan);
        }
    }

    #[must_use]
    pub fn text_count(&self) -> usize {
        self.texts.lock().map(|texts| texts.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn texts(&self) -> Vec<(String, String)> {
        self.texts.lock().map(|texts| texts.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn attachment_count(&self) -> usize {
        self.attachments.lock().map(|a| a.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()> {
        if let Ok(mut texts) = self.texts.lock() {
            texts.push((recipient.to_string(), text.to_string()));
        }
        if let Some(plan) = self.bump.lock().ok().and_then(|mut bump| bump.take()) {
            tokio::spawn(async move {
                tokio::time::sleep(plan.delay).await;
                plan.store.set_max(plan.id);
            });
        }
        Ok(())
    }

    async fn send_attachment(&self, recipient: &str, path: &std::path::Path) -> Result<()> {
        if let Ok(mut attachments) = self.attachments.lock() {
            attachments.push((recipient.to_string(), path.to_path_buf()));
        }
        Ok(())
    }
}

/// A `ReplyGenerator` answering from a scripted queue (`None` = failure),
/// falling back to a fixed default reply
pub struct StubGenerator {
    default: Reply,
    queue: Mutex<VecDeque<Option<Reply>>>,
    calls: AtomicUsize,
    last_turns: Mutex<Option<Vec<ConversationTurn>>>,
}

impl StubGenerator {
    #[must_use]
    pub fn new(text: &str, emoji_keyword: &str) -> Arc<Self> {
        Arc::new(Self {
            default: Reply {
                text: text.to_string(),
                emoji_keyword: emoji_keyword.to_string(),
            },
            queue: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            last_turns: Mutex::new(None),
        })
    }

    /// Queue a one-shot response; `None` makes that call fail
    pub fn push_response(&self, response: Option<Reply>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(response);
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_turns(&self) -> Option<Vec<ConversationTurn>> {
        self.last_turns.lock().ok().and_then(|turns| turns.clone())
    }
}

#[async_trait]
impl ReplyGenerator for StubGenerator {
    async fn generate(&self, turns: Vec<ConversationTurn>) -> Result<Reply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_turns.lock() {
            *last = Some(turns);
        }
        let queued = self.queue.lock().ok().and_then(|mut queue| queue.pop_front());
        match queued {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(Error::Http {
                status: 500,
                body: "scripted failure".to_string(),
            }),
            None => Ok(self.default.clone()),
        }
    }
}

/// Poll `cond` under virtual time until it holds or `max_secs` elapse
pub async fn wait_until(mut cond: impl FnMut() -> bool, max_secs: u64) -> bool {
    for _ in 0..max_secs * 10 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    cond()
}
