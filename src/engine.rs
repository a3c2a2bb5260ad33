//! Polling engine - the top-level scheduler
//!
//! One long-lived loop polls the store for new rows; each trigger spawns
//! an independent reply task. Everything shares a single cursor: the
//! highest row id already seen. The poll loop advances it when a new
//! inbound row appears, and reply tasks advance it after each send so
//! the bot's own outbound rows never read as new triggers. The cursor is
//! also the only cancellation primitive — a reply task aborts as soon as
//! the store's max id no longer matches it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use rand::Rng;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::conversation;
use crate::llm::ReplyGenerator;
use crate::reaction::ReactionFetcher;
use crate::segment::split_segments;
use crate::sink::MessageSink;
use crate::store::{LatestMessage, MessageStore};
use crate::Result;

/// Post-send cursor refresh: how many times to re-read the store
const ABSORB_ATTEMPTS: u32 = 6;

/// Post-send cursor refresh: initial delay, doubled up to the cap
const ABSORB_BASE: Duration = Duration::from_millis(250);
const ABSORB_CAP: Duration = Duration::from_secs(2);

/// Inter-segment pacing bounds, milliseconds
const PACING_MIN_MS: u64 = 2000;
const PACING_MAX_MS: u64 = 3000;

/// How long a sent reaction file must outlive the send call, since the
/// transport reads it asynchronously
const REACTION_LINGER: Duration = Duration::from_secs(5);

/// The murmur polling engine
pub struct Engine {
    config: Config,
    system_prompt: String,
    store: Arc<dyn MessageStore>,
    sink: Arc<dyn MessageSink>,
    generator: Arc<dyn ReplyGenerator>,
    reactions: Option<ReactionFetcher>,

    /// Highest row id already processed or seen
    cursor: AtomicI64,
    running: AtomicBool,
    poll_task: Mutex<Option<JoinHandle<()>>>,

    /// In-flight reply tasks keyed by sender; a new trigger from the
    /// same sender supersedes the previous task
    reply_tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Engine {
    /// Assemble an engine from its collaborators. Nothing runs until
    /// [`Engine::start`].
    #[must_use]
    pub fn new(
        config: Config,
        store: Arc<dyn MessageStore>,
        sink: Arc<dyn MessageSink>,
        generator: Arc<dyn ReplyGenerator>,
        reactions: Option<ReactionFetcher>,
    ) -> Self {
        let system_prompt = config.system_prompt();
        Self {
            config,
            system_prompt,
            store,
            sink,
            generator,
            reactions,
            cursor: AtomicI64::new(0),
            running: AtomicBool::new(false),
            poll_task: Mutex::new(None),
            reply_tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the polling loop is active
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Validate credentials, open the store, and start polling.
    ///
    /// Pre-existing rows are never treated as new: the cursor starts at
    /// the store's current max id. Idempotent while running.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for a missing credential or
    /// [`crate::Error::Connection`] when the store cannot be opened; in
    /// both cases the engine stays stopped.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.try_start() {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    fn try_start(self: &Arc<Self>) -> Result<()> {
        self.config.validate()?;
        self.store.open()?;
        self.cursor.store(self.store.max_id(), Ordering::SeqCst);

        let engine = Arc::clone(self);
        let handle = tokio::spawn(engine.poll_loop());
        if let Ok(mut guard) = self.poll_task.lock() {
            *guard = Some(handle);
        }

        tracing::info!(
            trigger = %self.config.trigger_prefix,
            interval_secs = self.config.poll_interval_secs,
            cursor = self.cursor.load(Ordering::SeqCst),
            "engine running"
        );
        Ok(())
    }

    /// Cancel the polling loop and close the store.
    ///
    /// In-flight reply tasks are left running: their next interruption
    /// check compares the cursor against a closed store and fails, so
    /// they wind down on their own.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.poll_task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        self.store.close();
        tracing::info!("engine stopped");
    }

    async fn poll_loop(self: Arc<Self>) {
        let interval_secs = self.config.poll_interval_secs.max(1);
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // Skip the immediate first tick; the cursor already covers the present
        interval.tick().await;

        loop {
            interval.tick().await;
            self.poll();
        }
    }

    /// One poll cycle: mark a changed id seen, then decide whether it
    /// triggers a reply.
    fn poll(self: &Arc<Self>) {
        let Some(latest) = self.store.latest() else {
            return;
        };
        if latest.id == self.cursor.load(Ordering::SeqCst) {
            return;
        }
        self.cursor.store(latest.id, Ordering::SeqCst);

        if latest.is_from_me
            || latest.text.is_empty()
            || !latest.text.starts_with(&self.config.trigger_prefix)
        {
            return;
        }

        tracing::info!(id = latest.id, sender = %latest.sender, "trigger detected");
        self.spawn_reply(latest);
    }

    fn spawn_reply(self: &Arc<Self>, message: LatestMessage) {
        let sender = message.sender.clone();
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.handle_trigger(message).await });

        if let Ok(mut tasks) = self.reply_tasks.lock() {
            tasks.retain(|_, task| !task.is_finished());
            if let Some(previous) = tasks.insert(sender.clone(), handle) {
                if !previous.is_finished() {
                    tracing::warn!(sender = %sender, "superseding in-flight reply");
                    previous.abort();
                }
            }
        }
    }

    /// Handle one trigger end to end: bound history, build the
    /// conversation, generate, then send segment by segment under
    /// interruption checks.
    async fn handle_trigger(&self, message: LatestMessage) {
        let input = message
            .text
            .strip_prefix(&self.config.trigger_prefix)
            .unwrap_or(&message.text)
            .trim()
            .to_string();

        let limit = self.config.history_limit;
        // One extra row, because the trigger itself is usually the
        // newest stored entry and must not double as history.
        let mut history = self.store.recent_for(&message.sender, limit + 1);
        if history
            .last()
            .is_some_and(|last| last.text == message.text && !last.is_from_me)
        {
            history.pop();
        }
        if history.len() > limit {
            history.drain(..history.len() - limit);
        }

        let turns = conversation::build(&history, &input, &self.system_prompt, Local::now());
        let reply = match self.generator.generate(turns).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, sender = %message.sender, "reply generation failed");
                return;
            }
        };
        tracing::info!(reply = %reply.text, "model reply");

        let segments = split_segments(&reply.text);
        tracing::info!(count = segments.len(), "sending reply in segments");
        for segment in &segments {
            if self.interrupted() {
                tracing::warn!("new message arrived, aborting remaining segments");
                return;
            }
            if let Err(e) = self.sink.send_text(&message.sender, segment).await {
                tracing::error!(error = %e, "segment send failed");
            }
            self.absorb_own_send().await;

            let pacing = rand::thread_rng().gen_range(PACING_MIN_MS..PACING_MAX_MS);
            tokio::time::sleep(Duration::from_millis(pacing)).await;
        }

        if !reply.emoji_keyword.is_empty() {
            self.maybe_send_reaction(&message.sender, &reply.emoji_keyword).await;
        }
    }

    /// Probabilistic reaction-image follow-up, interruption-checked at
    /// every step. The downloaded temp file removes itself on drop, so
    /// every early return cleans up.
    async fn maybe_send_reaction(&self, recipient: &str, keyword: &str) {
        let Some(fetcher) = &self.reactions else {
            return;
        };
        let roll = rand::thread_rng().gen_range(0.0..1.0);
        if roll >= self.config.reaction_probability {
            tracing::debug!(keyword, "skipping reaction this time");
            return;
        }

        tracing::info!(keyword, "preparing reaction image");
        if self.interrupted() {
            tracing::warn!("new message arrived, skipping reaction");
            return;
        }
        let Some(url) = fetcher.resolve_url(keyword).await else {
            tracing::warn!(keyword, "no reaction image found");
            return;
        };

        if self.interrupted() {
            tracing::warn!("new message arrived, skipping reaction download");
            return;
        }
        let Some(file) = fetcher.download(&url).await else {
            tracing::warn!(url = %url, "reaction download failed");
            return;
        };

        if self.interrupted() {
            tracing::warn!("new message arrived, discarding downloaded reaction");
            return;
        }
        if let Err(e) = self.sink.send_attachment(recipient, file.path()).await {
            tracing::error!(error = %e, "reaction send failed");
        }
        self.absorb_own_send().await;

        // The transport reads the file asynchronously; keep it alive a
        // moment before the temp handle deletes it.
        tokio::time::sleep(REACTION_LINGER).await;
        drop(file);
    }

    /// A reply task is interrupted when the store has rows the cursor
    /// has not absorbed. A closed store reads as max id 0, which also
    /// mismatches — stopping the engine winds down in-flight tasks here.
    fn interrupted(&self) -> bool {
        self.store.max_id() != self.cursor.load(Ordering::SeqCst)
    }

    /// After a send, watch for the outbound row and absorb its id so the
    /// bot does not trigger on its own message. The store only reflects
    /// the write eventually, so poll with backoff until it shows up or
    /// the attempts run out.
    async fn absorb_own_send(&self) {
        let before = self.cursor.load(Ordering::SeqCst);
        let mut delay = ABSORB_BASE;
        for _ in 0..ABSORB_ATTEMPTS {
            tokio::time::sleep(delay).await;
            let max = self.store.max_id();
            if max > before {
                self.cursor.store(max, Ordering::SeqCst);
                return;
            }
            delay = (delay * 2).min(ABSORB_CAP);
        }
        tracing::debug!("outbound message not yet visible in store");
    }
}
