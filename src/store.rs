//! Read-only view over the Messages store
//!
//! The store (`chat.db`) is owned and appended to by an external writer;
//! this module never mutates it and holds no lock across polling
//! intervals. Row ids are strictly increasing in insertion order, which
//! is what makes the engine's cursor a reliable "already seen" marker.

use std::path::PathBuf;
use std::sync::RwLock;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;

use crate::{Error, Result};

/// Read-only connection pool over the Messages database
pub type StorePool = Pool<SqliteConnectionManager>;

/// The newest message in the store
#[derive(Debug, Clone)]
pub struct LatestMessage {
    /// Row id (monotonically increasing)
    pub id: i64,

    /// Message text; empty when the row carries no text
    pub text: String,

    /// Conversation handle of the counterpart (phone number or email)
    pub sender: String,

    /// Whether the local account sent this message
    pub is_from_me: bool,
}

/// One entry of bounded conversation history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub text: String,
    pub is_from_me: bool,
}

/// Cursor-reader interface over an append-only message log.
///
/// Implementations must tolerate concurrent external appends; readers
/// may observe a larger store on every call.
pub trait MessageStore: Send + Sync {
    /// Open the underlying store
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the store cannot be opened or read
    fn open(&self) -> Result<()>;

    /// Close the store; subsequent queries degrade to empty results
    fn close(&self);

    /// Highest row id, or 0 when the store is empty, closed, or unreadable
    fn max_id(&self) -> i64;

    /// The most recent message, if any
    fn latest(&self) -> Option<LatestMessage>;

    /// Up to `limit` most recent non-blank messages exchanged with
    /// `sender`, in chronological order (oldest first)
    fn recent_for(&self, sender: &str, limit: usize) -> Vec<HistoryEntry>;
}

/// `MessageStore` backed by the macOS Messages `chat.db`
pub struct ChatDb {
    path: PathBuf,
    pool: RwLock<Option<StorePool>>,
}

impl ChatDb {
    /// Create a handle for the database at `path`; nothing is opened yet
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            pool: RwLock::new(None),
        }
    }

    /// Standard location of the Messages store for the current user
    #[must_use]
    pub fn default_path() -> PathBuf {
        directories::UserDirs::new().map_or_else(
            || PathBuf::from("chat.db"),
            |dirs| dirs.home_dir().join("Library/Messages/chat.db"),
        )
    }

    fn with_conn<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> rusqlite::Result<T>) -> Option<T> {
        let guard = self.pool.read().ok()?;
        let pool = guard.as_ref()?;
        let conn = match pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "store connection unavailable");
                return None;
            }
        };
        match f(&conn) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "store query failed");
                None
            }
        }
    }
}

impl MessageStore for ChatDb {
    fn open(&self) -> Result<()> {
        // The store is externally owned; a missing file means a wrong
        // path, never something to create.
        if !self.path.exists() {
            return Err(Error::Connection(format!(
                "{}: no such file",
                self.path.display()
            )));
        }

        let manager = SqliteConnectionManager::file(&self.path).with_flags(
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        );
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| Error::Connection(format!("{}: {e}", self.path.display())))?;

        // Probe the schema so a permission problem (missing Full Disk
        // Access on macOS) surfaces at start instead of on first poll.
        {
            let conn = pool
                .get()
                .map_err(|e| Error::Connection(e.to_string()))?;
            conn.query_row("SELECT COUNT(*) FROM message", [], |row| row.get::<_, i64>(0))
                .map_err(|e| Error::Connection(format!("{}: {e}", self.path.display())))?;
        }

        if let Ok(mut guard) = self.pool.write() {
            *guard = Some(pool);
        }
        tracing::info!(path = %self.path.display(), "message store opened");
        Ok(())
    }

    fn close(&self) {
        if let Ok(mut guard) = self.pool.write() {
            if guard.take().is_some() {
                tracing::info!("message store closed");
            }
        }
    }

    fn max_id(&self) -> i64 {
        self.with_conn(|conn| {
            conn.query_row("SELECT COALESCE(MAX(ROWID), 0) FROM message", [], |row| {
                row.get(0)
            })
        })
        .unwrap_or(0)
    }

    fn latest(&self) -> Option<LatestMessage> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT message.ROWID, message.text, handle.id, message.is_from_me
                 FROM message
                 JOIN handle ON message.handle_id = handle.ROWID
                 ORDER BY message.date DESC
                 LIMIT 1",
                [],
                |row| {
                    Ok(LatestMessage {
                        id: row.get(0)?,
                        text: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        sender: row.get(2)?,
                        is_from_me: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })
        .flatten()
    }

    fn recent_for(&self, sender: &str, limit: usize) -> Vec<HistoryEntry> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message.text, message.is_from_me
                 FROM message
                 JOIN handle ON message.handle_id = handle.ROWID
                 WHERE handle.id = ?1
                   AND message.text IS NOT NULL
                   AND TRIM(message.text) <> ''
                 ORDER BY message.date DESC
                 LIMIT ?2",
            )?;
            let mut entries: Vec<HistoryEntry> = stmt
                .query_map(rusqlite::params![sender, limit as i64], |row| {
                    Ok(HistoryEntry {
                        text: row.get(0)?,
                        is_from_me: row.get::<_, i64>(1)? != 0,
                    })
                })?
                .filter_map(std::result::Result::ok)
                .collect();
            // Query walks newest-first; callers want chronological order
            entries.reverse();
            Ok(entries)
        })
        .unwrap_or_default()
    }
}
