//! Relational query layer over `SQLite`.

mod cards;
mod chats;
mod messages;
mod personas;

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::MemoryError;

pub use chats::ChatSummaryRow;

/// Default page size for [`SqliteStore::chat_history`].
pub const DEFAULT_HISTORY_LIMIT: u32 = 25;

/// Default cap for [`SqliteStore::recent_chat_rows`].
pub const DEFAULT_RECENT_CHATS_LIMIT: u32 = 20;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the `SQLite` database and run migrations.
    ///
    /// Foreign keys are enforced per connection so `ON DELETE CASCADE` and
    /// `ON DELETE SET NULL` apply. `:memory:` databases are pinned to a single
    /// connection that is never recycled, since each connection would otherwise
    /// see its own empty database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool_opts = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_opts.connect_with(opts).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(path, "sqlite store ready");

        Ok(Self { pool })
    }

    /// Expose the underlying pool for shared access by other stores.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection. Later queries fail with
    /// [`MemoryError::StoreUnavailable`].
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
