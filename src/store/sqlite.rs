use crate::domain::{BookMetadata, ShelfEntry, ShelfStatus};
use crate::error::{BarnError, BarnResult};
use crate::store::{BookStore, ShelfStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Shelves and book metadata persisted in a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `db_path`.
    pub async fn open(db_path: &Path) -> BarnResult<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BarnError::RemoteUnavailable(e.to_string()))?;
        }
        let connection_path = format!("sqlite:{}?mode=rwc", db_path.display());
        info!("opening shelf database at {}", db_path.display());

        let pool = SqlitePool::connect(&connection_path).await?;
        Self::with_pool(pool).await
    }

    /// A private database living as long as the store.
    pub async fn in_memory() -> BarnResult<Self> {
        // Every connection to `:memory:` is its own database, so pin the pool to one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> BarnResult<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS shelves (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                status TEXT NOT NULL,
                date_added INTEGER NOT NULL,
                date_started INTEGER,
                date_finished INTEGER,
                UNIQUE (user_id, book_id)
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS shelves_user_status ON shelves (user_id, status)",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS books (
                book_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await?;

        Ok(SqliteStore { pool })
    }
}

fn to_millis(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp_millis())
}

fn from_millis(ms: i64) -> BarnResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| BarnError::RemoteUnavailable(format!("corrupt timestamp {ms}")))
}

fn entry_from_row(row: &SqliteRow) -> BarnResult<ShelfEntry> {
    let status: String = row.try_get("status")?;
    let date_started: Option<i64> = row.try_get("date_started")?;
    let date_finished: Option<i64> = row.try_get("date_finished")?;

    Ok(ShelfEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        book_id: row.try_get("book_id")?,
        status: status.parse()?,
        date_added: from_millis(row.try_get("date_added")?)?,
        date_started: date_started.map(from_millis).transpose()?,
        date_finished: date_finished.map(from_millis).transpose()?,
    })
}

#[async_trait]
impl ShelfStore for SqliteStore {
    async fn upsert_membership(
        &self,
        user_id: &str,
        book_id: &str,
        status: ShelfStatus,
    ) -> BarnResult<String> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT * FROM shelves WHERE user_id = ? AND book_id = ?")
            .bind(user_id)
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?;

        let id = match existing {
            Some(row) => {
                let updated = entry_from_row(&row)?.with_status(status, now);
                sqlx::query(
                    "UPDATE shelves SET status = ?, date_started = ?, date_finished = ?
                     WHERE id = ?",
                )
                .bind(updated.status.as_str())
                .bind(to_millis(updated.date_started))
                .bind(to_millis(updated.date_finished))
                .bind(&updated.id)
                .execute(&mut *tx)
                .await?;
                updated.id
            }
            None => {
                let mut entry = ShelfEntry::provisional(user_id, book_id, status, now);
                entry.id = Uuid::new_v4().to_string();
                sqlx::query(
                    "INSERT INTO shelves
                     (id, user_id, book_id, status, date_added, date_started, date_finished)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&entry.id)
                .bind(user_id)
                .bind(book_id)
                .bind(status.as_str())
                .bind(entry.date_added.timestamp_millis())
                .bind(to_millis(entry.date_started))
                .bind(to_millis(entry.date_finished))
                .execute(&mut *tx)
                .await?;
                entry.id
            }
        };

        tx.commit().await?;
        debug!("sqlite store: {user_id}/{book_id} -> {status} ({id})");
        Ok(id)
    }

    async fn delete_membership(&self, user_id: &str, book_id: &str) -> BarnResult<()> {
        sqlx::query("DELETE FROM shelves WHERE user_id = ? AND book_id = ?")
            .bind(user_id)
            .bind(book_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_memberships(
        &self,
        user_id: &str,
        status: Option<ShelfStatus>,
    ) -> BarnResult<Vec<ShelfEntry>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM shelves WHERE user_id = ? AND status = ?
                     ORDER BY date_added, rowid",
                )
                .bind(user_id)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM shelves WHERE user_id = ? ORDER BY date_added, rowid")
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(entry_from_row).collect()
    }

    async fn find_membership(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> BarnResult<Option<ShelfEntry>> {
        let row = sqlx::query("SELECT * FROM shelves WHERE user_id = ? AND book_id = ?")
            .bind(user_id)
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(entry_from_row).transpose()
    }
}

#[async_trait]
impl BookStore for SqliteStore {
    async fn get(&self, book_id: &str) -> BarnResult<BookMetadata> {
        let row = sqlx::query("SELECT data FROM books WHERE book_id = ?")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.try_get(0)?;
                serde_json::from_str(&data).map_err(|e| {
                    BarnError::RemoteUnavailable(format!("corrupt book {book_id}: {e}"))
                })
            }
            None => Err(BarnError::NotFound(format!("book {book_id}"))),
        }
    }

    async fn put(&self, book: &BookMetadata) -> BarnResult<()> {
        let data = serde_json::to_string(book)
            .map_err(|e| BarnError::Validation(format!("unencodable book: {e}")))?;

        sqlx::query(
            "INSERT OR REPLACE INTO books (book_id, data, updated_at)
             VALUES (?, ?, CURRENT_TIMESTAMP)",
        )
        .bind(&book.book_id)
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
