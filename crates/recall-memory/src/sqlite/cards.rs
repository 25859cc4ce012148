use super::SqliteStore;
use crate::error::MemoryError;
use crate::types::{CardId, CardRow};

type CardTuple = (CardId, String, String, Option<String>);

fn card_from_tuple((id, file_name, inserted_at, updated_at): CardTuple) -> CardRow {
    CardRow {
        id,
        file_name,
        inserted_at,
        updated_at,
    }
}

impl SqliteStore {
    /// Register a character card by the file name its blob is stored under.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including a duplicate file name.
    pub async fn insert_card(&self, file_name: &str) -> Result<CardId, MemoryError> {
        let id: CardId = sqlx::query_scalar("INSERT INTO cards (file_name) VALUES (?) RETURNING id")
            .bind(file_name)
            .fetch_one(&self.pool)
            .await?;
        tracing::debug!(card_id = %id, file_name, "inserted card");
        Ok(id)
    }

    /// Delete a card and, through the foreign key cascade, its chats and messages.
    ///
    /// Returns `false` when no row matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_card(&self, id: CardId) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM cards WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn card_rows(&self) -> Result<Vec<CardRow>, MemoryError> {
        let rows: Vec<CardTuple> = sqlx::query_as(
            "SELECT id, file_name, inserted_at, updated_at FROM cards ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(card_from_tuple).collect())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn card_by_id(&self, id: CardId) -> Result<Option<CardRow>, MemoryError> {
        let row: Option<CardTuple> = sqlx::query_as(
            "SELECT id, file_name, inserted_at, updated_at FROM cards WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(card_from_tuple))
    }
}
