use super::SqliteStore;
use crate::error::MemoryError;
use crate::types::{PersonaId, PersonaRow};

type PersonaTuple = (PersonaId, String, String, bool, String, Option<String>);

fn persona_from_tuple(
    (id, name, description, is_default, inserted_at, updated_at): PersonaTuple,
) -> PersonaRow {
    PersonaRow {
        id,
        name,
        description,
        is_default,
        inserted_at,
        updated_at,
    }
}

const PERSONA_COLUMNS: &str = "id, name, description, is_default, inserted_at, updated_at";

impl SqliteStore {
    /// Insert a persona. When `is_default` is set, every other persona loses the
    /// flag in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including a duplicate name.
    pub async fn insert_persona(
        &self,
        name: &str,
        description: &str,
        is_default: bool,
    ) -> Result<PersonaId, MemoryError> {
        let mut tx = self.pool.begin().await?;
        if is_default {
            sqlx::query("UPDATE personas SET is_default = 0 WHERE is_default = 1")
                .execute(&mut *tx)
                .await?;
        }
        let id: PersonaId = sqlx::query_scalar(
            "INSERT INTO personas (name, description, is_default) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(description)
        .bind(is_default)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::debug!(persona_id = %id, name, is_default, "inserted persona");
        Ok(id)
    }

    /// Overwrite a persona's fields and stamp `updated_at`.
    ///
    /// Returns `false` when no row matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_persona(
        &self,
        id: PersonaId,
        name: &str,
        description: &str,
        is_default: bool,
    ) -> Result<bool, MemoryError> {
        let mut tx = self.pool.begin().await?;
        if is_default {
            sqlx::query("UPDATE personas SET is_default = 0 WHERE is_default = 1 AND id != ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        let result = sqlx::query(
            "UPDATE personas \
             SET name = ?, description = ?, is_default = ?, \
                 updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now') \
             WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(is_default)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a persona. Chats that used it keep existing with no persona.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_persona(&self, id: PersonaId) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM personas WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn persona_rows(&self) -> Result<Vec<PersonaRow>, MemoryError> {
        let query = format!("SELECT {PERSONA_COLUMNS} FROM personas ORDER BY id ASC");
        let rows: Vec<PersonaTuple> = sqlx::query_as(&query).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(persona_from_tuple).collect())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn persona_by_id(&self, id: PersonaId) -> Result<Option<PersonaRow>, MemoryError> {
        let query = format!("SELECT {PERSONA_COLUMNS} FROM personas WHERE id = ?");
        let row: Option<PersonaTuple> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(persona_from_tuple))
    }

    /// The persona flagged as default, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn default_persona(&self) -> Result<Option<PersonaRow>, MemoryError> {
        let query = format!("SELECT {PERSONA_COLUMNS} FROM personas WHERE is_default = 1 LIMIT 1");
        let row: Option<PersonaTuple> = sqlx::query_as(&query)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(persona_from_tuple))
    }
}
