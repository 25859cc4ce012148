use super::SqliteStore;
use crate::error::MemoryError;
use crate::types::{CardId, CardRow, Chat, ChatId, PersonaId, PersonaRow};

/// A chat joined with its card and the newest character line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummaryRow {
    pub chat_id: ChatId,
    pub card_id: CardId,
    pub file_name: String,
    /// `None` when the character has not spoken yet.
    pub last_message: Option<String>,
}

type ChatTuple = (ChatId, CardId, Option<PersonaId>, String, Option<String>);

type SummaryTuple = (ChatId, CardId, String, Option<String>);

const SUMMARY_SELECT: &str = "SELECT c.id, ca.id, ca.file_name, \
       (SELECT m.text FROM messages m \
        WHERE m.chat_id = c.id AND m.sender_type = 'character' \
        ORDER BY m.id DESC LIMIT 1) \
     FROM chats c \
     JOIN cards ca ON ca.id = c.card_id";

fn summary_from_tuple((chat_id, card_id, file_name, last_message): SummaryTuple) -> ChatSummaryRow {
    ChatSummaryRow {
        chat_id,
        card_id,
        file_name,
        last_message,
    }
}

impl SqliteStore {
    /// Create a chat and, in the same transaction, its opening character line.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::TransactionFailed`] if either insert fails.
    pub async fn create_chat(
        &self,
        card_id: CardId,
        persona_id: Option<PersonaId>,
        greeting: Option<&str>,
    ) -> Result<ChatId, MemoryError> {
        let mut tx = self.pool.begin().await?;
        let id = async {
            let id: ChatId =
                sqlx::query_scalar("INSERT INTO chats (card_id, persona_id) VALUES (?, ?) RETURNING id")
                    .bind(card_id)
                    .bind(persona_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if let Some(text) = greeting {
                sqlx::query("INSERT INTO messages (chat_id, text, sender_type) VALUES (?, ?, 'character')")
                    .bind(id)
                    .bind(text)
                    .execute(&mut *tx)
                    .await?;
            }
            Ok::<_, sqlx::Error>(id)
        }
        .await
        .map_err(MemoryError::TransactionFailed)?;
        tx.commit().await.map_err(MemoryError::TransactionFailed)?;
        tracing::debug!(chat_id = %id, card_id = %card_id, "created chat");
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn chat_by_id(&self, id: ChatId) -> Result<Option<Chat>, MemoryError> {
        let row: Option<ChatTuple> = sqlx::query_as(
            "SELECT id, card_id, persona_id, inserted_at, updated_at FROM chats WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, card_id, persona_id, inserted_at, updated_at)| Chat {
            id,
            card_id,
            persona_id,
            inserted_at,
            updated_at,
        }))
    }

    /// Delete a chat and its messages. Deleting a missing chat is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_chat(&self, id: ChatId) -> Result<(), MemoryError> {
        sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        tracing::debug!(chat_id = %id, "deleted chat");
        Ok(())
    }

    /// Every chat with its card file name and newest character line, newest chat first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn chat_search_rows(&self) -> Result<Vec<ChatSummaryRow>, MemoryError> {
        let query = format!("{SUMMARY_SELECT} ORDER BY c.id DESC");
        let rows: Vec<SummaryTuple> = sqlx::query_as(&query).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(summary_from_tuple).collect())
    }

    /// Chats ordered by last activity, falling back to creation time for chats
    /// that never received a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn recent_chat_rows(&self, limit: u32) -> Result<Vec<ChatSummaryRow>, MemoryError> {
        let query = format!(
            "{SUMMARY_SELECT} \
             ORDER BY COALESCE(c.updated_at, c.inserted_at) DESC, c.id DESC \
             LIMIT ?"
        );
        let rows: Vec<SummaryTuple> = sqlx::query_as(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(summary_from_tuple).collect())
    }

    /// The card a chat was started with.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn chat_card_row(&self, chat_id: ChatId) -> Result<Option<CardRow>, MemoryError> {
        let row: Option<(CardId, String, String, Option<String>)> = sqlx::query_as(
            "SELECT ca.id, ca.file_name, ca.inserted_at, ca.updated_at \
             FROM cards ca JOIN chats c ON c.card_id = ca.id \
             WHERE c.id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, file_name, inserted_at, updated_at)| CardRow {
            id,
            file_name,
            inserted_at,
            updated_at,
        }))
    }

    /// The persona attached to a chat; `None` for a missing chat or a chat without one.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn chat_persona_row(
        &self,
        chat_id: ChatId,
    ) -> Result<Option<PersonaRow>, MemoryError> {
        let row: Option<(PersonaId, String, String, bool, String, Option<String>)> =
            sqlx::query_as(
                "SELECT p.id, p.name, p.description, p.is_default, p.inserted_at, p.updated_at \
                 FROM personas p \
                 WHERE p.id = (SELECT persona_id FROM chats WHERE chats.id = ?)",
            )
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(
            |(id, name, description, is_default, inserted_at, updated_at)| PersonaRow {
                id,
                name,
                description,
                is_default,
                inserted_at,
                updated_at,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SenderType;

    async fn test_store() -> SqliteStore {
        SqliteStore::new(":memory:").await.unwrap()
    }

    async fn set_updated_at(store: &SqliteStore, chat: ChatId, at: Option<&str>) {
        sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(chat)
            .execute(store.pool())
            .await
            .unwrap();
    }

    async fn set_inserted_at(store: &SqliteStore, chat: ChatId, at: &str) {
        sqlx::query("UPDATE chats SET inserted_at = ? WHERE id = ?")
            .bind(at)
            .bind(chat)
            .execute(store.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_chat_writes_greeting() {
        let store = test_store().await;
        let card = store.insert_card("ada.png").await.unwrap();
        let chat = store.create_chat(card, None, Some("Hello there")).await.unwrap();

        let history = store.chat_history(chat, None, 25).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "Hello there");
        assert_eq!(history[0].sender, SenderType::Character);

        let row = store.chat_by_id(chat).await.unwrap().unwrap();
        assert_eq!(row.card_id, card);
        assert!(row.updated_at.is_some());
    }

    #[tokio::test]
    async fn create_chat_for_missing_card_fails_atomically() {
        let store = test_store().await;
        let err = store
            .create_chat(CardId(42), None, Some("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::TransactionFailed(_)));
        assert!(store.chat_search_rows().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_chat_is_idempotent() {
        let store = test_store().await;
        let card = store.insert_card("a.png").await.unwrap();
        let chat = store.create_chat(card, None, Some("hi")).await.unwrap();
        store.delete_chat(chat).await.unwrap();
        store.delete_chat(chat).await.unwrap();
        assert!(store.chat_by_id(chat).await.unwrap().is_none());
        assert_eq!(store.count_messages(chat).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn chat_search_rows_join_on_card() {
        let store = test_store().await;
        // A second card shifts card IDs away from chat IDs.
        store.insert_card("unused.png").await.unwrap();
        let card = store.insert_card("ada.png").await.unwrap();
        let first = store.create_chat(card, None, Some("greeting")).await.unwrap();
        let second = store.create_chat(card, None, None).await.unwrap();
        store
            .insert_message_pair(first, "hi", "newest line")
            .await
            .unwrap();

        let rows = store.chat_search_rows().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].chat_id, second);
        assert_eq!(rows[0].last_message, None);
        assert_eq!(rows[1].chat_id, first);
        assert_eq!(rows[1].file_name, "ada.png");
        assert_eq!(rows[1].card_id, card);
        assert_eq!(rows[1].last_message.as_deref(), Some("newest line"));
    }

    #[tokio::test]
    async fn recent_chats_order_by_activity_with_inserted_fallback() {
        let store = test_store().await;
        let card = store.insert_card("a.png").await.unwrap();
        let a = store.create_chat(card, None, None).await.unwrap();
        let b = store.create_chat(card, None, None).await.unwrap();
        let c = store.create_chat(card, None, None).await.unwrap();

        set_inserted_at(&store, a, "2024-01-01 00:00:00.000").await;
        set_inserted_at(&store, b, "2024-01-02 00:00:00.000").await;
        set_inserted_at(&store, c, "2024-01-03 00:00:00.000").await;
        set_updated_at(&store, a, Some("2024-02-01 00:00:00.000")).await;
        set_updated_at(&store, b, None).await;
        set_updated_at(&store, c, None).await;

        let ids: Vec<ChatId> = store
            .recent_chat_rows(20)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.chat_id)
            .collect();
        assert_eq!(ids, vec![a, c, b]);
    }

    #[tokio::test]
    async fn recent_chats_respect_limit() {
        let store = test_store().await;
        let card = store.insert_card("a.png").await.unwrap();
        for _ in 0..25 {
            store.create_chat(card, None, None).await.unwrap();
        }
        let rows = store.recent_chat_rows(20).await.unwrap();
        assert_eq!(rows.len(), 20);
    }

    #[tokio::test]
    async fn new_message_moves_chat_to_front() {
        let store = test_store().await;
        let card = store.insert_card("a.png").await.unwrap();
        let old = store.create_chat(card, None, None).await.unwrap();
        let new = store.create_chat(card, None, None).await.unwrap();
        set_updated_at(&store, old, None).await;
        set_inserted_at(&store, old, "2000-01-01 00:00:00.000").await;
        set_updated_at(&store, new, Some("2001-01-01 00:00:00.000")).await;

        store.insert_message_pair(old, "hi", "hello").await.unwrap();

        let rows = store.recent_chat_rows(20).await.unwrap();
        assert_eq!(rows[0].chat_id, old);
        assert_eq!(rows[0].last_message.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn chat_card_and_persona_rows() {
        let store = test_store().await;
        let card = store.insert_card("a.png").await.unwrap();
        let persona = store.insert_persona("Bo", "", false).await.unwrap();
        let with = store.create_chat(card, Some(persona), None).await.unwrap();
        let without = store.create_chat(card, None, None).await.unwrap();

        assert_eq!(store.chat_card_row(with).await.unwrap().unwrap().id, card);
        assert_eq!(
            store.chat_persona_row(with).await.unwrap().unwrap().name,
            "Bo"
        );
        assert!(store.chat_persona_row(without).await.unwrap().is_none());
        assert!(store.chat_card_row(ChatId(999)).await.unwrap().is_none());
    }
}
