use super::SqliteStore;
use crate::error::MemoryError;
use crate::types::{ChatId, ChatMessage, MessageId, SenderType};

type MessageTuple = (MessageId, ChatId, String, String, String);

fn message_from_tuple(
    (id, chat_id, text, sender, inserted_at): MessageTuple,
) -> Result<ChatMessage, MemoryError> {
    Ok(ChatMessage {
        id,
        chat_id,
        text,
        sender: sender.parse()?,
        inserted_at,
    })
}

impl SqliteStore {
    /// Append one message to a chat.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, e.g. the chat does not exist.
    pub async fn insert_message(
        &self,
        chat_id: ChatId,
        sender: SenderType,
        text: &str,
    ) -> Result<MessageId, MemoryError> {
        let id: MessageId = sqlx::query_scalar(
            "INSERT INTO messages (chat_id, text, sender_type) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(chat_id)
        .bind(text)
        .bind(sender.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Persist a user line and the character's reply atomically.
    ///
    /// Returns `(user_message_id, character_message_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::TransactionFailed`] if either insert fails; no row is
    /// left behind in that case.
    pub async fn insert_message_pair(
        &self,
        chat_id: ChatId,
        user_text: &str,
        character_text: &str,
    ) -> Result<(MessageId, MessageId), MemoryError> {
        let mut tx = self.pool.begin().await?;
        let ids = async {
            let mut ids = Vec::with_capacity(2);
            for (text, sender) in [
                (user_text, SenderType::User),
                (character_text, SenderType::Character),
            ] {
                let id: MessageId = sqlx::query_scalar(
                    "INSERT INTO messages (chat_id, text, sender_type) VALUES (?, ?, ?) RETURNING id",
                )
                .bind(chat_id)
                .bind(text)
                .bind(sender.as_str())
                .fetch_one(&mut *tx)
                .await?;
                ids.push(id);
            }
            Ok::<_, sqlx::Error>((ids[0], ids[1]))
        }
        .await
        .map_err(MemoryError::TransactionFailed)?;
        tx.commit().await.map_err(MemoryError::TransactionFailed)?;
        tracing::debug!(chat_id = %chat_id, user = %ids.0, character = %ids.1, "recorded turn");
        Ok(ids)
    }

    /// Delete one message. Deleting a missing message is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_message(&self, id: MessageId) -> Result<(), MemoryError> {
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete every message of a chat except the first one.
    ///
    /// Returns the IDs of the removed messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn reset_chat(&self, chat_id: ChatId) -> Result<Vec<MessageId>, MemoryError> {
        let removed: Vec<MessageId> = sqlx::query_scalar(
            "DELETE FROM messages \
             WHERE chat_id = ? \
               AND id != (SELECT MIN(id) FROM messages WHERE chat_id = ?) \
             RETURNING id",
        )
        .bind(chat_id)
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        tracing::debug!(chat_id = %chat_id, removed = removed.len(), "reset chat");
        Ok(removed)
    }

    /// One page of chat history, oldest first.
    ///
    /// Returns at most `limit` messages in ascending ID order, starting from the
    /// oldest message of the chat. `start_id`, when given, is an inclusive upper
    /// bound on the returned IDs.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn chat_history(
        &self,
        chat_id: ChatId,
        start_id: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, MemoryError> {
        let rows: Vec<MessageTuple> = sqlx::query_as(
            "SELECT id, chat_id, text, sender_type, inserted_at FROM messages \
             WHERE chat_id = ? AND (? IS NULL OR id <= ?) \
             ORDER BY id ASC \
             LIMIT ?",
        )
        .bind(chat_id)
        .bind(start_id)
        .bind(start_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(message_from_tuple).collect()
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn message_by_id(&self, id: MessageId) -> Result<Option<ChatMessage>, MemoryError> {
        let row: Option<MessageTuple> = sqlx::query_as(
            "SELECT id, chat_id, text, sender_type, inserted_at FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(message_from_tuple).transpose()
    }

    /// Fetch messages by a list of IDs in a single query, in ascending ID order.
    /// IDs with no row are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn messages_by_ids(&self, ids: &[MessageId]) -> Result<Vec<ChatMessage>, MemoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: String = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT id, chat_id, text, sender_type, inserted_at FROM messages \
             WHERE id IN ({placeholders}) ORDER BY id ASC"
        );
        let mut q = sqlx::query_as::<_, MessageTuple>(&query);
        for &id in ids {
            q = q.bind(id);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(message_from_tuple).collect()
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_messages(&self, chat_id: ChatId) -> Result<i64, MemoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// All message IDs of a chat, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn chat_message_ids(&self, chat_id: ChatId) -> Result<Vec<MessageId>, MemoryError> {
        let ids: Vec<MessageId> =
            sqlx::query_scalar("SELECT id FROM messages WHERE chat_id = ? ORDER BY id ASC")
                .bind(chat_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CardId;

    async fn test_store() -> SqliteStore {
        SqliteStore::new(":memory:").await.unwrap()
    }

    async fn chat_with_card(store: &SqliteStore) -> (CardId, ChatId) {
        let card = store.insert_card("card.png").await.unwrap();
        let chat = store.create_chat(card, None, None).await.unwrap();
        (card, chat)
    }

    async fn seed(store: &SqliteStore, chat: ChatId, n: usize) -> Vec<MessageId> {
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let sender = if i % 2 == 0 {
                SenderType::User
            } else {
                SenderType::Character
            };
            ids.push(
                store
                    .insert_message(chat, sender, &format!("msg {i}"))
                    .await
                    .unwrap(),
            );
        }
        ids
    }

    #[tokio::test]
    async fn insert_message_and_fetch() {
        let store = test_store().await;
        let (_, chat) = chat_with_card(&store).await;
        let id = store
            .insert_message(chat, SenderType::Character, "hello")
            .await
            .unwrap();
        let msg = store.message_by_id(id).await.unwrap().unwrap();
        assert_eq!(msg.chat_id, chat);
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.sender, SenderType::Character);
    }

    #[tokio::test]
    async fn message_pair_is_ordered() {
        let store = test_store().await;
        let (_, chat) = chat_with_card(&store).await;
        let (user, character) = store.insert_message_pair(chat, "q", "a").await.unwrap();
        assert!(user < character);

        let history = store.chat_history(chat, None, 25).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sender, SenderType::User);
        assert_eq!(history[1].sender, SenderType::Character);
    }

    #[tokio::test]
    async fn message_pair_rolls_back_when_second_insert_fails() {
        let store = test_store().await;
        let (_, chat) = chat_with_card(&store).await;
        sqlx::query(
            "CREATE TRIGGER reject_boom BEFORE INSERT ON messages \
             WHEN NEW.text = 'boom' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let err = store
            .insert_message_pair(chat, "fine", "boom")
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::TransactionFailed(_)));
        assert_eq!(store.count_messages(chat).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn message_pair_for_missing_chat_fails() {
        let store = test_store().await;
        let err = store
            .insert_message_pair(ChatId(77), "a", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::TransactionFailed(_)));
    }

    #[tokio::test]
    async fn reset_chat_keeps_first_message() {
        let store = test_store().await;
        let (_, chat) = chat_with_card(&store).await;
        let ids = seed(&store, chat, 3).await;

        let mut removed = store.reset_chat(chat).await.unwrap();
        removed.sort();
        assert_eq!(removed, vec![ids[1], ids[2]]);
        assert_eq!(store.chat_message_ids(chat).await.unwrap(), vec![ids[0]]);
    }

    #[tokio::test]
    async fn reset_chat_leaves_other_chats_alone() {
        let store = test_store().await;
        let (card, chat) = chat_with_card(&store).await;
        let other = store.create_chat(card, None, None).await.unwrap();
        seed(&store, chat, 2).await;
        seed(&store, other, 2).await;

        store.reset_chat(chat).await.unwrap();
        assert_eq!(store.count_messages(chat).await.unwrap(), 1);
        assert_eq!(store.count_messages(other).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn reset_empty_chat_is_noop() {
        let store = test_store().await;
        let (_, chat) = chat_with_card(&store).await;
        assert!(store.reset_chat(chat).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_history_start_id_is_inclusive_upper_bound() {
        let store = test_store().await;
        let (_, chat) = chat_with_card(&store).await;
        let ids = seed(&store, chat, 5).await;

        let page = store.chat_history(chat, Some(ids[4]), 2).await.unwrap();
        let got: Vec<MessageId> = page.iter().map(|m| m.id).collect();
        assert_eq!(got, vec![ids[0], ids[1]]);

        let page = store.chat_history(chat, Some(ids[2]), 25).await.unwrap();
        let got: Vec<MessageId> = page.iter().map(|m| m.id).collect();
        assert_eq!(got, vec![ids[0], ids[1], ids[2]]);
    }

    #[tokio::test]
    async fn chat_history_without_start_returns_oldest_page() {
        let store = test_store().await;
        let (_, chat) = chat_with_card(&store).await;
        let ids = seed(&store, chat, 30).await;

        let page = store.chat_history(chat, None, 25).await.unwrap();
        assert_eq!(page.len(), 25);
        assert_eq!(page.first().unwrap().id, ids[0]);
        assert_eq!(page.last().unwrap().id, ids[24]);
        assert!(page.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn unknown_sender_in_row_surfaces_as_invariant_violation() {
        let store = test_store().await;
        let (_, chat) = chat_with_card(&store).await;
        sqlx::query("PRAGMA ignore_check_constraints = ON")
            .execute(store.pool())
            .await
            .unwrap();
        let id: MessageId = sqlx::query_scalar(
            "INSERT INTO messages (chat_id, text, sender_type) VALUES (?, 'hm', 'narrator') RETURNING id",
        )
        .bind(chat)
        .fetch_one(store.pool())
        .await
        .unwrap();

        let err = store.message_by_id(id).await.unwrap_err();
        assert!(matches!(err, MemoryError::InvariantViolation(_)));
        let err = store.chat_history(chat, None, 25).await.unwrap_err();
        assert!(matches!(err, MemoryError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn messages_by_ids_skips_missing() {
        let store = test_store().await;
        let (_, chat) = chat_with_card(&store).await;
        let ids = seed(&store, chat, 3).await;
        store.delete_message(ids[1]).await.unwrap();
        store.delete_message(ids[1]).await.unwrap();

        let found = store
            .messages_by_ids(&[ids[2], ids[1], ids[0]])
            .await
            .unwrap();
        let got: Vec<MessageId> = found.iter().map(|m| m.id).collect();
        assert_eq!(got, vec![ids[0], ids[2]]);
        assert!(store.messages_by_ids(&[]).await.unwrap().is_empty());
    }
}
