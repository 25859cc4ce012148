use std::collections::HashMap;

use recall_llm::EmbeddingProvider;

use crate::blob::{BlobStore, CardData, PersonaForm};
use crate::bundle::{BundleAssembler, CardBundle, RecentChat};
use crate::collections::VectorCollectionStore;
use crate::error::MemoryError;
use crate::sqlite::{DEFAULT_HISTORY_LIMIT, DEFAULT_RECENT_CHATS_LIMIT, SqliteStore};
use crate::types::{CardId, ChatId, ChatMessage, MessageId, PersonaId, SenderType};
use crate::vector_store::Payload;

/// Hits fetched per requested result before filtering to the current chat.
const RECALL_OVERFETCH: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct RecalledMessage {
    pub message: ChatMessage,
    pub score: f32,
}

/// The card of a chat together with the past messages most similar to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallBundle {
    pub card: CardBundle,
    pub hits: Vec<RecalledMessage>,
}

/// Keeps rows, blobs and vector collections in step.
///
/// Relational writes are authoritative. Vector writes that follow them are
/// best-effort: a failed embedding is logged and the row stays.
pub struct Memory<C, P, E> {
    sqlite: SqliteStore,
    vectors: VectorCollectionStore,
    cards: C,
    personas: P,
    embedder: E,
    history_limit: u32,
    recent_chats_limit: u32,
}

impl<C, P, E> std::fmt::Debug for Memory<C, P, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("sqlite", &self.sqlite)
            .field("vectors", &self.vectors)
            .field("history_limit", &self.history_limit)
            .field("recent_chats_limit", &self.recent_chats_limit)
            .finish_non_exhaustive()
    }
}

fn message_payload(chat_id: ChatId, sender: SenderType, text: &str) -> Payload {
    HashMap::from([
        ("chat_id".to_owned(), serde_json::json!(chat_id.0)),
        ("sender".to_owned(), serde_json::json!(sender.as_str())),
        ("text".to_owned(), serde_json::json!(text)),
    ])
}

impl<C, P, E> Memory<C, P, E>
where
    C: BlobStore<CardData>,
    P: BlobStore<PersonaForm>,
    E: EmbeddingProvider,
{
    #[must_use]
    pub fn new(
        sqlite: SqliteStore,
        vectors: VectorCollectionStore,
        cards: C,
        personas: P,
        embedder: E,
    ) -> Self {
        Self {
            sqlite,
            vectors,
            cards,
            personas,
            embedder,
            history_limit: DEFAULT_HISTORY_LIMIT,
            recent_chats_limit: DEFAULT_RECENT_CHATS_LIMIT,
        }
    }

    /// Page sizes used by [`history`](Self::history) and
    /// [`recent_chats`](Self::recent_chats).
    #[must_use]
    pub fn with_limits(mut self, history_limit: u32, recent_chats_limit: u32) -> Self {
        self.history_limit = history_limit;
        self.recent_chats_limit = recent_chats_limit;
        self
    }

    #[must_use]
    pub fn sqlite(&self) -> &SqliteStore {
        &self.sqlite
    }

    #[must_use]
    pub fn vectors(&self) -> &VectorCollectionStore {
        &self.vectors
    }

    #[must_use]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    #[must_use]
    pub fn card_blobs(&self) -> &C {
        &self.cards
    }

    #[must_use]
    pub fn persona_blobs(&self) -> &P {
        &self.personas
    }

    /// Read-side view over the facade's stores.
    #[must_use]
    pub fn bundles(&self) -> BundleAssembler<'_, C, P> {
        BundleAssembler::new(&self.sqlite, &self.cards, &self.personas)
    }

    /// One page of a chat's history using the configured page size.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn history(
        &self,
        chat_id: ChatId,
        start_id: Option<MessageId>,
    ) -> Result<Vec<ChatMessage>, MemoryError> {
        self.sqlite
            .chat_history(chat_id, start_id, self.history_limit)
            .await
    }

    /// Most recently active chats, capped at the configured count.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or any blob lookup fails.
    pub async fn recent_chats(&self) -> Result<Vec<RecentChat>, MemoryError> {
        self.bundles().recent_chats(self.recent_chats_limit).await
    }

    /// Register a card whose blob is already stored under `file_name`, and create its
    /// vector collection.
    ///
    /// # Errors
    ///
    /// Returns an error if either step fails; the row is removed again when the
    /// collection cannot be created.
    pub async fn create_card(&self, file_name: &str) -> Result<CardId, MemoryError> {
        let id = self.sqlite.insert_card(file_name).await?;
        if let Err(e) = self.vectors.create_collection(id).await {
            tracing::warn!(card_id = %id, "collection create failed, removing card row: {e}");
            self.sqlite.delete_card(id).await?;
            return Err(e);
        }
        tracing::info!(card_id = %id, file_name, "card created");
        Ok(id)
    }

    /// Delete a card's vector collection, then the card with its chats and messages.
    ///
    /// Returns `false` when the card did not exist. The row survives when the
    /// collection cannot be dropped, so a retry still finds both.
    ///
    /// # Errors
    ///
    /// Returns an error if the index service is unreachable or the row delete fails.
    pub async fn delete_card(&self, id: CardId) -> Result<bool, MemoryError> {
        match self.vectors.delete_collection(id).await {
            Ok(_) => {}
            Err(MemoryError::NotFound(_)) => {
                tracing::warn!(card_id = %id, "no vector collection to delete");
            }
            Err(e) => return Err(e),
        }
        let existed = self.sqlite.delete_card(id).await?;
        if existed {
            tracing::info!(card_id = %id, "card deleted");
        }
        Ok(existed)
    }

    /// Create a persona row and store its form in blob storage.
    ///
    /// Personas own no vector collection: collection names are bare row IDs and
    /// belong to cards.
    ///
    /// # Errors
    ///
    /// Returns an error if the row or blob step fails. The row is removed again
    /// when the blob cannot be stored.
    pub async fn create_persona(&self, form: PersonaForm) -> Result<PersonaId, MemoryError> {
        let id = self
            .sqlite
            .insert_persona(&form.name, &form.description, form.is_default)
            .await?;

        let name = form.name.clone();
        if let Err(source) = self.personas.post(form).await {
            tracing::warn!(persona_id = %id, "persona blob write failed, removing row: {source}");
            self.sqlite.delete_persona(id).await?;
            return Err(MemoryError::BlobLookupFailed { key: name, source });
        }

        tracing::info!(persona_id = %id, name = %name, "persona created");
        Ok(id)
    }

    /// Overwrite a persona's blob, then its row.
    ///
    /// The blob goes first so the row never names a key the blob store does not
    /// hold. If the row update fails the previous blob is put back.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotFound`] for an unknown persona and
    /// [`MemoryError::BlobLookupFailed`] if its blob cannot be read or replaced.
    pub async fn update_persona(&self, id: PersonaId, form: PersonaForm) -> Result<(), MemoryError> {
        let current = self
            .sqlite
            .persona_by_id(id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("persona {id}")))?;
        let blob = self
            .personas
            .get(&current.name)
            .await
            .map_err(|source| MemoryError::BlobLookupFailed {
                key: current.name.clone(),
                source,
            })?;

        let (name, description, is_default) =
            (form.name.clone(), form.description.clone(), form.is_default);
        self.personas
            .put(blob.id, form)
            .await
            .map_err(|source| MemoryError::BlobLookupFailed {
                key: current.name.clone(),
                source,
            })?;

        let updated = self
            .sqlite
            .update_persona(id, &name, &description, is_default)
            .await
            .and_then(|found| {
                if found {
                    Ok(())
                } else {
                    Err(MemoryError::NotFound(format!("persona {id}")))
                }
            });
        if let Err(e) = updated {
            tracing::warn!(persona_id = %id, "persona row update failed, restoring blob: {e}");
            if let Err(restore) = self.personas.put(blob.id, blob.data).await {
                tracing::warn!(persona_id = %id, "failed to restore persona blob: {restore}");
            }
            return Err(e);
        }
        tracing::debug!(persona_id = %id, name = %name, "persona updated");
        Ok(())
    }

    /// Delete a persona. Chats that used it lose the reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the row delete fails.
    pub async fn delete_persona(&self, id: PersonaId) -> Result<bool, MemoryError> {
        self.sqlite.delete_persona(id).await
    }

    /// Start a chat with a card, opening with the card's greeting if it has one.
    ///
    /// The greeting is indexed like any other character line; a failed embedding
    /// is logged and the chat stays.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotFound`] for an unknown card and
    /// [`MemoryError::BlobLookupFailed`] if the card blob cannot be read.
    pub async fn start_chat(
        &self,
        card_id: CardId,
        persona_id: Option<PersonaId>,
    ) -> Result<ChatId, MemoryError> {
        let card = self.bundles().card_bundle_by_id(card_id).await?;
        let greeting = card.data.character.greeting.trim();
        let greeting = (!greeting.is_empty()).then_some(greeting);
        let chat = self.sqlite.create_chat(card_id, persona_id, greeting).await?;
        tracing::info!(chat_id = %chat, card_id = %card_id, "chat started");

        if let Some(text) = greeting {
            match self.sqlite.chat_message_ids(chat).await {
                Ok(ids) => {
                    if let Some(&first) = ids.first()
                        && let Err(e) = self
                            .embed_message(card_id, chat, first, SenderType::Character, text)
                            .await
                    {
                        tracing::warn!(message_id = %first, "failed to store greeting embedding: {e}");
                    }
                }
                Err(e) => tracing::warn!(chat_id = %chat, "greeting lookup failed, skipping embedding: {e}"),
            }
        }
        Ok(chat)
    }

    /// Persist one exchange and index both lines in the card's collection.
    ///
    /// # Errors
    ///
    /// Returns an error only if the relational write fails.
    pub async fn record_turn(
        &self,
        chat_id: ChatId,
        user_text: &str,
        character_text: &str,
    ) -> Result<(MessageId, MessageId), MemoryError> {
        let (user_id, character_id) = self
            .sqlite
            .insert_message_pair(chat_id, user_text, character_text)
            .await?;

        match self.sqlite.chat_card_row(chat_id).await {
            Ok(Some(card)) => {
                for (id, sender, text) in [
                    (user_id, SenderType::User, user_text),
                    (character_id, SenderType::Character, character_text),
                ] {
                    if let Err(e) = self.embed_message(card.id, chat_id, id, sender, text).await {
                        tracing::warn!(message_id = %id, "failed to store message embedding: {e}");
                    }
                }
            }
            Ok(None) => tracing::warn!(chat_id = %chat_id, "chat has no card, skipping embeddings"),
            Err(e) => tracing::warn!(chat_id = %chat_id, "card lookup failed, skipping embeddings: {e}"),
        }

        Ok((user_id, character_id))
    }

    async fn embed_message(
        &self,
        card_id: CardId,
        chat_id: ChatId,
        message_id: MessageId,
        sender: SenderType,
        text: &str,
    ) -> Result<(), MemoryError> {
        let vector = self.embedder.embed(text).await?;
        self.vectors
            .insert_record(card_id, message_id.0, vector, message_payload(chat_id, sender, text))
            .await
    }

    /// Messages of this chat most similar to `query`, best first, with the chat's card.
    ///
    /// Points whose messages no longer exist are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the chat or card is missing, embedding fails, or the
    /// vector search fails.
    pub async fn recall(
        &self,
        chat_id: ChatId,
        query: &str,
        limit: usize,
    ) -> Result<RecallBundle, MemoryError> {
        let card = self.bundles().card_bundle(chat_id).await?;
        if limit == 0 {
            return Ok(RecallBundle {
                card,
                hits: Vec::new(),
            });
        }

        let query_vector = self.embedder.embed(query).await?;
        let hits = self
            .vectors
            .search(card.id, query_vector, limit.saturating_mul(RECALL_OVERFETCH))
            .await?;

        let ids: Vec<MessageId> = hits.iter().map(|h| MessageId(h.id)).collect();
        let messages: HashMap<MessageId, ChatMessage> = self
            .sqlite
            .messages_by_ids(&ids)
            .await?
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| (m.id, m))
            .collect();

        let recalled: Vec<RecalledMessage> = hits
            .iter()
            .filter_map(|h| {
                messages.get(&MessageId(h.id)).map(|m| RecalledMessage {
                    message: m.clone(),
                    score: h.score,
                })
            })
            .take(limit)
            .collect();
        tracing::debug!(chat_id = %chat_id, hits = recalled.len(), "recall");

        Ok(RecallBundle {
            card,
            hits: recalled,
        })
    }

    /// Delete one message and its point.
    ///
    /// # Errors
    ///
    /// Returns an error if the relational delete fails.
    pub async fn delete_message(&self, id: MessageId) -> Result<(), MemoryError> {
        let Some(message) = self.sqlite.message_by_id(id).await? else {
            return Ok(());
        };
        let card = self.sqlite.chat_card_row(message.chat_id).await?;
        self.sqlite.delete_message(id).await?;
        if let Some(card) = card {
            self.prune(card.id, &[id]).await;
        }
        Ok(())
    }

    /// Trim a chat back to its first message and drop the removed messages' points.
    ///
    /// # Errors
    ///
    /// Returns an error if the relational delete fails.
    pub async fn reset_chat(&self, chat_id: ChatId) -> Result<Vec<MessageId>, MemoryError> {
        let card = self.sqlite.chat_card_row(chat_id).await?;
        let removed = self.sqlite.reset_chat(chat_id).await?;
        if let Some(card) = card {
            self.prune(card.id, &removed).await;
        }
        Ok(removed)
    }

    /// Delete a chat, its messages and their points.
    ///
    /// # Errors
    ///
    /// Returns an error if the relational delete fails.
    pub async fn delete_chat(&self, chat_id: ChatId) -> Result<(), MemoryError> {
        let card = self.sqlite.chat_card_row(chat_id).await?;
        let ids = self.sqlite.chat_message_ids(chat_id).await?;
        self.sqlite.delete_chat(chat_id).await?;
        if let Some(card) = card {
            self.prune(card.id, &ids).await;
        }
        Ok(())
    }

    async fn prune(&self, card_id: CardId, ids: &[MessageId]) {
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        if let Err(e) = self.vectors.delete_records(card_id, &raw).await {
            tracing::warn!(card_id = %card_id, "failed to prune message points: {e}");
        }
    }
}
