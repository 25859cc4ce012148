//! Render-ready aggregates joining relational rows with blob lookups.
//!
//! Nothing is cached: every call re-reads both stores, so a bundle always
//! reflects the rows at the moment it was assembled.

use serde::Serialize;

use crate::blob::{BlobEntry, BlobError, BlobStore, CardData, PersonaForm};
use crate::error::MemoryError;
use crate::sqlite::{ChatSummaryRow, SqliteStore};
use crate::types::{CardId, ChatId, PersonaRow};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSearchItem {
    pub id: ChatId,
    pub character_name: String,
    /// Empty when the card has no avatar.
    pub character_avatar_uri: String,
    pub last_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentChat {
    pub chat_id: ChatId,
    pub last_message: Option<String>,
    pub name: String,
    pub avatar_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardBundle {
    pub id: CardId,
    pub file_name: String,
    pub data: CardData,
    pub avatar_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaBundle {
    pub data: PersonaRow,
    pub avatar_uri: Option<String>,
}

pub struct BundleAssembler<'a, C, P> {
    sqlite: &'a SqliteStore,
    cards: &'a C,
    personas: &'a P,
}

impl<C, P> std::fmt::Debug for BundleAssembler<'_, C, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleAssembler").finish_non_exhaustive()
    }
}

async fn lookup<D, S: BlobStore<D>>(store: &S, key: &str) -> Result<BlobEntry<D>, MemoryError> {
    store.get(key).await.map_err(|source: BlobError| {
        tracing::warn!(key, "blob lookup failed: {source}");
        MemoryError::BlobLookupFailed {
            key: key.to_owned(),
            source,
        }
    })
}

impl<'a, C, P> BundleAssembler<'a, C, P>
where
    C: BlobStore<CardData>,
    P: BlobStore<PersonaForm>,
{
    #[must_use]
    pub fn new(sqlite: &'a SqliteStore, cards: &'a C, personas: &'a P) -> Self {
        Self {
            sqlite,
            cards,
            personas,
        }
    }

    /// One entry per chat, newest chat first.
    ///
    /// # Errors
    ///
    /// Fails on the first query or blob lookup failure.
    pub async fn chat_search_items(&self) -> Result<Vec<ChatSearchItem>, MemoryError> {
        let rows = self.sqlite.chat_search_rows().await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let card = lookup(self.cards, &row.file_name).await?;
            items.push(ChatSearchItem {
                id: row.chat_id,
                character_name: card.data.character.name,
                character_avatar_uri: card.avatar_uri.unwrap_or_default(),
                last_message: row.last_message,
            });
        }
        Ok(items)
    }

    /// Up to `limit` chats, most recently active first.
    ///
    /// # Errors
    ///
    /// Any failure yields an error instead of a partial list.
    pub async fn recent_chats(&self, limit: u32) -> Result<Vec<RecentChat>, MemoryError> {
        let rows = self.sqlite.recent_chat_rows(limit).await?;
        let mut chats = Vec::with_capacity(rows.len());
        for ChatSummaryRow {
            chat_id,
            file_name,
            last_message,
            ..
        } in rows
        {
            let card = lookup(self.cards, &file_name).await?;
            chats.push(RecentChat {
                chat_id,
                last_message,
                name: card.data.character.name,
                avatar_uri: card.avatar_uri,
            });
        }
        Ok(chats)
    }

    /// # Errors
    ///
    /// Returns [`MemoryError::NotFound`] if the chat is missing or has no persona,
    /// and [`MemoryError::BlobLookupFailed`] if the persona blob cannot be read.
    pub async fn persona_bundle(&self, chat_id: ChatId) -> Result<PersonaBundle, MemoryError> {
        let row = self
            .sqlite
            .chat_persona_row(chat_id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("persona for chat {chat_id}")))?;
        let blob = lookup(self.personas, &row.name).await?;
        Ok(PersonaBundle {
            data: row,
            avatar_uri: blob.avatar_uri,
        })
    }

    /// # Errors
    ///
    /// Returns [`MemoryError::NotFound`] if the chat is missing and
    /// [`MemoryError::BlobLookupFailed`] if the card blob cannot be read.
    pub async fn card_bundle(&self, chat_id: ChatId) -> Result<CardBundle, MemoryError> {
        let row = self
            .sqlite
            .chat_card_row(chat_id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("card for chat {chat_id}")))?;
        let blob = lookup(self.cards, &row.file_name).await?;
        Ok(CardBundle {
            id: row.id,
            file_name: row.file_name,
            data: blob.data,
            avatar_uri: blob.avatar_uri,
        })
    }

    /// Bundle for a card by its own ID.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotFound`] if the card is missing.
    pub async fn card_bundle_by_id(&self, card_id: CardId) -> Result<CardBundle, MemoryError> {
        let row = self
            .sqlite
            .card_by_id(card_id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("card {card_id}")))?;
        let blob = lookup(self.cards, &row.file_name).await?;
        Ok(CardBundle {
            id: row.id,
            file_name: row.file_name,
            data: blob.data,
            avatar_uri: blob.avatar_uri,
        })
    }

    /// Every card, in ID order. Stops at the first blob failure.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::BlobLookupFailed`] for the first card whose blob is unreadable.
    pub async fn card_bundles(&self) -> Result<Vec<CardBundle>, MemoryError> {
        let rows = self.sqlite.card_rows().await?;
        let mut bundles = Vec::with_capacity(rows.len());
        for row in rows {
            let blob = lookup(self.cards, &row.file_name).await?;
            bundles.push(CardBundle {
                id: row.id,
                file_name: row.file_name,
                data: blob.data,
                avatar_uri: blob.avatar_uri,
            });
        }
        Ok(bundles)
    }

    /// Every persona, in ID order. Stops at the first blob failure.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::BlobLookupFailed`] for the first persona whose blob is unreadable.
    pub async fn persona_bundles(&self) -> Result<Vec<PersonaBundle>, MemoryError> {
        let rows = self.sqlite.persona_rows().await?;
        let mut bundles = Vec::with_capacity(rows.len());
        for row in rows {
            let blob = lookup(self.personas, &row.name).await?;
            bundles.push(PersonaBundle {
                data: row,
                avatar_uri: blob.avatar_uri,
            });
        }
        Ok(bundles)
    }
}
