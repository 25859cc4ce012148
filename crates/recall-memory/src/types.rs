use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
        )]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for EntityKey {
            fn from(id: $name) -> Self {
                EntityKey(id.0)
            }
        }
    };
}

row_id!(
    /// Strongly typed wrapper for chat row IDs.
    ChatId
);
row_id!(
    /// Strongly typed wrapper for message row IDs.
    MessageId
);
row_id!(
    /// Strongly typed wrapper for persona row IDs.
    PersonaId
);
row_id!(
    /// Strongly typed wrapper for character card row IDs.
    CardId
);

/// Identity of the entity that owns a vector collection.
///
/// The collection name is the stringified ID, so a card and a persona sharing the
/// same integer ID share a collection name. Callers key collections by one entity
/// class per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey(pub i64);

impl EntityKey {
    #[must_use]
    pub fn collection_name(self) -> String {
        self.0.to_string()
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityKey {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Character,
}

impl SenderType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Character => "character",
        }
    }
}

impl std::str::FromStr for SenderType {
    type Err = MemoryError;

    /// Parse the `sender_type` column. Any other text means the row was written
    /// around the schema and is reported as an invariant violation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "character" => Ok(Self::Character),
            other => Err(MemoryError::InvariantViolation(format!(
                "unknown sender type {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted chat message, as rendered in a chat history view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub text: String,
    pub sender: SenderType,
    pub inserted_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub card_id: CardId,
    pub persona_id: Option<PersonaId>,
    pub inserted_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRow {
    pub id: CardId,
    pub file_name: String,
    pub inserted_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaRow {
    pub id: PersonaId,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub inserted_at: String,
    pub updated_at: Option<String>,
}
