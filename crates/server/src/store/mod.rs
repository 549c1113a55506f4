//! Message persistence.
//!
//! The delivery path treats the durable store as an external collaborator
//! behind [`MessageStore`]; the production implementation is SQLite via
//! sqlx. Messages are written once and never mutated or deleted.

pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;

use duplex_common::Message;

/// A message as handed to the store, before persistence assigns the
/// durable id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message, returning the full record with id and timestamp.
    async fn save(&self, new: NewMessage) -> anyhow::Result<Message>;

    /// All messages exchanged between the two users, in either direction,
    /// ordered by creation time.
    async fn history(&self, user_a: &str, user_b: &str) -> anyhow::Result<Vec<Message>>;
}
