//! SQLite-backed message store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use duplex_common::Message;

use super::{MessageStore, NewMessage};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create the store on an existing pool, ensuring the schema exists.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                text TEXT,
                image_url TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create messages table")?;

        info!("[Store] messages table ready");

        Ok(Self { pool })
    }
}

fn row_to_message(row: SqliteRow) -> Result<Message> {
    let created_at: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .context("invalid created_at in messages table")?
        .with_timezone(&Utc);

    Ok(Message {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        receiver_id: row.get("receiver_id"),
        text: row.get("text"),
        image_url: row.get("image_url"),
        created_at,
    })
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn save(&self, new: NewMessage) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            text: new.text,
            image_url: new.image_url,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, text, image_url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&message.id)
        .bind(&message.sender_id)
        .bind(&message.receiver_id)
        .bind(&message.text)
        .bind(&message.image_url)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to insert message")?;

        Ok(message)
    }

    async fn history(&self, user_a: &str, user_b: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sender_id, receiver_id, text, image_url, created_at
            FROM messages
            WHERE (sender_id = ?1 AND receiver_id = ?2)
               OR (sender_id = ?2 AND receiver_id = ?1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_all(&self.pool)
        .await
        .context("failed to query message history")?;

        rows.into_iter().map(row_to_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    fn new_message(sender: &str, receiver: &str, text: &str) -> NewMessage {
        NewMessage {
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            text: Some(text.to_string()),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn save_assigns_id_and_timestamp() {
        let store = SqliteStore::new(memory_pool().await).await.unwrap();

        let saved = store.save(new_message("alice", "bob", "hi")).await.unwrap();
        assert!(!saved.id.is_empty());
        assert_eq!(saved.sender_id, "alice");
        assert_eq!(saved.receiver_id, "bob");
        assert_eq!(saved.text.as_deref(), Some("hi"));
        assert!(saved.image_url.is_none());
    }

    #[tokio::test]
    async fn history_covers_both_directions_in_order() {
        let store = SqliteStore::new(memory_pool().await).await.unwrap();

        let first = store.save(new_message("alice", "bob", "one")).await.unwrap();
        let second = store.save(new_message("bob", "alice", "two")).await.unwrap();
        // A message to a third user never shows up in this pair's history
        store.save(new_message("alice", "carol", "psst")).await.unwrap();

        let history = store.history("alice", "bob").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[1].id, second.id);

        // Symmetric regardless of argument order
        let mirrored = store.history("bob", "alice").await.unwrap();
        assert_eq!(history, mirrored);
    }
}
