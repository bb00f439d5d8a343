use async_trait::async_trait;
use ichats_db::{messages, DbError, DbPool};
use ichats_models::message::{Message, NewMessage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable message log. Every message is appended before any delivery
/// attempt, and the delivered flag flips at most once.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message and return it with its assigned id.
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// All undelivered messages addressed to `user_id`, oldest first.
    async fn find_undelivered(&self, user_id: &str) -> Result<Vec<Message>, StoreError>;

    async fn mark_delivered(&self, ids: &[i64]) -> Result<u64, StoreError>;

    /// Flag messages as read. Ids not addressed to `recipient_id` are ignored.
    async fn mark_read(&self, recipient_id: &str, ids: &[i64]) -> Result<u64, StoreError>;

    /// Most recent `limit` messages between two users, oldest first.
    async fn conversation(
        &self,
        user_a: &str,
        user_b: &str,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError>;
}

/// [`MessageStore`] backed by the relational message table.
pub struct SqlMessageStore {
    pool: DbPool,
    worker_id: u16,
}

impl SqlMessageStore {
    pub fn new(pool: DbPool, worker_id: u16) -> Self {
        Self { pool, worker_id }
    }
}

#[async_trait]
impl MessageStore for SqlMessageStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        let id = ichats_util::snowflake::generate(self.worker_id);
        let row = messages::insert_message(&self.pool, id, &message).await?;
        Ok(row.into())
    }

    async fn find_undelivered(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        let rows = messages::get_undelivered_for_recipient(&self.pool, user_id).await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn mark_delivered(&self, ids: &[i64]) -> Result<u64, StoreError> {
        Ok(messages::mark_delivered(&self.pool, ids).await?)
    }

    async fn mark_read(&self, recipient_id: &str, ids: &[i64]) -> Result<u64, StoreError> {
        Ok(messages::mark_read(&self.pool, recipient_id, ids).await?)
    }

    async fn conversation(
        &self,
        user_a: &str,
        user_b: &str,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = messages::get_conversation(&self.pool, user_a, user_b, limit).await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }
}
