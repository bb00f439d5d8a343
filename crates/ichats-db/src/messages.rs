use crate::{bool_from_any_row, datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use ichats_models::message::{Message, MessageKind, NewMessage};
use sqlx::Row;

/// Upper bound on ids bound into a single `IN (...)` list.
const MAX_IDS_PER_STATEMENT: usize = 500;

const MESSAGE_COLUMNS: &str = "id, sender_id, sender_username, recipient_id, content, kind, file_name, file_type, file_size, sent_at, delivered, is_read";

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: String,
    pub sender_username: String,
    pub recipient_id: String,
    pub content: String,
    pub kind: String,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub sent_at: DateTime<Utc>,
    pub delivered: bool,
    pub read: bool,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for MessageRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let sent_at_raw: String = row.try_get("sent_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            sender_id: row.try_get("sender_id")?,
            sender_username: row.try_get("sender_username")?,
            recipient_id: row.try_get("recipient_id")?,
            content: row.try_get("content")?,
            kind: row.try_get("kind")?,
            file_name: row.try_get("file_name")?,
            file_type: row.try_get("file_type")?,
            file_size: row.try_get("file_size")?,
            sent_at: datetime_from_db_text(&sent_at_raw)?,
            delivered: bool_from_any_row(row, "delivered")?,
            read: bool_from_any_row(row, "is_read")?,
        })
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        let kind = MessageKind::parse(&row.kind).unwrap_or_else(|| {
            tracing::warn!(message_id = row.id, kind = %row.kind, "unknown stored message kind, treating as text");
            MessageKind::Text
        });
        Message {
            id: row.id,
            sender_id: row.sender_id,
            sender_username: row.sender_username,
            recipient_id: row.recipient_id,
            content: row.content,
            kind,
            file_name: row.file_name,
            file_type: row.file_type,
            file_size: row.file_size,
            timestamp: row.sent_at,
            delivered: row.delivered,
            read: row.read,
        }
    }
}

pub async fn insert_message(
    pool: &DbPool,
    id: i64,
    message: &NewMessage,
) -> Result<MessageRow, DbError> {
    let sql = format!(
        "INSERT INTO messages (id, sender_id, sender_username, recipient_id, content, kind, file_name, file_type, file_size, sent_at, delivered, is_read)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0)
         RETURNING {MESSAGE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(id)
        .bind(&message.sender_id)
        .bind(&message.sender_username)
        .bind(&message.recipient_id)
        .bind(&message.content)
        .bind(message.kind.as_str())
        .bind(message.file_name.as_deref())
        .bind(message.file_type.as_deref())
        .bind(message.file_size)
        .bind(datetime_to_db_text(message.timestamp))
        .bind(i32::from(message.delivered))
        .fetch_one(pool)
        .await?;
    Ok(row)
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
    let row = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Every message addressed to `recipient_id` that has not been delivered yet,
/// oldest first. Unbounded: this backs the at-least-once delivery guarantee.
pub async fn get_undelivered_for_recipient(
    pool: &DbPool,
    recipient_id: &str,
) -> Result<Vec<MessageRow>, DbError> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE recipient_id = $1 AND delivered = 0
         ORDER BY sent_at ASC, id ASC"
    );
    let rows = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(recipient_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Flip `delivered` for the given ids. Rows that are already delivered are
/// left untouched, so the flag changes at most once per message. All chunks
/// commit together.
pub async fn mark_delivered(pool: &DbPool, ids: &[i64]) -> Result<u64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut tx = pool.begin().await?;
    let mut updated = 0;
    for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
        let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("${}", i)).collect();
        let sql = format!(
            "UPDATE messages SET delivered = 1 WHERE id IN ({}) AND delivered = 0",
            placeholders.join(", ")
        );
        let mut query = sqlx::query(&sql);
        for id in chunk {
            query = query.bind(*id);
        }
        updated += query.execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(updated)
}

/// Mark messages as read. Only messages addressed to `recipient_id` are
/// affected; ids belonging to other conversations are ignored.
pub async fn mark_read(pool: &DbPool, recipient_id: &str, ids: &[i64]) -> Result<u64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut tx = pool.begin().await?;
    let mut updated = 0;
    for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
        let placeholders: Vec<String> =
            (2..=chunk.len() + 1).map(|i| format!("${}", i)).collect();
        let sql = format!(
            "UPDATE messages SET is_read = 1 WHERE recipient_id = $1 AND id IN ({}) AND is_read = 0",
            placeholders.join(", ")
        );
        let mut query = sqlx::query(&sql).bind(recipient_id);
        for id in chunk {
            query = query.bind(*id);
        }
        updated += query.execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(updated)
}

/// The most recent `limit` messages exchanged between two users, returned
/// oldest first.
pub async fn get_conversation(
    pool: &DbPool,
    user_a: &str,
    user_b: &str,
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE (sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1)
         ORDER BY sent_at DESC, id DESC
         LIMIT $3"
    );
    let mut rows = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(user_a)
        .bind(user_b)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    rows.reverse();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_pool() -> DbPool {
        let pool = crate::create_pool("sqlite::memory:", 1).await.expect("pool");
        crate::run_migrations(&pool).await.expect("migrations");
        pool
    }

    fn new_message(from: &str, to: &str, content: &str, delivered: bool) -> NewMessage {
        NewMessage {
            sender_id: from.to_string(),
            sender_username: format!("{from}-name"),
            recipient_id: to.to_string(),
            content: content.to_string(),
            kind: MessageKind::Text,
            file_name: None,
            file_type: None,
            file_size: None,
            timestamp: Utc::now(),
            delivered,
        }
    }

    #[tokio::test]
    async fn insert_returns_stored_row() {
        let pool = test_pool().await;
        let mut msg = new_message("u1", "u2", "hello", true);
        msg.kind = MessageKind::File;
        msg.file_name = Some("a.pdf".into());
        msg.file_size = Some(2048);

        let row = insert_message(&pool, 42, &msg).await.expect("insert");
        assert_eq!(row.id, 42);
        assert!(row.delivered);
        assert!(!row.read);

        let message: Message = row.into();
        assert_eq!(message.kind, MessageKind::File);
        assert_eq!(message.file_name.as_deref(), Some("a.pdf"));
        assert_eq!(message.file_size, Some(2048));
    }

    #[tokio::test]
    async fn undelivered_are_ordered_and_scoped_to_recipient() {
        let pool = test_pool().await;
        let base = Utc::now();
        let mut late = new_message("u1", "u2", "second", false);
        late.timestamp = base + Duration::seconds(5);
        let mut early = new_message("u3", "u2", "first", false);
        early.timestamp = base;
        insert_message(&pool, 2, &late).await.unwrap();
        insert_message(&pool, 1, &early).await.unwrap();
        insert_message(&pool, 3, &new_message("u1", "u2", "seen", true))
            .await
            .unwrap();
        insert_message(&pool, 4, &new_message("u2", "u1", "other way", false))
            .await
            .unwrap();

        let rows = get_undelivered_for_recipient(&pool, "u2").await.unwrap();
        let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn mark_delivered_flips_each_row_once() {
        let pool = test_pool().await;
        insert_message(&pool, 1, &new_message("u1", "u2", "a", false))
            .await
            .unwrap();
        insert_message(&pool, 2, &new_message("u1", "u2", "b", true))
            .await
            .unwrap();

        assert_eq!(mark_delivered(&pool, &[1, 2]).await.unwrap(), 1);
        assert_eq!(mark_delivered(&pool, &[1, 2]).await.unwrap(), 0);
        assert_eq!(mark_delivered(&pool, &[]).await.unwrap(), 0);
        assert!(get_undelivered_for_recipient(&pool, "u2")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn mark_read_only_touches_recipient_messages() {
        let pool = test_pool().await;
        insert_message(&pool, 1, &new_message("u1", "u2", "to u2", true))
            .await
            .unwrap();
        insert_message(&pool, 2, &new_message("u2", "u1", "to u1", true))
            .await
            .unwrap();

        assert_eq!(mark_read(&pool, "u2", &[1, 2]).await.unwrap(), 1);
        assert!(get_message(&pool, 1).await.unwrap().unwrap().read);
        assert!(!get_message(&pool, 2).await.unwrap().unwrap().read);
        // read does not imply delivered changes
        assert!(get_message(&pool, 1).await.unwrap().unwrap().delivered);
    }

    #[tokio::test]
    async fn conversation_returns_latest_page_oldest_first() {
        let pool = test_pool().await;
        let base = Utc::now();
        for i in 0..5 {
            let (from, to) = if i % 2 == 0 { ("u1", "u2") } else { ("u2", "u1") };
            let mut msg = new_message(from, to, &format!("m{i}"), true);
            msg.timestamp = base + Duration::seconds(i);
            insert_message(&pool, 100 + i, &msg).await.unwrap();
        }
        insert_message(&pool, 999, &new_message("u1", "u3", "elsewhere", true))
            .await
            .unwrap();

        let rows = get_conversation(&pool, "u2", "u1", 3).await.unwrap();
        let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }
}
