use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppError, AppResult};

use super::Message;

// Instants are stored as unix milliseconds so range predicates compare
// numerically.
const CREATE_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    username TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    ttl_seconds INTEGER,
    expires_at INTEGER,
    file_path TEXT,
    file_name TEXT,
    file_size INTEGER
)";

const COLUMNS: &str =
    "id,content,username,timestamp,ttl_seconds,expires_at,file_path,file_name,file_size";

pub async fn init(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query(CREATE_TABLE).execute(pool).await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    content: String,
    username: String,
    timestamp: i64,
    ttl_seconds: Option<i64>,
    expires_at: Option<i64>,
    file_path: Option<String>,
    file_name: Option<String>,
    file_size: Option<i64>,
}

fn instant(millis: i64) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::Storage(format!("timestamp out of range: {millis}")))
}

impl TryFrom<MessageRow> for Message {
    type Error = AppError;

    fn try_from(row: MessageRow) -> AppResult<Message> {
        Ok(Message {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Storage(format!("bad message id {}: {e}", row.id)))?,
            content: row.content,
            username: row.username,
            timestamp: instant(row.timestamp)?,
            ttl_seconds: row.ttl_seconds,
            expires_at: row.expires_at.map(instant).transpose()?,
            file_path: row.file_path,
            file_name: row.file_name,
            file_size: row.file_size,
        })
    }
}

pub async fn insert(pool: &SqlitePool, message: &Message) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO messages (id,content,username,timestamp,ttl_seconds,expires_at,file_path,file_name,file_size) \
         VALUES (?,?,?,?,?,?,?,?,?)",
    )
    .bind(message.id.to_string())
    .bind(&message.content)
    .bind(&message.username)
    .bind(message.timestamp.timestamp_millis())
    .bind(message.ttl_seconds)
    .bind(message.expires_at.map(|t| t.timestamp_millis()))
    .bind(&message.file_path)
    .bind(&message.file_name)
    .bind(message.file_size)
    .execute(pool)
    .await?;
    Ok(())
}

/// All messages still live at `now`, oldest first. Pure read.
pub async fn find_live(pool: &SqlitePool, now: DateTime<Utc>) -> AppResult<Vec<Message>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM messages \
         WHERE expires_at IS NULL OR expires_at > ? \
         ORDER BY timestamp ASC"
    );
    let rows: Vec<MessageRow> = sqlx::query_as(&sql)
        .bind(now.timestamp_millis())
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(Message::try_from).collect()
}

/// Messages whose TTL has lapsed at `now`. Null `expires_at` never matches.
pub async fn find_expired(pool: &SqlitePool, now: DateTime<Utc>) -> AppResult<Vec<Message>> {
    let sql =
        format!("SELECT {COLUMNS} FROM messages WHERE expires_at IS NOT NULL AND expires_at <= ?");
    let rows: Vec<MessageRow> = sqlx::query_as(&sql)
        .bind(now.timestamp_millis())
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(Message::try_from).collect()
}

/// Bulk-delete everything expired at `now`, returning the row count.
pub async fn delete_expired(pool: &SqlitePool, now: DateTime<Utc>) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM messages WHERE expires_at IS NOT NULL AND expires_at <= ?")
        .bind(now.timestamp_millis())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_all(pool: &SqlitePool) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM messages").execute(pool).await?;
    Ok(result.rows_affected())
}

/// Download-by-reference lookup: the caller hands us the uuid half of a
/// storage key, which is unique per attachment.
pub async fn find_by_file_id(pool: &SqlitePool, file_id: Uuid) -> AppResult<Option<Message>> {
    let sql = format!("SELECT {COLUMNS} FROM messages WHERE file_path LIKE ? LIMIT 1");
    let row: Option<MessageRow> = sqlx::query_as(&sql)
        .bind(format!("{file_id}%"))
        .fetch_optional(pool)
        .await?;
    row.map(Message::try_from).transpose()
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Duration;

    use super::*;

    // One connection, or every pooled connection gets its own :memory: db.
    pub(crate) async fn pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init(&pool).await.unwrap();
        pool
    }

    pub(crate) fn message(content: &str, ttl_seconds: Option<i64>) -> Message {
        let timestamp = Utc::now();
        Message {
            id: Uuid::new_v4(),
            content: content.to_owned(),
            username: "ghost".to_owned(),
            timestamp,
            ttl_seconds,
            expires_at: ttl_seconds.map(|ttl| timestamp + Duration::seconds(ttl)),
            file_path: None,
            file_name: None,
            file_size: None,
        }
    }

    fn expired_message(content: &str) -> Message {
        let mut msg = message(content, Some(60));
        msg.timestamp = Utc::now() - Duration::seconds(120);
        msg.expires_at = Some(msg.timestamp + Duration::seconds(60));
        msg
    }

    #[tokio::test]
    async fn find_live_filters_expired_and_orders_by_timestamp() {
        let pool = pool().await;
        let mut old = message("old", None);
        old.timestamp = Utc::now() - Duration::seconds(30);
        let fresh = message("fresh", Some(600));
        let gone = expired_message("gone");

        insert(&pool, &fresh).await.unwrap();
        insert(&pool, &old).await.unwrap();
        insert(&pool, &gone).await.unwrap();

        let now = Utc::now();
        // The model's liveness rule and the SQL predicate must agree.
        assert!(old.is_live(now));
        assert!(fresh.is_live(now));
        assert!(!gone.is_live(now));

        let live = find_live(&pool, now).await.unwrap();
        let contents: Vec<_> = live.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["old", "fresh"]);
    }

    #[tokio::test]
    async fn delete_expired_never_touches_messages_without_ttl() {
        let pool = pool().await;
        insert(&pool, &message("keep", None)).await.unwrap();
        insert(&pool, &expired_message("drop")).await.unwrap();

        let deleted = delete_expired(&pool, Utc::now()).await.unwrap();
        assert_eq!(deleted, 1);

        let live = find_live(&pool, Utc::now()).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].content, "keep");
    }

    #[tokio::test]
    async fn second_sweep_deletes_nothing() {
        let pool = pool().await;
        insert(&pool, &expired_message("drop")).await.unwrap();

        assert_eq!(delete_expired(&pool, Utc::now()).await.unwrap(), 1);
        assert_eq!(delete_expired(&pool, Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_all_wipes_regardless_of_ttl() {
        let pool = pool().await;
        insert(&pool, &message("a", None)).await.unwrap();
        insert(&pool, &message("b", Some(600))).await.unwrap();

        assert_eq!(delete_all(&pool).await.unwrap(), 2);
        assert!(find_live(&pool, Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_by_file_id_matches_storage_key_prefix() {
        let pool = pool().await;
        let file_id = Uuid::new_v4();
        let mut msg = message("with file", Some(600));
        msg.file_path = Some(format!("{file_id}.txt"));
        msg.file_name = Some("report.txt".to_owned());
        insert(&pool, &msg).await.unwrap();

        let found = find_by_file_id(&pool, file_id).await.unwrap().unwrap();
        assert_eq!(found.id, msg.id);
        assert!(
            find_by_file_id(&pool, Uuid::new_v4())
                .await
                .unwrap()
                .is_none()
        );
    }
}
