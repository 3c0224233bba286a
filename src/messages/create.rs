use axum::{Json, debug_handler, extract::Multipart, extract::State};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    AppError, AppResult, event::WireEvent, files::FileStore, registry::ConnectionRegistry,
    relay::Relay,
};

use super::{
    model::{DEFAULT_TTL_SECONDS, Message, NewMessage},
    store,
};

/// Validate and persist a new message, then fan it out.
///
/// The attachment hits disk before the row is written; a failed file write
/// aborts with nothing persisted, and a failed insert removes the file again
/// so no orphaned attachment is left behind. The relay runs after both, off
/// the request path.
pub async fn create_message(
    pool: &SqlitePool,
    files: &FileStore,
    registry: &ConnectionRegistry,
    relay: &Relay,
    new: NewMessage,
) -> AppResult<Message> {
    new.validate()?;

    let timestamp = Utc::now();
    let expires_at = match new.ttl_seconds {
        None => None,
        Some(ttl) => {
            let lifetime = Duration::try_seconds(ttl)
                .ok_or_else(|| AppError::Validation("ttl_seconds is out of range".to_owned()))?;
            Some(timestamp.checked_add_signed(lifetime).ok_or_else(|| {
                AppError::Validation("ttl_seconds is out of range".to_owned())
            })?)
        }
    };

    let stored = match &new.file {
        Some((file_name, data)) => {
            let (key, size) = files.save(file_name, data).await?;
            Some((key, file_name.clone(), size))
        }
        None => None,
    };
    let (file_path, file_name, file_size) = match stored {
        Some((key, name, size)) => (Some(key), Some(name), Some(size)),
        None => (None, None, None),
    };

    let message = Message {
        id: Uuid::new_v4(),
        content: new.content,
        username: new.username,
        timestamp,
        ttl_seconds: new.ttl_seconds,
        expires_at,
        file_path,
        file_name,
        file_size,
    };

    if let Err(err) = store::insert(pool, &message).await {
        if let Some(key) = &message.file_path {
            if let Err(cleanup) = files.delete(key).await {
                tracing::warn!(error = %cleanup, key = %key, "attachment left behind failed insert");
            }
        }
        return Err(err);
    }

    registry
        .broadcast(&WireEvent::NewMessage {
            message: message.clone(),
        })
        .await;

    if new.send_to_webhook {
        let relay = relay.clone();
        let text = format!("**{}**: {}", message.username, message.content);
        let attachment = new.file;
        tokio::spawn(async move {
            if let Err(err) = relay.notify(&text, attachment).await {
                tracing::error!(error = %err, "webhook relay failed");
            }
        });
    }

    Ok(message)
}

#[debug_handler(state = crate::AppState)]
pub async fn post_message(
    State(db_pool): State<SqlitePool>,
    State(files): State<FileStore>,
    State(registry): State<ConnectionRegistry>,
    State(relay): State<Relay>,
    mut multipart: Multipart,
) -> AppResult<Json<Message>> {
    let mut content = String::new();
    let mut username = String::new();
    let mut ttl_seconds = Some(DEFAULT_TTL_SECONDS);
    let mut send_to_webhook = false;
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name().unwrap_or_default() {
            "content" => content = field.text().await?,
            "username" => username = field.text().await?,
            "ttl_seconds" => {
                let raw = field.text().await?;
                // An explicitly empty field means "never expires".
                ttl_seconds = if raw.trim().is_empty() {
                    None
                } else {
                    Some(raw.trim().parse().map_err(|_| {
                        AppError::Validation("ttl_seconds must be an integer".to_owned())
                    })?)
                };
            }
            "send_to_discord" => {
                send_to_webhook = matches!(field.text().await?.trim(), "true" | "1" | "on");
            }
            "file" => {
                let name = field.file_name().unwrap_or_default().to_owned();
                if !name.is_empty() {
                    file = Some((name, field.bytes().await?.to_vec()));
                }
            }
            _ => {}
        }
    }

    let message = create_message(
        &db_pool,
        &files,
        &registry,
        &relay,
        NewMessage {
            content,
            username,
            ttl_seconds,
            send_to_webhook,
            file,
        },
    )
    .await?;
    Ok(Json(message))
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::error::TryRecvError;

    use crate::messages::store::tests::pool;

    use super::*;

    fn files() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        (dir, store)
    }

    fn new_message(content: &str, file: Option<(&str, &[u8])>) -> NewMessage {
        NewMessage {
            content: content.to_owned(),
            username: "ghost".to_owned(),
            ttl_seconds: Some(600),
            send_to_webhook: false,
            file: file.map(|(name, data)| (name.to_owned(), data.to_vec())),
        }
    }

    async fn row_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn rejects_blocked_extension_before_any_write() {
        let pool = pool().await;
        let (dir, files) = files();
        let registry = ConnectionRegistry::new();

        let result = create_message(
            &pool,
            &files,
            &registry,
            &Relay::disabled(),
            new_message("payload", Some(("x.php", b"<?php"))),
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(row_count(&pool).await, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn rejects_uppercase_and_double_extensions() {
        let pool = pool().await;
        let (_dir, files) = files();
        let registry = ConnectionRegistry::new();

        for name in ["X.PHP", "backup.tar.sh"] {
            let result = create_message(
                &pool,
                &files,
                &registry,
                &Relay::disabled(),
                new_message("payload", Some((name, b"x"))),
            )
            .await;
            assert!(matches!(result, Err(AppError::Validation(_))), "{name}");
        }
    }

    #[tokio::test]
    async fn accepts_txt_and_stores_under_opaque_key() {
        let pool = pool().await;
        let (_dir, files) = files();
        let registry = ConnectionRegistry::new();

        let message = create_message(
            &pool,
            &files,
            &registry,
            &Relay::disabled(),
            new_message("see attached", Some(("x.txt", b"hello"))),
        )
        .await
        .unwrap();

        assert_eq!(message.file_name.as_deref(), Some("x.txt"));
        assert_eq!(message.file_size, Some(5));
        let key = message.file_path.unwrap();
        assert!(!key.contains("x.txt"));
        assert!(files.exists(&key).await);
    }

    #[tokio::test]
    async fn rejects_missing_username_and_bad_ttl() {
        let pool = pool().await;
        let (_dir, files) = files();
        let registry = ConnectionRegistry::new();

        let mut anon = new_message("hi", None);
        anon.username = String::new();
        assert!(matches!(
            create_message(&pool, &files, &registry, &Relay::disabled(), anon).await,
            Err(AppError::Validation(_))
        ));

        let mut stale = new_message("hi", None);
        stale.ttl_seconds = Some(0);
        assert!(matches!(
            create_message(&pool, &files, &registry, &Relay::disabled(), stale).await,
            Err(AppError::Validation(_))
        ));

        assert_eq!(row_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn rejects_overflowing_ttl_instead_of_panicking() {
        let pool = pool().await;
        let (_dir, files) = files();
        let registry = ConnectionRegistry::new();

        // i64::MAX overflows the duration itself; i64::MAX / 1000 fits a
        // duration but overflows the expiry instant.
        for ttl in [i64::MAX, i64::MAX / 1000] {
            let mut msg = new_message("forever", None);
            msg.ttl_seconds = Some(ttl);
            assert!(matches!(
                create_message(&pool, &files, &registry, &Relay::disabled(), msg).await,
                Err(AppError::Validation(_))
            ));
        }
        assert_eq!(row_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn every_subscriber_gets_exactly_one_new_message_event() {
        let pool = pool().await;
        let (_dir, files) = files();
        let registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = registry.subscribe().await;
        let (_b, mut rx_b) = registry.subscribe().await;

        let message = create_message(
            &pool,
            &files,
            &registry,
            &Relay::disabled(),
            new_message("hello", None),
        )
        .await
        .unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let event: serde_json::Value =
                serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(event["type"], "new_message");
            assert_eq!(event["message"]["id"], message.id.to_string());
            assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        }
    }

    #[tokio::test]
    async fn created_message_is_immediately_live() {
        let pool = pool().await;
        let (_dir, files) = files();
        let registry = ConnectionRegistry::new();

        let message = create_message(
            &pool,
            &files,
            &registry,
            &Relay::disabled(),
            new_message("fresh", None),
        )
        .await
        .unwrap();

        let live = store::find_live(&pool, Utc::now()).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, message.id);
    }
}
