use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::time::sleep;

use crate::{
    AppResult, event::WireEvent, files::FileStore, messages::store, registry::ConnectionRegistry,
};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_RESET_INTERVAL: Duration = Duration::from_secs(3600);

/// One TTL pass: delete the attachments of every expired message, bulk-delete
/// the rows, and broadcast a single `cleanup` event when anything went.
///
/// Messages without a TTL are never touched here. Re-running against an
/// already-swept store deletes zero and broadcasts nothing.
pub async fn sweep_expired(
    pool: &SqlitePool,
    files: &FileStore,
    registry: &ConnectionRegistry,
) -> AppResult<u64> {
    let now = Utc::now();
    let expired = store::find_expired(pool, now).await?;

    for message in &expired {
        if let Some(key) = &message.file_path {
            if let Err(err) = files.delete(key).await {
                tracing::warn!(error = %err, message_id = %message.id, "failed to delete expired attachment");
            }
        }
    }

    let deleted = store::delete_expired(pool, now).await?;
    if deleted > 0 {
        tracing::info!(deleted, "swept expired messages");
        registry
            .broadcast(&WireEvent::Cleanup {
                deleted_count: deleted,
            })
            .await;
    }
    Ok(deleted)
}

/// Full reset: every message and every stored file goes, TTL or not.
pub async fn clear_all(
    pool: &SqlitePool,
    files: &FileStore,
    registry: &ConnectionRegistry,
) -> AppResult<u64> {
    let deleted = store::delete_all(pool).await?;
    files.delete_all().await;
    tracing::info!(deleted, "auto-cleared all messages");

    registry
        .broadcast(&WireEvent::AutoClear {
            message: "All messages have been automatically cleared".to_owned(),
        })
        .await;
    Ok(deleted)
}

/// Runs until process shutdown. A failed sweep is logged and the loop picks
/// up again on its next tick.
pub async fn run_expiration(
    pool: SqlitePool,
    files: FileStore,
    registry: ConnectionRegistry,
    interval: Duration,
) {
    tracing::info!(interval_secs = interval.as_secs(), "expiration sweeper started");
    loop {
        sleep(interval).await;
        if let Err(err) = sweep_expired(&pool, &files, &registry).await {
            tracing::error!(error = %err, "expiration sweep failed");
        }
    }
}

/// Runs until process shutdown, wiping everything on a fixed cadence.
pub async fn run_reset(
    pool: SqlitePool,
    files: FileStore,
    registry: ConnectionRegistry,
    interval: Duration,
) {
    tracing::info!(interval_secs = interval.as_secs(), "full-reset sweeper started");
    loop {
        sleep(interval).await;
        if let Err(err) = clear_all(&pool, &files, &registry).await {
            tracing::error!(error = %err, "full reset failed");
        }
    }
}
