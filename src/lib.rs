pub mod config;
pub mod error;
pub mod event;
pub mod files;
pub mod messages;
pub mod registry;
pub mod relay;
pub mod sweeper;

use axum::extract::FromRef;
use sqlx::SqlitePool;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use event::WireEvent;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub files: files::FileStore,
    pub registry: registry::ConnectionRegistry,
    pub relay: relay::Relay,
}
