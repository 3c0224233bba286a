use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppError, AppResult};

/// TTL applied when the client omits the field entirely.
pub const DEFAULT_TTL_SECONDS: i64 = 3600;

/// Extensions we refuse to store, lowercased. These are files the same
/// origin could be tricked into serving back as executables.
pub const BLOCKED_EXTENSIONS: &[&str] = &[".php", ".phtml", ".sh"];

/// A single chat entry, serialized with the wire field names the front end
/// consumes. `file_*` fields are null when there is no attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub ttl_seconds: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

impl Message {
    /// A message is live at `now` until its expiry instant, and forever if it
    /// has none.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }
}

/// Validated ingestion input.
pub struct NewMessage {
    pub content: String,
    pub username: String,
    pub ttl_seconds: Option<i64>,
    pub send_to_webhook: bool,
    /// Original filename and payload.
    pub file: Option<(String, Vec<u8>)>,
}

impl NewMessage {
    pub fn validate(&self) -> AppResult<()> {
        if self.username.trim().is_empty() {
            return Err(AppError::Validation("username is required".to_owned()));
        }
        if let Some(ttl) = self.ttl_seconds {
            if ttl <= 0 {
                return Err(AppError::Validation(
                    "ttl_seconds must be positive".to_owned(),
                ));
            }
            // chrono duration math aborts past ~i64::MAX/1000 seconds.
            if chrono::Duration::try_seconds(ttl).is_none() {
                return Err(AppError::Validation(
                    "ttl_seconds is out of range".to_owned(),
                ));
            }
        }
        if self.content.trim().is_empty() && self.file.is_none() {
            return Err(AppError::Validation(
                "message needs text or a file".to_owned(),
            ));
        }
        if let Some((file_name, _)) = &self.file {
            if !extension_allowed(file_name) {
                return Err(AppError::Validation("file type not allowed".to_owned()));
            }
        }
        Ok(())
    }
}

/// Deny-list check on the final extension, case-insensitive.
pub fn extension_allowed(file_name: &str) -> bool {
    let Some(ext) = Path::new(file_name).extension() else {
        return true;
    };
    let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
    !BLOCKED_EXTENSIONS.contains(&ext.as_str())
}
