use serde::{Deserialize, Serialize};

use crate::messages::Message;

/// Notifications pushed to every connected viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    NewMessage { message: Message },
    Cleanup { deleted_count: u64 },
    AutoClear { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let json = serde_json::to_value(WireEvent::Cleanup { deleted_count: 4 }).unwrap();
        assert_eq!(json["type"], "cleanup");
        assert_eq!(json["deleted_count"], 4);

        let json = serde_json::to_value(WireEvent::AutoClear {
            message: "cleared".to_owned(),
        })
        .unwrap();
        assert_eq!(json["type"], "auto_clear");
        assert_eq!(json["message"], "cleared");
    }
}
