use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author discriminator Discord assigns to webhook-relayed messages.
pub const WEBHOOK_DISCRIMINATOR: &str = "0000";

/// One tracked message. Records are only ever mutated to flip the soft-delete
/// flags; a deleted message stays in the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(default)]
    pub author_discriminator: String,
    pub channel_id: String,
    pub channel_name: String,
    pub guild_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub channel_deleted: bool,
}

impl MessageRecord {
    /// True for messages typed by an actual human account. Webhook relays
    /// carry discriminator "0000" even when `is_bot` is false.
    pub fn is_real_user(&self) -> bool {
        !self.is_bot && self.author_discriminator != WEBHOOK_DISCRIMINATOR
    }
}

/// Entry in the command access list, keyed by user id.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedUser {
    pub user_id: String,
    pub display_name: String,
    pub added_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            author_id: "u1".to_string(),
            author_name: "alice".to_string(),
            author_discriminator: "0001".to_string(),
            channel_id: "c1".to_string(),
            channel_name: "general".to_string(),
            guild_id: "g1".to_string(),
            content: "hello".to_string(),
            timestamp: Utc::now(),
            is_bot: false,
            deleted: false,
            channel_deleted: false,
        }
    }

    #[test]
    fn test_real_user_predicate() {
        let mut msg = record("1");
        assert!(msg.is_real_user());

        msg.is_bot = true;
        assert!(!msg.is_real_user());

        msg.is_bot = false;
        msg.author_discriminator = WEBHOOK_DISCRIMINATOR.to_string();
        assert!(!msg.is_real_user());
    }

    #[test]
    fn test_record_snapshot_field_names() {
        let json = serde_json::to_value(record("42")).unwrap();
        assert!(json.get("authorId").is_some());
        assert!(json.get("channelDeleted").is_some());
        assert!(json.get("author_id").is_none());
    }
}
