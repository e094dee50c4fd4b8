//! Circle chat: stored messages plus live delivery over websockets.

mod hub;
mod routes;
mod service;
mod store;

pub use hub::{CHANNEL_CAPACITY, ChatHub};
pub use routes::{ChatModule, ChatSocketModule};
pub use service::{ChatService, ChatSubscription};
pub use store::{ChatCleanup, ChatStore, InMemoryChatStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::validate_not_blank;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub circle_id: String,
    pub user_id: String,
    pub author_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Pushed to websocket subscribers of a circle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Posted { message: ChatMessage },
    Deleted { circle_id: String, message_id: String },
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PostMessageRequest {
    #[validate(length(min = 1, max = 1000), custom(function = "validate_not_blank"))]
    pub body: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ListMessagesQuery {
    /// Only messages older than this message id
    pub before: Option<String>,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = MAX_PAGE_SIZE))]
    pub limit: u32,
}

impl Default for ListMessagesQuery {
    fn default() -> Self {
        Self {
            before: None,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Newest first. `next_before` is the id of the oldest message returned.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    pub next_before: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = ChatEvent::Deleted {
            circle_id: "c1".into(),
            message_id: "m1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "deleted");
        assert_eq!(json["message_id"], "m1");
    }

    #[test]
    fn test_body_rules() {
        let blank = PostMessageRequest { body: "  \n ".into() };
        assert!(blank.validate().is_err());
        let long = PostMessageRequest { body: "あ".repeat(1001) };
        assert!(long.validate().is_err());
        let ok = PostMessageRequest { body: "あ".repeat(1000) };
        assert!(ok.validate().is_ok());
    }
}
