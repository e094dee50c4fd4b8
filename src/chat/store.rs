use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ChatHub, ChatMessage};
use crate::circles::CircleCleanup;
use crate::error::{OsikatuError, Result};

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn insert(&self, message: ChatMessage) -> Result<ChatMessage>;

    async fn get(&self, circle_id: &str, message_id: &str) -> Result<Option<ChatMessage>>;

    /// Non-deleted messages, newest first. With `before`, only messages
    /// written before that message; an unknown cursor is a BadRequest.
    async fn list(
        &self,
        circle_id: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>>;

    /// Soft delete. Returns the message as stored afterwards.
    async fn mark_deleted(
        &self,
        circle_id: &str,
        message_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ChatMessage>>;

    async fn delete_circle(&self, circle_id: &str) -> Result<usize>;
}

/// Messages per circle in posting order
#[derive(Clone, Default)]
pub struct InMemoryChatStore {
    circles: Arc<RwLock<HashMap<String, Vec<ChatMessage>>>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn insert(&self, message: ChatMessage) -> Result<ChatMessage> {
        let mut circles = self.circles.write().await;
        circles
            .entry(message.circle_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn get(&self, circle_id: &str, message_id: &str) -> Result<Option<ChatMessage>> {
        let circles = self.circles.read().await;
        Ok(circles
            .get(circle_id)
            .and_then(|messages| messages.iter().find(|m| m.id == message_id))
            .cloned())
    }

    async fn list(
        &self,
        circle_id: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let circles = self.circles.read().await;
        let Some(messages) = circles.get(circle_id) else {
            return match before {
                Some(_) => Err(OsikatuError::bad_request("Unknown message cursor")),
                None => Ok(Vec::new()),
            };
        };

        let end = match before {
            Some(cursor) => messages
                .iter()
                .position(|m| m.id == cursor)
                .ok_or_else(|| OsikatuError::bad_request("Unknown message cursor"))?,
            None => messages.len(),
        };

        Ok(messages[..end]
            .iter()
            .rev()
            .filter(|m| m.deleted_at.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_deleted(
        &self,
        circle_id: &str,
        message_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ChatMessage>> {
        let mut circles = self.circles.write().await;
        let Some(message) = circles
            .get_mut(circle_id)
            .and_then(|messages| messages.iter_mut().find(|m| m.id == message_id))
        else {
            return Ok(None);
        };
        if message.deleted_at.is_none() {
            message.deleted_at = Some(at);
        }
        Ok(Some(message.clone()))
    }

    async fn delete_circle(&self, circle_id: &str) -> Result<usize> {
        let mut circles = self.circles.write().await;
        Ok(circles.remove(circle_id).map(|m| m.len()).unwrap_or(0))
    }
}

/// Drops messages and closes the live channel of a deleted circle.
pub struct ChatCleanup {
    store: Arc<dyn ChatStore>,
    hub: Arc<ChatHub>,
}

impl ChatCleanup {
    pub fn new(store: Arc<dyn ChatStore>, hub: Arc<ChatHub>) -> Self {
        Self { store, hub }
    }
}

#[async_trait]
impl CircleCleanup for ChatCleanup {
    async fn purge_circle(&self, circle_id: &str) -> Result<()> {
        self.store.delete_circle(circle_id).await?;
        self.hub.close(circle_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, circle_id: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            circle_id: circle_id.into(),
            user_id: "u1".into(),
            author_name: "Aoi".into(),
            body: format!("message {}", id),
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn test_list_pages_backwards() {
        let store = InMemoryChatStore::new();
        for id in ["m1", "m2", "m3", "m4"] {
            store.insert(message(id, "c1")).await.unwrap();
        }
        store.mark_deleted("c1", "m2", Utc::now()).await.unwrap();

        let ids = |messages: Vec<ChatMessage>| messages.into_iter().map(|m| m.id).collect::<Vec<_>>();
        assert_eq!(ids(store.list("c1", None, 2).await.unwrap()), vec!["m4", "m3"]);
        assert_eq!(ids(store.list("c1", Some("m3"), 2).await.unwrap()), vec!["m1"]);
        assert!(store.list("c1", Some("nope"), 2).await.is_err());
        assert!(store.list("c2", None, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_is_scoped_to_circle() {
        let store = InMemoryChatStore::new();
        store.insert(message("m1", "c1")).await.unwrap();
        assert!(store.get("c1", "m1").await.unwrap().is_some());
        assert!(store.get("c2", "m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_purges_circle() {
        let store: Arc<dyn ChatStore> = Arc::new(InMemoryChatStore::new());
        let hub = Arc::new(ChatHub::default());
        store.insert(message("m1", "c1")).await.unwrap();
        store.insert(message("m2", "c2")).await.unwrap();
        let mut rx = hub.subscribe("c1");

        ChatCleanup::new(store.clone(), hub.clone())
            .purge_circle("c1")
            .await
            .unwrap();

        assert!(store.list("c1", None, 10).await.unwrap().is_empty());
        assert_eq!(store.list("c2", None, 10).await.unwrap().len(), 1);
        assert!(rx.recv().await.is_err());
    }
}
