use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, instrument, warn};

use super::{ChatEvent, ChatHub, ChatMessage, ChatStore, ListMessagesQuery, MessagePage};
use crate::auth::AuthUser;
use crate::circles::{CircleRole, CircleService};
use crate::error::{OsikatuError, Result};
use crate::oplog::{NewOperation, OperationLogger};

pub struct ChatService {
    store: Arc<dyn ChatStore>,
    hub: Arc<ChatHub>,
    circles: Arc<CircleService>,
    oplog: Arc<OperationLogger>,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        hub: Arc<ChatHub>,
        circles: Arc<CircleService>,
        oplog: Arc<OperationLogger>,
    ) -> Self {
        Self {
            store,
            hub,
            circles,
            oplog,
        }
    }

    #[instrument(skip(self, author, body), fields(user_id = %author.id))]
    pub async fn post(&self, circle_id: &str, author: &AuthUser, body: &str) -> Result<ChatMessage> {
        self.circles.require_member(circle_id, &author.id).await?;

        let body = body.trim();
        if body.is_empty() {
            return Err(OsikatuError::validation("body", "must not be blank"));
        }

        let message = self
            .store
            .insert(ChatMessage {
                id: crate::utils::new_id(),
                circle_id: circle_id.to_string(),
                user_id: author.id.clone(),
                author_name: author.display_name.clone(),
                body: body.to_string(),
                created_at: crate::utils::now(),
                deleted_at: None,
            })
            .await?;

        let delivered = self.hub.publish(
            circle_id,
            ChatEvent::Posted {
                message: message.clone(),
            },
        );
        debug!(message_id = %message.id, delivered, "Chat message posted");
        Ok(message)
    }

    pub async fn list(
        &self,
        circle_id: &str,
        user_id: &str,
        query: &ListMessagesQuery,
    ) -> Result<MessagePage> {
        self.circles.require_member(circle_id, user_id).await?;
        let messages = self
            .store
            .list(circle_id, query.before.as_deref(), query.limit as usize)
            .await?;
        Ok(MessagePage {
            next_before: messages.last().map(|m| m.id.clone()),
            messages,
        })
    }

    /// Soft delete by the author or an admin.
    #[instrument(skip(self))]
    pub async fn delete(&self, circle_id: &str, actor_id: &str, message_id: &str) -> Result<()> {
        let membership = self.circles.require_member(circle_id, actor_id).await?;
        let message = self
            .store
            .get(circle_id, message_id)
            .await?
            .filter(|m| m.deleted_at.is_none())
            .ok_or_else(|| OsikatuError::not_found("Message not found"))?;

        let moderating = message.user_id != actor_id;
        if moderating && !membership.role.has_at_least(&CircleRole::Admin) {
            return Err(OsikatuError::forbidden(
                "Only the author or an admin can delete this message",
            ));
        }

        self.store
            .mark_deleted(circle_id, message_id, crate::utils::now())
            .await?;
        self.hub.publish(
            circle_id,
            ChatEvent::Deleted {
                circle_id: circle_id.to_string(),
                message_id: message_id.to_string(),
            },
        );

        info!(circle_id, message_id, moderating, "Chat message deleted");
        if moderating {
            self.oplog
                .record(
                    NewOperation::new("chat.moderate_delete")
                        .actor(actor_id)
                        .target("chat_message", message_id)
                        .metadata(serde_json::json!({
                            "circle_id": circle_id,
                            "author_id": message.user_id,
                        })),
                )
                .await;
        }
        Ok(())
    }

    /// Live events for a member.
    pub async fn subscribe(&self, circle_id: &str, user_id: &str) -> Result<ChatSubscription> {
        self.circles.require_member(circle_id, user_id).await?;
        Ok(ChatSubscription {
            events: self.hub.subscribe(circle_id),
            pending: None,
            circles: self.circles.clone(),
            circle_id: circle_id.to_string(),
            user_id: user_id.to_string(),
        })
    }
}

/// A member's live feed. Membership is re-checked before every event, so
/// the feed ends once the user leaves or is removed.
pub struct ChatSubscription {
    events: broadcast::Receiver<ChatEvent>,
    pending: Option<ChatEvent>,
    circles: Arc<CircleService>,
    circle_id: String,
    user_id: String,
}

impl ChatSubscription {
    /// The next event, or `None` once the channel is closed or the user is
    /// no longer a member. Cancel safe.
    pub async fn next(&mut self) -> Option<ChatEvent> {
        loop {
            if self.pending.is_none() {
                match self.events.recv().await {
                    Ok(event) => self.pending = Some(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(circle_id = %self.circle_id, user_id = %self.user_id, skipped, "Chat subscriber lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }

            return match self.circles.is_member(&self.circle_id, &self.user_id).await {
                Ok(true) => self.pending.take(),
                Ok(false) => {
                    debug!(circle_id = %self.circle_id, user_id = %self.user_id, "Subscriber is no longer a member");
                    None
                }
                Err(e) => {
                    warn!(error = %e, circle_id = %self.circle_id, "Membership check failed");
                    None
                }
            };
        }
    }
}
