use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::{delete, get},
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use super::{ChatMessage, ChatSubscription, ListMessagesQuery, MessagePage, PostMessageRequest};
use crate::app::AppContext;
use crate::auth::{AuthUser, WsAuthUser};
use crate::error::Result;
use crate::http::{CreatedResponse, NoContentResponse, RouteModule};
use crate::validation::{ValidatedJson, ValidatedQuery};

/// Message history under `/circles/{id}/chat`
pub struct ChatModule;

impl RouteModule for ChatModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/circles/{id}/chat/messages", get(list).post(post))
            .route("/circles/{id}/chat/messages/{message_id}", delete(remove))
    }
}

/// The live event stream. Mounted outside the request timeout.
pub struct ChatSocketModule;

impl RouteModule for ChatSocketModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/circles/{id}/chat/ws", get(socket))
    }
}

async fn list(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedQuery(query): ValidatedQuery<ListMessagesQuery>,
) -> Result<Json<MessagePage>> {
    Ok(Json(ctx.chat.list(&id, &user.id, &query).await?))
}

async fn post(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<PostMessageRequest>,
) -> Result<CreatedResponse<ChatMessage>> {
    let message = ctx.chat.post(&id, &user, &req.body).await?;
    let location = format!("/api/circles/{}/chat/messages/{}", id, message.id);
    Ok(CreatedResponse::new(message, location))
}

async fn remove(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path((id, message_id)): Path<(String, String)>,
) -> Result<NoContentResponse> {
    ctx.chat.delete(&id, &user.id, &message_id).await?;
    Ok(NoContentResponse)
}

/// Membership is checked before the upgrade so outsiders get a plain 403.
async fn socket(
    WsAuthUser(user): WsAuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Result<Response> {
    let events = ctx.chat.subscribe(&id, &user.id).await?;
    Ok(upgrade.on_upgrade(move |socket| stream_events(socket, events, id, user.id)))
}

async fn stream_events(
    socket: WebSocket,
    mut events: ChatSubscription,
    circle_id: String,
    user_id: String,
) {
    debug!(%circle_id, %user_id, "Chat socket opened");
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode chat event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = receiver.next() => match incoming {
                // Clients only listen; pings are answered by axum.
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(%circle_id, %user_id, "Chat socket closed");
}
