use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

use crate::{
    chat::{ChatRoom, RoomState},
    entity::{UserId, UserRecord, UserStatus},
    error::ChatError,
    session::Coordinator,
};

// -----------------------------------------------------------------------------
// Response types
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusUpdate {
    pub status: UserStatus,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct RoomStateUpdate {
    pub state: RoomState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomSummary {
    #[serde(flatten)]
    room: ChatRoom,
    peer_id: Option<UserId>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "message": message }))).into_response()
}

// -----------------------------------------------------------------------------
// Implementation
// -----------------------------------------------------------------------------

pub struct ChatServer {
    coordinator: Arc<Coordinator>,
}

impl ChatServer {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/rooms/:room_id/messages", get(history_handler))
            .route("/rooms/:room_id/state", put(room_state_handler))
            .route("/users/:user_id/rooms", get(rooms_handler))
            .route("/users/:user_id", put(user_handler))
            .with_state(self.coordinator.clone())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(coordinator): State<Arc<Coordinator>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator))
}

async fn handle_socket(socket: WebSocket, coordinator: Arc<Coordinator>) {
    let (conn, mut outbox) = coordinator.connect();
    let (mut sink, mut stream) = socket.split();

    // Writer: drains this connection's outbox until the hub drops it.
    let writer = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let frame = match event.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode server event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if !coordinator.handle_frame(&conn, &text).await {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(connection = %conn, "socket error: {}", e);
                break;
            }
        }
    }

    coordinator.disconnect(&conn).await;
    if let Err(e) = writer.await {
        error!(connection = %conn, "socket writer task failed: {}", e);
    }
}

async fn health_handler(State(coordinator): State<Arc<Coordinator>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "connections": coordinator.live_connections(),
    }))
}

async fn history_handler(
    State(coordinator): State<Arc<Coordinator>>,
    Path(room_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let store = coordinator.store();

    match store.find_room(&room_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, "Chat room not found.");
        }
        Err(e) => {
            error!("Failed to load room {}: {}", room_id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load chat room.");
        }
    }

    let (page, limit) = coordinator.paging().resolve(query.page, query.limit);
    let result = async {
        let total = store.count_messages(&room_id).await?;
        let messages = store.page_messages(&room_id, page, limit).await?;
        Ok::<_, ChatError>((total, messages))
    }
    .await;

    match result {
        Ok((total, messages)) => Json(serde_json::json!({
            "page": page,
            "limit": limit,
            "total": total,
            "messages": messages,
        }))
        .into_response(),
        Err(e) => {
            error!("Failed to load history for {}: {}", room_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load messages.")
        }
    }
}

async fn rooms_handler(
    State(coordinator): State<Arc<Coordinator>>,
    Path(user_id): Path<String>,
) -> Response {
    let user = UserId::new(user_id);

    match coordinator.store().rooms_for_user(&user).await {
        Ok(rooms) => {
            let rooms: Vec<RoomSummary> = rooms
                .into_iter()
                .map(|room| RoomSummary {
                    peer_id: room.peer_of(&user).cloned(),
                    room,
                })
                .collect();
            Json(rooms).into_response()
        }
        Err(e) => {
            error!("Failed to list rooms for {}: {}", user, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load chat rooms.")
        }
    }
}

async fn room_state_handler(
    State(coordinator): State<Arc<Coordinator>>,
    Path(room_id): Path<String>,
    Json(update): Json<RoomStateUpdate>,
) -> Response {
    match coordinator.store().set_room_state(&room_id, update.state).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(ChatError::UnknownRoom(_)) => error_response(StatusCode::NOT_FOUND, "Chat room not found."),
        Err(e) => {
            error!("Failed to update room {}: {}", room_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update chat room.")
        }
    }
}

/// Mirror a user's account status from the account service.
async fn user_handler(
    State(coordinator): State<Arc<Coordinator>>,
    Path(user_id): Path<String>,
    Json(update): Json<UserStatusUpdate>,
) -> Response {
    let record = UserRecord::new(user_id, update.status, update.is_active);

    match coordinator.store().upsert_user(&record).await {
        Ok(()) => Json(record).into_response(),
        Err(e) => {
            error!("Failed to store user {}: {}", record.id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update user.")
        }
    }
}
