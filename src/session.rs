use crate::{
    bus::Hub,
    chat::{ChatMessage, ChatRoom, NewMessage},
    config::Paging,
    entity::{ConnectionId, UserId},
    error::{ChatError, Result},
    protocol::{ClientEvent, InitiateChat, SendMessage, ServerEvent, Typing},
    store::Store,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const INITIATE_FAILED: &str = "Failed to initiate chat. Please try again later.";
const SEND_FAILED: &str = "Failed to send message at the moment. Please try again later.";
const TYPING_FAILED: &str = "Failed to update typing status.";
const INVALID_FRAME: &str = "Invalid event payload.";

/// Routes socket events between the two sides of a room.
///
/// Holds no per-room locks: the only shared state is the room row, and room
/// creation races are settled by the store's unique pair key.
pub struct Coordinator {
    store: Store,
    hub: Arc<Hub>,
    paging: Paging,
}

impl Coordinator {
    pub fn new(store: Store, hub: Arc<Hub>, paging: Paging) -> Self {
        Self { store, hub, paging }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn paging(&self) -> Paging {
        self.paging
    }

    /// Number of sockets currently registered.
    pub fn live_connections(&self) -> usize {
        self.hub.len()
    }

    /// Register a fresh connection with the hub.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = ConnectionId::generate();
        let rx = self.hub.register(id.clone());
        info!(connection = %id, "socket connected");
        (id, rx)
    }

    /// Parse and dispatch one raw frame from `conn`.
    /// Returns false once the client has asked to disconnect.
    pub async fn handle_frame(&self, conn: &ConnectionId, frame: &str) -> bool {
        match ClientEvent::parse(frame) {
            Ok(ClientEvent::Disconnect) => {
                self.disconnect(conn).await;
                false
            }
            Ok(event) => {
                self.handle(conn, event).await;
                true
            }
            Err(e) => {
                self.report(conn, &e, INVALID_FRAME);
                true
            }
        }
    }

    pub async fn handle(&self, conn: &ConnectionId, event: ClientEvent) {
        debug!(connection = %conn, event = event.name(), "client event");

        match event {
            ClientEvent::InitiateChat(req) => {
                if let Err(e) = self.initiate_chat(conn, &req).await {
                    self.report(conn, &e, INITIATE_FAILED);
                }
            }
            ClientEvent::SendMessage(req) => {
                if let Err(e) = self.send_message(conn, &req).await {
                    self.report(conn, &e, SEND_FAILED);
                }
            }
            ClientEvent::Typing(req) => {
                if let Err(e) = self.typing(conn, &req).await {
                    self.report(conn, &e, TYPING_FAILED);
                }
            }
            ClientEvent::Disconnect => self.disconnect(conn).await,
        }
    }

    /// Find or create the room for the pair, bind `conn` to the sender's side
    /// and reply with the peer's status and the first page of history.
    pub async fn initiate_chat(&self, conn: &ConnectionId, req: &InitiateChat) -> Result<ChatRoom> {
        let (sender, receiver) = req.validate()?;
        self.ensure_allowed(&sender).await?;

        let (room, created) = self.find_or_create_room(&sender, &receiver, conn).await?;
        if !room.is_active() {
            return Err(ChatError::InactiveRoom(room.id));
        }
        // A new room already carries the initiator's connection.
        let room = if created {
            room
        } else {
            self.store.bind_connection(&room.id, &sender, conn).await?
        };

        let messages = if created {
            Vec::new()
        } else {
            let (page, size) = self.paging.resolve(req.page, req.limit);
            self.store.page_messages(&room.id, page, size).await?
        };

        let is_online = self.is_online(&receiver).await?;
        self.hub.emit(
            conn,
            ServerEvent::ChatInitiated {
                chat_room_id: room.id.clone(),
                is_online,
                messages,
            },
        );

        Ok(room)
    }

    /// Returns the pair's room and whether this call created it. Existing
    /// rooms are returned unbound.
    async fn find_or_create_room(
        &self,
        sender: &UserId,
        receiver: &UserId,
        conn: &ConnectionId,
    ) -> Result<(ChatRoom, bool)> {
        if let Some(room) = self.store.find_room_for_pair(sender, receiver).await? {
            return Ok((room, false));
        }

        match self.store.create_room(sender, receiver, conn).await {
            Ok(room) => {
                info!(room_id = %room.id, sender = %sender, receiver = %receiver, "new chat room");
                Ok((room, true))
            }
            Err(ChatError::DuplicateRoom(key)) => {
                debug!(pair = %key, "room created concurrently, reusing it");
                let room = self
                    .store
                    .find_room_for_pair(sender, receiver)
                    .await?
                    .ok_or(ChatError::DuplicateRoom(key))?;
                Ok((room, false))
            }
            Err(e) => Err(e),
        }
    }

    /// Persist a message, forward it to the peer's live connection if any, and
    /// echo it back to `conn`.
    pub async fn send_message(&self, conn: &ConnectionId, req: &SendMessage) -> Result<ChatMessage> {
        req.validate()?;
        let sender = UserId::new(req.sender_id.trim());
        let room = self.active_room(req.room_id.trim()).await?;

        let side = room
            .side_of(&sender)
            .ok_or_else(|| ChatError::NotAParticipant {
                room_id: room.id.clone(),
                user_id: sender.clone(),
            })?;
        self.ensure_allowed(&sender).await?;

        let message = self
            .store
            .append_message(&NewMessage {
                room_id: room.id.clone(),
                sender_id: sender,
                kind: req.message_type,
                content: req.content.clone(),
                caption: req.caption.clone(),
                thumbnail: req.thumbnail.clone(),
            })
            .await?;

        match room.connection(side.other()) {
            Some(peer) => {
                if !self.hub.emit(peer, ServerEvent::ReceiveMessage(message.clone())) {
                    debug!(room_id = %room.id, connection = %peer, "peer connection is stale");
                }
            }
            None => debug!(room_id = %room.id, "peer offline, message stored only"),
        }
        self.hub.emit(conn, ServerEvent::MessageEcho(message.clone()));

        Ok(message)
    }

    /// Relay a typing indicator to the peer. Nothing is stored.
    pub async fn typing(&self, _conn: &ConnectionId, req: &Typing) -> Result<()> {
        req.validate()?;
        let user = UserId::new(req.user_id.trim());
        let room = self.active_room(req.room_id.trim()).await?;

        let side = room
            .side_of(&user)
            .ok_or_else(|| ChatError::NotAParticipant {
                room_id: room.id.clone(),
                user_id: user.clone(),
            })?;

        if let Some(peer) = room.connection(side.other()) {
            let is_online = self.is_online(&user).await?;
            self.hub.emit(
                peer,
                ServerEvent::TypingStatus {
                    user_id: user,
                    is_typing: req.is_typing,
                    is_online,
                },
            );
        }

        Ok(())
    }

    /// Drop `conn` from the hub and clear it from every room side it holds.
    /// Safe to call more than once.
    pub async fn disconnect(&self, conn: &ConnectionId) {
        self.hub.unregister(conn);
        match self.store.release_connection(conn).await {
            Ok(cleared) => info!(connection = %conn, cleared, "socket disconnected"),
            Err(e) => error!(connection = %conn, "failed to clear presence: {}", e),
        }
    }

    async fn active_room(&self, room_id: &str) -> Result<ChatRoom> {
        let room = self
            .store
            .find_room(room_id)
            .await?
            .ok_or_else(|| ChatError::UnknownRoom(room_id.to_string()))?;
        if !room.is_active() {
            return Err(ChatError::InactiveRoom(room.id));
        }
        Ok(room)
    }

    async fn is_online(&self, user: &UserId) -> Result<bool> {
        Ok(self
            .store
            .find_user(user)
            .await?
            .map(|u| u.is_online())
            .unwrap_or(false))
    }

    // Users missing from the mirror are allowed; only explicit BLOCK/DELETE is refused.
    async fn ensure_allowed(&self, user: &UserId) -> Result<()> {
        match self.store.find_user(user).await? {
            Some(record) if record.is_barred() => Err(ChatError::Blocked(user.clone())),
            _ => Ok(()),
        }
    }

    fn report(&self, conn: &ConnectionId, err: &ChatError, fallback: &str) {
        if err.is_infrastructure() {
            error!(connection = %conn, "chat event failed: {}", err);
        } else {
            warn!(connection = %conn, "chat event rejected: {}", err);
        }
        self.hub.emit(conn, ServerEvent::error(err.client_message(fallback)));
    }
}
