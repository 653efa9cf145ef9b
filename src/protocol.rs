//! JSON frames exchanged over the chat socket.
//!
//! Every frame is `{"type": <event>, "data": {...}}`.

use crate::{
    chat::{ChatMessage, MessageKind},
    entity::UserId,
    error::{ChatError, Result},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "initiateUserChat")]
    InitiateChat(InitiateChat),

    #[serde(rename = "userSendMessage")]
    SendMessage(SendMessage),

    #[serde(rename = "typing")]
    Typing(Typing),

    /// Explicit leave; the same cleanup runs when the socket closes.
    #[serde(rename = "disconnect")]
    Disconnect,
}

impl ClientEvent {
    pub fn parse(frame: &str) -> Result<Self> {
        serde_json::from_str(frame)
            .map_err(|e| ChatError::Validation(format!("Invalid event payload: {e}")))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::InitiateChat(_) => "initiateUserChat",
            ClientEvent::SendMessage(_) => "userSendMessage",
            ClientEvent::Typing(_) => "typing",
            ClientEvent::Disconnect => "disconnect",
        }
    }
}

// Identifier fields default to empty so a missing field reports the same
// validation message as an empty one.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateChat {
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub receiver_id: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl InitiateChat {
    pub fn validate(&self) -> Result<(UserId, UserId)> {
        let sender = self.sender_id.trim();
        let receiver = self.receiver_id.trim();
        if sender.is_empty() || receiver.is_empty() {
            return Err(ChatError::Validation(
                "senderId or receiverId cannot be empty.".into(),
            ));
        }
        if sender == receiver {
            return Err(ChatError::Validation(
                "senderId and receiverId must be different.".into(),
            ));
        }
        Ok((UserId::new(sender), UserId::new(receiver)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub message_type: MessageKind,
    #[serde(default)]
    pub content: String,
    pub caption: Option<String>,
    pub thumbnail: Option<String>,
}

impl SendMessage {
    pub fn validate(&self) -> Result<()> {
        if self.room_id.trim().is_empty() || self.sender_id.trim().is_empty() {
            return Err(ChatError::Validation(
                "roomId or senderId cannot be empty.".into(),
            ));
        }
        if self.content.trim().is_empty() {
            return Err(ChatError::Validation("content cannot be empty.".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub is_typing: bool,
}

impl Typing {
    pub fn validate(&self) -> Result<()> {
        if self.room_id.trim().is_empty() || self.user_id.trim().is_empty() {
            return Err(ChatError::Validation(
                "roomId or userId cannot be empty.".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "chatInitiated", rename_all = "camelCase")]
    ChatInitiated {
        chat_room_id: String,
        is_online: bool,
        messages: Vec<ChatMessage>,
    },

    /// A message from the peer.
    #[serde(rename = "receiveUserMessage")]
    ReceiveMessage(ChatMessage),

    /// Acknowledgment to the sender that its message was stored.
    #[serde(rename = "getUserMessage")]
    MessageEcho(ChatMessage),

    #[serde(rename = "typingStatus", rename_all = "camelCase")]
    TypingStatus {
        user_id: UserId,
        is_typing: bool,
        is_online: bool,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
