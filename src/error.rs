use crate::entity::{PairKey, UserId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),

    #[error("chat room not found: {0}")]
    UnknownRoom(String),

    #[error("chat room is inactive: {0}")]
    InactiveRoom(String),

    #[error("user {user_id} is not a participant of room {room_id}")]
    NotAParticipant { room_id: String, user_id: UserId },

    /// Another writer created the room for this pair first.
    #[error("a chat room already exists for pair {0}")]
    DuplicateRoom(PairKey),

    #[error("user {0} is blocked or deleted")]
    Blocked(UserId),

    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),
}

impl ChatError {
    /// Text sent to the originating connection in an `error` event.
    /// Storage failures are replaced by `fallback` so internals never reach clients.
    pub fn client_message(&self, fallback: &str) -> String {
        match self {
            ChatError::Validation(msg) => msg.clone(),
            ChatError::UnknownRoom(_) => "Chat room not found with provided roomId.".to_string(),
            ChatError::InactiveRoom(_) => "Chat room is no longer active.".to_string(),
            ChatError::NotAParticipant { .. } => {
                "You are not a participant of this chat room.".to_string()
            }
            ChatError::Blocked(_) => "Your account is not allowed to chat.".to_string(),
            ChatError::DuplicateRoom(_) | ChatError::Store(_) => fallback.to_string(),
        }
    }

    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ChatError::Store(_) | ChatError::DuplicateRoom(_))
    }
}
