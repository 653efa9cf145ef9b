use crate::entity::{ConnectionId, PairKey, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SUMMARY_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoomState {
    Active,
    Inactive,
}

impl RoomState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomState::Active => "ACTIVE",
            RoomState::Inactive => "INACTIVE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ACTIVE" => Some(RoomState::Active),
            "INACTIVE" => Some(RoomState::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    #[default]
    #[serde(alias = "MESSAGE")]
    Text,
    Image,
    Video,
    Document,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "TEXT",
            MessageKind::Image => "IMAGE",
            MessageKind::Video => "VIDEO",
            MessageKind::Document => "DOCUMENT",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "TEXT" | "MESSAGE" => Some(MessageKind::Text),
            "IMAGE" => Some(MessageKind::Image),
            "VIDEO" => Some(MessageKind::Video),
            "DOCUMENT" => Some(MessageKind::Document),
            _ => None,
        }
    }
}

/// The single room shared by an unordered pair of users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: String,
    pub participant_a: UserId,
    pub participant_b: UserId,
    pub pair_key: PairKey,
    #[serde(skip_serializing, default)]
    pub connection_a: Option<ConnectionId>,
    #[serde(skip_serializing, default)]
    pub connection_b: Option<ConnectionId>,
    pub last_message_summary: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub state: RoomState,
    pub created_at: DateTime<Utc>,
}

/// Which column of a room a participant occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl ChatRoom {
    pub fn side_of(&self, user: &UserId) -> Option<Side> {
        if &self.participant_a == user {
            Some(Side::A)
        } else if &self.participant_b == user {
            Some(Side::B)
        } else {
            None
        }
    }

    pub fn participant(&self, side: Side) -> &UserId {
        match side {
            Side::A => &self.participant_a,
            Side::B => &self.participant_b,
        }
    }

    /// Live connection bound to `side`, or `None` when that participant is offline.
    pub fn connection(&self, side: Side) -> Option<&ConnectionId> {
        match side {
            Side::A => self.connection_a.as_ref(),
            Side::B => self.connection_b.as_ref(),
        }
    }

    /// The participant opposite to `user`, if `user` belongs to this room.
    pub fn peer_of(&self, user: &UserId) -> Option<&UserId> {
        self.side_of(user).map(|side| self.participant(side.other()))
    }

    pub fn is_active(&self) -> bool {
        self.state == RoomState::Active
    }
}

/// A message as submitted by a sender, before it is persisted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: String,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub content: String,
    pub caption: Option<String>,
    pub thumbnail: Option<String>,
}

impl NewMessage {
    /// Text cached on the room as a preview of its latest message.
    pub fn summary(&self) -> String {
        let raw = match self.kind {
            MessageKind::Text => self.content.clone(),
            kind => match self.caption.as_deref().filter(|c| !c.trim().is_empty()) {
                Some(caption) => caption.to_string(),
                None => format!("[{}]", kind.as_str().to_lowercase()),
            },
        };
        raw.chars().take(SUMMARY_LIMIT).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    /// Position of the message within its room; strictly increasing.
    pub seq: i64,
    pub room_id: String,
    pub sender_id: UserId,
    #[serde(rename = "messageType")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
}
