use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, Notification, PrivateHistory};

/// Frames sent FROM client TO server over the gateway socket.
///
/// Wire shape is a flat JSON object: `{"type": "send_private_message", "recipient_id": .., "content": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    GetNotifications,
    MarkRead { notification_id: Uuid },
    SendPrivateMessage { recipient_id: Uuid, content: String },
    SendGroupMessage { group_id: Uuid, content: String },
    GetPrivateHistory { other_user_id: Uuid },
    GetGroupHistory { group_id: Uuid },
    MarkMessagesRead { sender_id: Uuid },
}

impl ClientFrame {
    pub const KINDS: &'static [&'static str] = &[
        "get_notifications",
        "mark_read",
        "send_private_message",
        "send_group_message",
        "get_private_history",
        "get_group_history",
        "mark_messages_read",
    ];

    /// Parse a text frame, separating unknown discriminators from malformed
    /// payloads so the caller can log them differently.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(FrameError::Malformed)?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(FrameError::MissingType)?;

        if !Self::KINDS.contains(&kind) {
            return Err(FrameError::UnknownKind(kind.to_string()));
        }

        serde_json::from_value(value).map_err(FrameError::Malformed)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetNotifications => "get_notifications",
            Self::MarkRead { .. } => "mark_read",
            Self::SendPrivateMessage { .. } => "send_private_message",
            Self::SendGroupMessage { .. } => "send_group_message",
            Self::GetPrivateHistory { .. } => "get_private_history",
            Self::GetGroupHistory { .. } => "get_group_history",
            Self::MarkMessagesRead { .. } => "mark_messages_read",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("unknown frame type `{0}`")]
    UnknownKind(String),
    #[error("malformed frame: {0}")]
    Malformed(serde_json::Error),
}

/// Frames sent FROM server TO client: `{"type": .., "content": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ServerFrame {
    Notifications(Vec<Notification>),
    MessageSent(ChatMessage),
    PrivateMessageHistory(PrivateHistory),
    GroupMessageHistory(Vec<ChatMessage>),
    MessagesMarkedRead { sender_id: Uuid, updated: usize },

    /// Live push of a newly persisted private message
    PrivateMessage(ChatMessage),
    /// Live push of a newly persisted group message
    GroupMessage(ChatMessage),
    /// Live push of a newly persisted notification
    Notification(Notification),

    /// A write requested by this client failed
    Error { request: String, message: String },
}

impl ServerFrame {
    /// Live envelope for a persisted message, keyed by its kind.
    pub fn live(message: ChatMessage) -> Self {
        match message.kind {
            crate::models::MessageKind::PrivateMessage => Self::PrivateMessage(message),
            crate::models::MessageKind::GroupMessage => Self::GroupMessage(message),
        }
    }
}
