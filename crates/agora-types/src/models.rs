use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A bearer session. Valid while `now < expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Pending,
    Accepted,
    Declined,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }
}

impl FromStr for MembershipStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    PrivateMessage,
    GroupMessage,
}

/// A persisted chat message. Exactly one of `recipient_id` / `group_id` is set,
/// matching `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub kind: MessageKind,
    pub sender_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl ChatMessage {
    pub fn private(sender_id: Uuid, recipient_id: Uuid, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: MessageKind::PrivateMessage,
            sender_id,
            recipient_id: Some(recipient_id),
            group_id: None,
            content,
            created_at: Utc::now(),
            is_read: false,
        }
    }

    pub fn group(sender_id: Uuid, group_id: Uuid, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: MessageKind::GroupMessage,
            sender_id,
            recipient_id: None,
            group_id: Some(group_id),
            content,
            created_at: Utc::now(),
            is_read: false,
        }
    }
}

/// Both sides of a private conversation, from the caller's point of view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrivateHistory {
    pub sent: Vec<ChatMessage>,
    pub received: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PrivateMessage,
    GroupMessage,
    GroupInvite,
    GroupJoinRequest,
    GroupEvent,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrivateMessage => "private_message",
            Self::GroupMessage => "group_message",
            Self::GroupInvite => "group_invite",
            Self::GroupJoinRequest => "group_join_request",
            Self::GroupEvent => "group_event",
        }
    }

    /// Invite and event notices keep at most one unread row per
    /// `(user, reference)`. Messages and join requests each come from a
    /// distinct actor action and are never collapsed.
    pub fn is_deduplicated(&self) -> bool {
        match self {
            Self::GroupInvite | Self::GroupEvent => true,
            Self::PrivateMessage | Self::GroupMessage | Self::GroupJoinRequest => false,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private_message" => Ok(Self::PrivateMessage),
            "group_message" => Ok(Self::GroupMessage),
            "group_invite" => Ok(Self::GroupInvite),
            "group_join_request" => Ok(Self::GroupJoinRequest),
            "group_event" => Ok(Self::GroupEvent),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub content: String,
    pub reference_id: Uuid,
    /// The user whose action produced this row, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    /// Only populated for `group_invite` rows when listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitation_status: Option<MembershipStatus>,
}

impl Notification {
    pub fn new(user_id: Uuid, kind: NotificationKind, content: String, reference_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            content,
            reference_id,
            actor_id: None,
            is_read: false,
            created_at: Utc::now(),
            invitation_status: None,
        }
    }

    pub fn by(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEvent {
    pub id: Uuid,
    pub group_id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub event_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);
