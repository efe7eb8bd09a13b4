//! Database row types mapped directly from SQLite rows.
//! Distinct from agora-types models to keep the DB layer independent; the
//! `into_*` conversions log and substitute defaults for corrupt columns.

use agora_types::models::{
    ChatMessage, MembershipStatus, MessageKind, Notification, NotificationKind, User,
};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub fn display_name(&self) -> String {
        display_name_of(&self.first_name, &self.last_name, self.nickname.as_deref())
    }

    pub fn into_user(self) -> User {
        User {
            id: parse_uuid(&self.id, "user id"),
            created_at: parse_timestamp(&self.created_at),
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            nickname: self.nickname,
        }
    }
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub group_id: Option<String>,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> ChatMessage {
        let kind = if self.group_id.is_some() {
            MessageKind::GroupMessage
        } else {
            MessageKind::PrivateMessage
        };

        ChatMessage {
            id: parse_uuid(&self.id, "message id"),
            kind,
            sender_id: parse_uuid(&self.sender_id, "sender_id"),
            recipient_id: self.recipient_id.as_deref().map(|s| parse_uuid(s, "recipient_id")),
            group_id: self.group_id.as_deref().map(|s| parse_uuid(s, "group_id")),
            content: self.content,
            created_at: parse_timestamp(&self.created_at),
            is_read: self.is_read,
        }
    }
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub content: String,
    pub reference_id: String,
    pub actor_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
    pub invitation_status: Option<String>,
}

impl NotificationRow {
    /// Returns `None` for rows whose type this build does not know about.
    pub fn into_notification(self) -> Option<Notification> {
        let kind: NotificationKind = match self.kind.parse() {
            Ok(kind) => kind,
            Err(e) => {
                warn!("Skipping notification '{}': {}", self.id, e);
                return None;
            }
        };

        let invitation_status = match kind {
            NotificationKind::GroupInvite => self
                .invitation_status
                .as_deref()
                .and_then(|s| s.parse::<MembershipStatus>().ok()),
            _ => None,
        };

        Some(Notification {
            id: parse_uuid(&self.id, "notification id"),
            user_id: parse_uuid(&self.user_id, "notification user_id"),
            kind,
            content: self.content,
            reference_id: parse_uuid(&self.reference_id, "reference_id"),
            actor_id: self.actor_id.as_deref().map(|id| parse_uuid(id, "actor_id")),
            is_read: self.is_read,
            created_at: parse_timestamp(&self.created_at),
            invitation_status,
        })
    }
}

/// Outcome of a join request against the current membership row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A pending row now exists; the creator should be told.
    Requested { creator_id: Uuid },
    AlreadyMember,
    AlreadyPending,
    NoSuchGroup,
}

/// Who opened a pending membership, which decides who may answer it: the
/// invitee answers an invite, the group creator answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOrigin {
    Invite,
    Request,
}

impl MembershipOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invite => "invite",
            Self::Request => "request",
        }
    }
}

pub fn display_name_of(first_name: &str, last_name: &str, nickname: Option<&str>) -> String {
    match nickname {
        Some(nick) if !nick.trim().is_empty() => nick.to_string(),
        _ => format!("{} {}", first_name, last_name).trim().to_string(),
    }
}

/// Fixed-width UTC timestamps so lexical order matches chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite column defaults are "YYYY-MM-DD HH:MM:SS" without timezone.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_lexically() {
        let a = "2026-01-01T00:00:00.5Z".parse::<DateTime<Utc>>().unwrap();
        let b = "2026-01-01T00:00:00.25Z".parse::<DateTime<Utc>>().unwrap();
        assert!(b < a);
        assert!(format_timestamp(b) < format_timestamp(a));
        assert_eq!(parse_timestamp(&format_timestamp(a)), a);
    }

    #[test]
    fn parses_sqlite_default_timestamps() {
        let ts = parse_timestamp("2026-03-04 05:06:07");
        assert_eq!(format_timestamp(ts), "2026-03-04T05:06:07.000000Z");
    }

    #[test]
    fn nickname_wins_when_present() {
        assert_eq!(display_name_of("Ada", "Lovelace", Some("ada")), "ada");
        assert_eq!(display_name_of("Ada", "Lovelace", Some("  ")), "Ada Lovelace");
        assert_eq!(display_name_of("Ada", "Lovelace", None), "Ada Lovelace");
    }
}
