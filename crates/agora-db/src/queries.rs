use agora_types::models::{
    ChatMessage, Group, GroupEvent, MembershipStatus, MessageKind, Notification,
    NotificationKind, PrivateHistory,
};
use anyhow::{Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::Database;
use crate::models::{
    JoinOutcome, MembershipOrigin, MessageRow, NotificationRow, UserRow, display_name_of,
    format_timestamp, parse_uuid,
};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: Uuid,
        email: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
        nickname: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, first_name, last_name, nickname, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    email,
                    password_hash,
                    first_name,
                    last_name,
                    nickname,
                    format_timestamp(Utc::now())
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    // -- Groups --

    /// Creates the group and makes the creator its first accepted member.
    pub fn create_group(&self, creator_id: Uuid, title: &str, description: &str) -> Result<Group> {
        let group = Group {
            id: Uuid::new_v4(),
            creator_id,
            title: title.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };

        self.with_tx(|tx| {
            let now = format_timestamp(group.created_at);
            tx.execute(
                "INSERT INTO groups (id, creator_id, title, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![group.id.to_string(), creator_id.to_string(), title, description, now],
            )?;
            tx.execute(
                "INSERT INTO group_members (group_id, user_id, status, created_at, updated_at)
                 VALUES (?1, ?2, 'accepted', ?3, ?3)",
                params![group.id.to_string(), creator_id.to_string(), now],
            )?;
            Ok(())
        })?;

        Ok(group)
    }

    /// Moves every invitee to a pending invite (declined rows and open join
    /// requests become invites, accepted members are left alone). Returns the users that now hold a pending
    /// invitation, including ones that already did.
    pub fn invite_members(&self, group_id: Uuid, user_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        self.with_tx(|tx| {
            let now = format_timestamp(Utc::now());
            let mut pending = Vec::with_capacity(user_ids.len());

            for user_id in user_ids {
                if !user_exists(tx, *user_id)? {
                    warn!("Skipping invite for unknown user {} to group {}", user_id, group_id);
                    continue;
                }

                match membership_status(tx, group_id, *user_id)? {
                    Some(MembershipStatus::Accepted) => continue,
                    Some(MembershipStatus::Pending) | Some(MembershipStatus::Declined) => {
                        tx.execute(
                            "UPDATE group_members SET status = 'pending', origin = 'invite', updated_at = ?1
                             WHERE group_id = ?2 AND user_id = ?3",
                            params![now, group_id.to_string(), user_id.to_string()],
                        )?;
                    }
                    None => {
                        tx.execute(
                            "INSERT INTO group_members (group_id, user_id, status, origin, created_at, updated_at)
                             VALUES (?1, ?2, 'pending', 'invite', ?3, ?3)",
                            params![group_id.to_string(), user_id.to_string(), now],
                        )?;
                    }
                }

                if !pending.contains(user_id) {
                    pending.push(*user_id);
                }
            }

            Ok(pending)
        })
    }

    pub fn request_join(&self, group_id: Uuid, user_id: Uuid) -> Result<JoinOutcome> {
        self.with_tx(|tx| {
            let Some(creator_id) = group_creator(tx, group_id)? else {
                return Ok(JoinOutcome::NoSuchGroup);
            };

            let now = format_timestamp(Utc::now());
            match membership_status(tx, group_id, user_id)? {
                Some(MembershipStatus::Accepted) => return Ok(JoinOutcome::AlreadyMember),
                Some(MembershipStatus::Pending) => return Ok(JoinOutcome::AlreadyPending),
                Some(MembershipStatus::Declined) => {
                    tx.execute(
                        "UPDATE group_members SET status = 'pending', origin = 'request', updated_at = ?1
                         WHERE group_id = ?2 AND user_id = ?3",
                        params![now, group_id.to_string(), user_id.to_string()],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO group_members (group_id, user_id, status, origin, created_at, updated_at)
                         VALUES (?1, ?2, 'pending', 'request', ?3, ?3)",
                        params![group_id.to_string(), user_id.to_string(), now],
                    )?;
                }
            }

            Ok(JoinOutcome::Requested { creator_id })
        })
    }

    /// Accepts or declines a pending membership of the given origin (an invite
    /// answered by the invitee, or a join request answered by the creator).
    /// Returns false if nothing of that origin was pending.
    pub fn resolve_pending_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        origin: MembershipOrigin,
        accept: bool,
    ) -> Result<bool> {
        let status = if accept {
            MembershipStatus::Accepted
        } else {
            MembershipStatus::Declined
        };

        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE group_members SET status = ?1, updated_at = ?2
                 WHERE group_id = ?3 AND user_id = ?4 AND status = 'pending' AND origin = ?5",
                params![
                    status.as_str(),
                    format_timestamp(Utc::now()),
                    group_id.to_string(),
                    user_id.to_string(),
                    origin.as_str()
                ],
            )?;
            Ok(updated > 0)
        })
    }

    pub fn get_group_creator(&self, group_id: Uuid) -> Result<Option<Uuid>> {
        self.with_conn(|conn| group_creator(conn, group_id))
    }

    pub fn is_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| is_accepted_member(conn, group_id, user_id))
    }


    // -- Messages --

    /// Both directions of a private conversation, oldest first, split by who sent them.
    pub fn private_history(&self, me: Uuid, other: Uuid) -> Result<PrivateHistory> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, recipient_id, content, is_read, created_at
                 FROM messages
                 WHERE (sender_id = ?1 AND recipient_id = ?2)
                    OR (sender_id = ?2 AND recipient_id = ?1)
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let rows = stmt
                .query_map(params![me.to_string(), other.to_string()], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        recipient_id: Some(row.get(2)?),
                        group_id: None,
                        content: row.get(3)?,
                        is_read: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })?;

        let mut history = PrivateHistory::default();
        for message in rows.into_iter().map(MessageRow::into_message) {
            if message.sender_id == me {
                history.sent.push(message);
            } else {
                history.received.push(message);
            }
        }

        Ok(history)
    }

    pub fn group_history(&self, group_id: Uuid) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, group_id, content, created_at
                 FROM group_messages
                 WHERE group_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let rows = stmt
                .query_map([group_id.to_string()], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        recipient_id: None,
                        group_id: Some(row.get(2)?),
                        content: row.get(3)?,
                        is_read: false,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows.into_iter().map(MessageRow::into_message).collect())
        })
    }

    /// Marks everything `sender_id` sent to `recipient_id` as read. Returns the number of rows changed.
    pub fn mark_messages_read(&self, sender_id: Uuid, recipient_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE sender_id = ?1 AND recipient_id = ?2 AND is_read = 0",
                params![sender_id.to_string(), recipient_id.to_string()],
            )?;
            Ok(updated)
        })
    }

    /// Distinct users with at least one unread private message to `user_id`.
    pub fn unread_senders(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT sender_id FROM messages WHERE recipient_id = ?1 AND is_read = 0",
            )?;
            let ids = stmt
                .query_map([user_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids.iter().map(|id| parse_uuid(id, "sender_id")).collect())
        })
    }

    // -- Notifications --

    /// Newest first. Invite rows carry the caller's current membership status.
    pub fn notifications_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT n.id, n.user_id, n.type, n.content, n.reference_id, n.actor_id, n.is_read,
                        n.created_at, gm.status
                 FROM notifications n
                 LEFT JOIN group_members gm
                        ON n.reference_id = gm.group_id AND gm.user_id = n.user_id
                 WHERE n.user_id = ?1
                 ORDER BY n.created_at DESC, n.rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: row.get(2)?,
                        content: row.get(3)?,
                        reference_id: row.get(4)?,
                        actor_id: row.get(5)?,
                        is_read: row.get(6)?,
                        created_at: row.get(7)?,
                        invitation_status: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })?;

        Ok(rows.into_iter().filter_map(NotificationRow::into_notification).collect())
    }

    /// Returns false if the notification does not exist or belongs to someone else.
    pub fn mark_notification_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                params![notification_id.to_string(), user_id.to_string()],
            )?;
            Ok(updated > 0)
        })
    }

    /// Marks every unread `kind` notification about `reference_id` owned by
    /// `user_id` as read, e.g. once an invitation has been answered.
    pub fn mark_reference_read(
        &self,
        user_id: Uuid,
        reference_id: Uuid,
        kind: NotificationKind,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1
                 WHERE user_id = ?1 AND reference_id = ?2 AND type = ?3 AND is_read = 0",
                params![user_id.to_string(), reference_id.to_string(), kind.as_str()],
            )?;
            Ok(updated)
        })
    }

    /// Clears the creator's unread notice for one user's join request, leaving
    /// other pending requests for the same group untouched.
    pub fn mark_join_request_read(
        &self,
        creator_id: Uuid,
        group_id: Uuid,
        requester_id: Uuid,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1
                 WHERE user_id = ?1 AND reference_id = ?2 AND actor_id = ?3 AND type = ?4 AND is_read = 0",
                params![
                    creator_id.to_string(),
                    group_id.to_string(),
                    requester_id.to_string(),
                    NotificationKind::GroupJoinRequest.as_str()
                ],
            )?;
            Ok(updated)
        })
    }
}

// -- Statement-level helpers --
//
// These take a bare `&Connection` so they compose inside `Database::with_tx`.

pub fn user_exists(conn: &Connection, user_id: Uuid) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM users WHERE id = ?1)",
        [user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn display_name(conn: &Connection, user_id: Uuid) -> Result<Option<String>> {
    let row = conn
        .query_row(
            "SELECT first_name, last_name, nickname FROM users WHERE id = ?1",
            [user_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(first, last, nick)| display_name_of(&first, &last, nick.as_deref())))
}

pub fn group_title(conn: &Connection, group_id: Uuid) -> Result<Option<String>> {
    conn.query_row("SELECT title FROM groups WHERE id = ?1", [group_id.to_string()], |row| {
        row.get(0)
    })
    .optional()
}

pub fn group_creator(conn: &Connection, group_id: Uuid) -> Result<Option<Uuid>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT creator_id FROM groups WHERE id = ?1",
            [group_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|s| s.parse().map_err(|e| anyhow!("Corrupt creator_id '{}': {}", s, e)))
        .transpose()
}

pub fn membership_status(
    conn: &Connection,
    group_id: Uuid,
    user_id: Uuid,
) -> Result<Option<MembershipStatus>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT status FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|s| s.parse().map_err(|e| anyhow!("Corrupt membership status: {}", e)))
        .transpose()
}

pub fn is_accepted_member(conn: &Connection, group_id: Uuid, user_id: Uuid) -> Result<bool> {
    Ok(membership_status(conn, group_id, user_id)? == Some(MembershipStatus::Accepted))
}

pub fn accepted_members(conn: &Connection, group_id: Uuid) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM group_members WHERE group_id = ?1 AND status = 'accepted'",
    )?;

    let ids = stmt
        .query_map([group_id.to_string()], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(ids
        .into_iter()
        .filter_map(|id| match id.parse() {
            Ok(uid) => Some(uid),
            Err(e) => {
                warn!("Corrupt member id '{}' in group {}: {}", id, group_id, e);
                None
            }
        })
        .collect())
}

/// Inserts a private or group message into its table according to `kind`.
pub fn insert_message(conn: &Connection, message: &ChatMessage) -> Result<()> {
    let created_at = format_timestamp(message.created_at);

    match message.kind {
        MessageKind::PrivateMessage => {
            let recipient_id = message
                .recipient_id
                .ok_or_else(|| anyhow!("Private message {} has no recipient", message.id))?;
            conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, content, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    message.sender_id.to_string(),
                    recipient_id.to_string(),
                    message.content,
                    message.is_read,
                    created_at
                ],
            )?;
        }
        MessageKind::GroupMessage => {
            let group_id = message
                .group_id
                .ok_or_else(|| anyhow!("Group message {} has no group", message.id))?;
            conn.execute(
                "INSERT INTO group_messages (id, group_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id.to_string(),
                    group_id.to_string(),
                    message.sender_id.to_string(),
                    message.content,
                    created_at
                ],
            )?;
        }
    }

    debug!("Stored {:?} {}", message.kind, message.id);
    Ok(())
}

/// Whether an unread notification with exactly this `(user, reference, kind)` exists.
pub fn notification_exists(
    conn: &Connection,
    user_id: Uuid,
    reference_id: Uuid,
    kind: NotificationKind,
) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (
             SELECT 1 FROM notifications
             WHERE user_id = ?1 AND reference_id = ?2 AND type = ?3 AND is_read = 0
         )",
        params![user_id.to_string(), reference_id.to_string(), kind.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn insert_group_event(conn: &Connection, event: &GroupEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO group_events (id, group_id, creator_id, title, description, event_time, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.id.to_string(),
            event.group_id.to_string(),
            event.creator_id.to_string(),
            event.title,
            event.description,
            format_timestamp(event.event_time),
            format_timestamp(event.created_at)
        ],
    )?;
    Ok(())
}

pub fn insert_notification(conn: &Connection, notification: &Notification) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications (id, user_id, type, content, reference_id, actor_id, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            notification.id.to_string(),
            notification.user_id.to_string(),
            notification.kind.as_str(),
            notification.content,
            notification.reference_id.to_string(),
            notification.actor_id.map(|id| id.to_string()),
            notification.is_read,
            format_timestamp(notification.created_at)
        ],
    )?;
    Ok(())
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, password, first_name, last_name, nickname, created_at
         FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                first_name: row.get(3)?,
                last_name: row.get(4)?,
                nickname: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(db: &Database, first: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(id, &format!("{}@example.com", first), "hash", first, "Tester", None)
            .unwrap();
        id
    }

    fn count(db: &Database, sql: &str) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [], |r| r.get(0))?)).unwrap()
    }

    #[test]
    fn creator_is_first_accepted_member() {
        let db = Database::open_in_memory().unwrap();
        let alice = user(&db, "alice");
        let group = db.create_group(alice, "Climbers", "").unwrap();

        let members = db.with_conn(|c| accepted_members(c, group.id)).unwrap();
        assert_eq!(members, vec![alice]);
        assert_eq!(db.get_group_creator(group.id).unwrap(), Some(alice));
        assert_eq!(
            db.with_conn(|c| group_title(c, group.id)).unwrap().as_deref(),
            Some("Climbers")
        );
    }

    #[test]
    fn invites_reopen_declined_and_skip_members() {
        let db = Database::open_in_memory().unwrap();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");
        let group = db.create_group(alice, "Climbers", "").unwrap();

        let pending = db.invite_members(group.id, &[alice, bob, Uuid::new_v4()]).unwrap();
        assert_eq!(pending, vec![bob]);

        assert!(!db.resolve_pending_membership(group.id, bob, MembershipOrigin::Request, true).unwrap());
        assert!(db.resolve_pending_membership(group.id, bob, MembershipOrigin::Invite, false).unwrap());
        assert!(!db.resolve_pending_membership(group.id, bob, MembershipOrigin::Invite, true).unwrap());

        let pending = db.invite_members(group.id, &[bob, carol, carol]).unwrap();
        assert_eq!(pending, vec![bob, carol]);
        let status = db.with_conn(|c| membership_status(c, group.id, bob)).unwrap();
        assert_eq!(status, Some(MembershipStatus::Pending));
    }

    #[test]
    fn join_requests_report_existing_state() {
        let db = Database::open_in_memory().unwrap();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let group = db.create_group(alice, "Climbers", "").unwrap();

        assert_eq!(
            db.request_join(group.id, bob).unwrap(),
            JoinOutcome::Requested { creator_id: alice }
        );
        assert_eq!(db.request_join(group.id, bob).unwrap(), JoinOutcome::AlreadyPending);
        assert_eq!(db.request_join(group.id, alice).unwrap(), JoinOutcome::AlreadyMember);
        assert_eq!(
            db.request_join(Uuid::new_v4(), bob).unwrap(),
            JoinOutcome::NoSuchGroup
        );

        // A requester cannot answer their own request as if it were an invite
        assert!(!db.resolve_pending_membership(group.id, bob, MembershipOrigin::Invite, true).unwrap());
        assert!(db.resolve_pending_membership(group.id, bob, MembershipOrigin::Request, true).unwrap());
        assert!(db.is_group_member(group.id, bob).unwrap());
    }

    #[test]
    fn private_history_is_split_by_direction() {
        let db = Database::open_in_memory().unwrap();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");

        db.with_tx(|tx| {
            insert_message(tx, &ChatMessage::private(alice, bob, "hi bob".into()))?;
            insert_message(tx, &ChatMessage::private(bob, alice, "hi alice".into()))?;
            insert_message(tx, &ChatMessage::private(alice, bob, "how are you".into()))
        })
        .unwrap();

        let history = db.private_history(alice, bob).unwrap();
        assert_eq!(history.sent.len(), 2);
        assert_eq!(history.received.len(), 1);
        assert_eq!(history.sent[0].content, "hi bob");
        assert_eq!(history.received[0].recipient_id, Some(alice));

        assert_eq!(db.mark_messages_read(alice, bob).unwrap(), 2);
        assert_eq!(db.mark_messages_read(alice, bob).unwrap(), 0);
        assert!(db.private_history(bob, alice).unwrap().received.iter().all(|m| m.is_read));
    }

    #[test]
    fn failed_transaction_leaves_nothing_behind() {
        let db = Database::open_in_memory().unwrap();
        let alice = user(&db, "alice");
        let group = db.create_group(alice, "Climbers", "").unwrap();

        let result = db.with_tx(|tx| {
            insert_message(tx, &ChatMessage::group(alice, group.id, "first".into()))?;
            Err::<(), _>(anyhow!("boom"))
        });
        assert!(result.is_err());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM group_messages"), 0);
    }

    #[test]
    fn notification_exists_only_counts_unread() {
        let db = Database::open_in_memory().unwrap();
        let alice = user(&db, "alice");
        let group = db.create_group(alice, "Climbers", "").unwrap();

        let n = Notification::new(alice, NotificationKind::GroupInvite, "join us".into(), group.id);
        db.with_conn(|c| insert_notification(c, &n)).unwrap();

        let exists = |db: &Database| {
            db.with_conn(|c| notification_exists(c, alice, group.id, NotificationKind::GroupInvite))
                .unwrap()
        };
        assert!(exists(&db));
        assert!(!db
            .with_conn(|c| notification_exists(c, alice, group.id, NotificationKind::GroupEvent))
            .unwrap());

        assert!(db.mark_notification_read(n.id, alice).unwrap());
        assert!(!exists(&db));

        let listed = db.notifications_for_user(alice).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_read);
        assert_eq!(listed[0].invitation_status, Some(MembershipStatus::Accepted));
    }

    #[test]
    fn unread_invites_are_unique_in_storage() {
        let db = Database::open_in_memory().unwrap();
        let alice = user(&db, "alice");
        let group = db.create_group(alice, "Climbers", "").unwrap();

        let first = Notification::new(alice, NotificationKind::GroupInvite, "a".into(), group.id);
        let second = Notification::new(alice, NotificationKind::GroupInvite, "b".into(), group.id);
        db.with_conn(|c| insert_notification(c, &first)).unwrap();
        assert!(db.with_conn(|c| insert_notification(c, &second)).is_err());

        // Message notifications are never collapsed
        let m1 = Notification::new(alice, NotificationKind::GroupMessage, "x".into(), group.id);
        let m2 = Notification::new(alice, NotificationKind::GroupMessage, "y".into(), group.id);
        db.with_conn(|c| insert_notification(c, &m1)).unwrap();
        db.with_conn(|c| insert_notification(c, &m2)).unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM notifications"), 3);
    }

    #[test]
    fn answering_an_invite_clears_it_for_reinvites() {
        let db = Database::open_in_memory().unwrap();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let group = db.create_group(alice, "Climbers", "").unwrap();

        let invite = Notification::new(bob, NotificationKind::GroupInvite, "join".into(), group.id);
        db.with_conn(|c| insert_notification(c, &invite)).unwrap();
        db.with_conn(|c| {
            insert_message(c, &ChatMessage::private(alice, bob, "psst".into()))?;
            insert_message(c, &ChatMessage::private(alice, bob, "psst again".into()))
        })
        .unwrap();

        assert_eq!(db.unread_senders(bob).unwrap(), vec![alice]);
        assert!(db.unread_senders(alice).unwrap().is_empty());

        assert_eq!(
            db.mark_reference_read(bob, group.id, NotificationKind::GroupInvite).unwrap(),
            1
        );
        assert!(!db
            .with_conn(|c| notification_exists(c, bob, group.id, NotificationKind::GroupInvite))
            .unwrap());
    }

    #[test]
    fn join_requests_are_tracked_per_requester() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, "owner");
        let xavier = user(&db, "xavier");
        let yara = user(&db, "yara");
        let group = db.create_group(owner, "Climbers", "").unwrap();

        for requester in [xavier, yara] {
            let n = Notification::new(owner, NotificationKind::GroupJoinRequest, "let me in".into(), group.id)
                .by(requester);
            db.with_conn(|c| insert_notification(c, &n)).unwrap();
        }
        assert_eq!(
            count(&db, "SELECT COUNT(*) FROM notifications WHERE is_read = 0"),
            2
        );

        assert_eq!(db.mark_join_request_read(owner, group.id, xavier).unwrap(), 1);
        let unread: Vec<_> = db
            .notifications_for_user(owner)
            .unwrap()
            .into_iter()
            .filter(|n| !n.is_read)
            .collect();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].actor_id, Some(yara));
    }
}
