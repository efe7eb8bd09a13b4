use agora_db::queries::notification_exists;
use agora_db::rusqlite::Connection;
use agora_types::models::NotificationKind;
use uuid::Uuid;

/// Decide whether a notification row should be created for `user_id`.
///
/// Kinds that collapse (see [`NotificationKind::is_deduplicated`]) are skipped
/// while an unread row with the same `(user, reference, kind)` exists. Call it
/// on the connection of the unit that will insert the row, so the check and
/// the insert are serialized together.
pub fn should_create(
    conn: &Connection,
    user_id: Uuid,
    reference_id: Uuid,
    kind: NotificationKind,
) -> anyhow::Result<bool> {
    if !kind.is_deduplicated() {
        return Ok(true);
    }
    Ok(!notification_exists(conn, user_id, reference_id, kind)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_db::Database;
    use agora_db::queries::insert_notification;
    use agora_types::models::Notification;

    fn setup() -> (Database, Uuid, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        db.create_user(user, "dee@example.com", "hash", "Dee", "Dup", None).unwrap();
        let group = db.create_group(user, "Readers", "").unwrap();
        (db, user, group.id)
    }

    #[test]
    fn invite_is_suppressed_while_unread() {
        let (db, user, group) = setup();
        let kind = NotificationKind::GroupInvite;

        assert!(db.with_conn(|c| should_create(c, user, group, kind)).unwrap());

        let n = Notification::new(user, kind, "invited".into(), group);
        db.with_conn(|c| insert_notification(c, &n)).unwrap();
        assert!(!db.with_conn(|c| should_create(c, user, group, kind)).unwrap());

        // A different kind against the same reference is independent
        assert!(db
            .with_conn(|c| should_create(c, user, group, NotificationKind::GroupJoinRequest))
            .unwrap());

        // Once read, a fresh invite may be created again
        db.mark_notification_read(n.id, user).unwrap();
        assert!(db.with_conn(|c| should_create(c, user, group, kind)).unwrap());
    }

    #[test]
    fn messages_and_join_requests_are_never_suppressed() {
        let (db, user, group) = setup();

        for kind in [NotificationKind::GroupMessage, NotificationKind::GroupJoinRequest] {
            let n = Notification::new(user, kind, "hi".into(), group).by(user);
            db.with_conn(|c| insert_notification(c, &n)).unwrap();
            assert!(db.with_conn(|c| should_create(c, user, group, kind)).unwrap());
        }
    }
}
