//! Turns "something happened" into durable rows plus best-effort live pushes.
//!
//! Every write follows the same sequence: authorize, run one atomic unit
//! (the event row and all notification rows, or nothing), and only after the
//! commit push frames to whichever targets are registered. Push failures are
//! logged and dropped; the stored rows are the source of truth.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use agora_db::Database;
use agora_db::rusqlite::Connection;
use agora_db::queries::{
    accepted_members, display_name, group_title, insert_message, insert_notification,
    is_accepted_member, user_exists,
};
use agora_types::events::ServerFrame;
use agora_types::models::{ChatMessage, Notification, NotificationKind};

use crate::dedup::should_create;
use crate::error::GatewayError;
use crate::registry::Registry;

pub const MAX_CONTENT_LEN: usize = 4000;

/// Who a notice is addressed to. The actor is always excluded.
#[derive(Debug, Clone)]
pub enum Audience {
    User(Uuid),
    Users(Vec<Uuid>),
    /// Every accepted member of the group.
    Group(Uuid),
}

/// A notification-only occurrence (invite, join request, new group event).
#[derive(Debug, Clone)]
pub struct Notice {
    pub actor: Uuid,
    pub kind: NotificationKind,
    pub reference_id: Uuid,
    pub content: String,
    pub audience: Audience,
}

#[derive(Clone)]
pub struct Fanout {
    db: Arc<Database>,
    registry: Registry,
}

impl Fanout {
    pub fn new(db: Arc<Database>, registry: Registry) -> Self {
        Self { db, registry }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Store a private message (plus a notification for the recipient when the
    /// sender's name is known) and push it to the recipient if online.
    pub async fn send_private_message(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        content: String,
    ) -> Result<ChatMessage, GatewayError> {
        let content = validate_content(content)?;
        if sender_id == recipient_id {
            return Err(GatewayError::Validation("cannot message yourself".into()));
        }

        let recipient_known = self
            .blocking(move |db| db.with_conn(|conn| user_exists(conn, recipient_id)))
            .await?;
        if !recipient_known {
            return Err(GatewayError::Validation(format!("unknown recipient {}", recipient_id)));
        }

        let message = ChatMessage::private(sender_id, recipient_id, content);
        let message = self
            .blocking(move |db| {
                db.with_tx(|tx| {
                    insert_message(tx, &message)?;

                    if let Some(sender_name) = display_name(tx, sender_id)? {
                        let kind = NotificationKind::PrivateMessage;
                        if should_create(tx, recipient_id, message.id, kind)? {
                            let notification = Notification::new(
                                recipient_id,
                                kind,
                                format!("New message from {}: {}", sender_name, message.content),
                                message.id,
                            )
                            .by(sender_id);
                            insert_notification(tx, &notification)?;
                        }
                    }

                    Ok(message)
                })
            })
            .await?;

        self.deliver(vec![(recipient_id, ServerFrame::live(message.clone()))])
            .await;

        Ok(message)
    }

    /// Store a group message with one notification per accepted member other
    /// than the sender, then push the message to each member that is online.
    pub async fn send_group_message(
        &self,
        group_id: Uuid,
        sender_id: Uuid,
        content: String,
    ) -> Result<ChatMessage, GatewayError> {
        let content = validate_content(content)?;
        self.require_member(group_id, sender_id).await?;

        let message = ChatMessage::group(sender_id, group_id, content);
        let (message, targets) = self
            .blocking(move |db| {
                db.with_tx(|tx| {
                    insert_message(tx, &message)?;

                    let sender_name =
                        display_name(tx, sender_id)?.unwrap_or_else(|| "Someone".to_string());
                    let title = group_title(tx, group_id)?
                        .ok_or_else(|| anyhow!("Group {} vanished mid-send", group_id))?;

                    let targets = exclude_actor(accepted_members(tx, group_id)?, sender_id);
                    let kind = NotificationKind::GroupMessage;
                    for target in &targets {
                        if !should_create(tx, *target, message.id, kind)? {
                            continue;
                        }
                        let notification = Notification::new(
                            *target,
                            kind,
                            format!(
                                "New message from {} in {}: {}",
                                sender_name, title, message.content
                            ),
                            message.id,
                        )
                        .by(sender_id);
                        insert_notification(tx, &notification)?;
                    }

                    Ok((message, targets))
                })
            })
            .await?;

        let deliveries = targets
            .iter()
            .map(|target| (*target, ServerFrame::live(message.clone())))
            .collect();
        let delivered = self.deliver(deliveries).await;

        info!(
            "Group message {} in {} stored for {} members, {} delivered live",
            message.id,
            group_id,
            targets.len(),
            delivered
        );
        Ok(message)
    }

    /// Store one notification per resolved target (skipping duplicates the
    /// dedup guard rejects) and push each to its owner if online. Returns the
    /// rows actually created.
    pub async fn publish_notice(&self, notice: Notice) -> Result<Vec<Notification>, GatewayError> {
        self.publish_notice_with(notice, |_| Ok(())).await
    }

    /// Like [`Fanout::publish_notice`], but `record` writes the row the notice
    /// is about first, in the same unit. If any notification insert fails the
    /// record is rolled back with it.
    pub async fn publish_notice_with<F>(
        &self,
        notice: Notice,
        record: F,
    ) -> Result<Vec<Notification>, GatewayError>
    where
        F: FnOnce(&Connection) -> anyhow::Result<()> + Send + 'static,
    {
        if let Audience::Group(group_id) = notice.audience {
            self.require_member(group_id, notice.actor).await?;
        }

        let created = self
            .blocking(move |db| {
                db.with_tx(|tx| {
                    record(tx)?;

                    let targets = match &notice.audience {
                        Audience::User(user_id) => vec![*user_id],
                        Audience::Users(user_ids) => user_ids.clone(),
                        Audience::Group(group_id) => accepted_members(tx, *group_id)?,
                    };

                    let mut created = Vec::new();
                    for target in exclude_actor(targets, notice.actor) {
                        if !should_create(tx, target, notice.reference_id, notice.kind)? {
                            debug!(
                                "Suppressed duplicate {} for {} (ref {})",
                                notice.kind, target, notice.reference_id
                            );
                            continue;
                        }
                        let notification = Notification::new(
                            target,
                            notice.kind,
                            notice.content.clone(),
                            notice.reference_id,
                        )
                        .by(notice.actor);
                        insert_notification(tx, &notification)?;
                        created.push(notification);
                    }

                    Ok(created)
                })
            })
            .await?;

        let deliveries = created
            .iter()
            .map(|n| (n.user_id, ServerFrame::Notification(n.clone())))
            .collect();
        self.deliver(deliveries).await;

        Ok(created)
    }

    /// Authorization gate shared by group writes and group reads.
    pub async fn require_member(&self, group_id: Uuid, user_id: Uuid) -> Result<(), GatewayError> {
        let is_member = self
            .blocking(move |db| db.with_conn(|conn| is_accepted_member(conn, group_id, user_id)))
            .await?;

        if is_member {
            Ok(())
        } else {
            Err(GatewayError::Authorization(format!(
                "{} is not a member of group {}",
                user_id, group_id
            )))
        }
    }

    /// Run blocking store work off the async runtime. Any failure is a
    /// persistence failure.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T, GatewayError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                GatewayError::Persistence(anyhow!("store task failed: {}", e))
            })?
            .map_err(|e| {
                warn!("Store operation failed: {:#}", e);
                GatewayError::Persistence(e)
            })
    }

    /// Push phase. Never fails: an offline or closed target simply relies on
    /// the stored copy. Returns how many frames were enqueued.
    async fn deliver(&self, deliveries: Vec<(Uuid, ServerFrame)>) -> usize {
        let mut delivered = 0;
        for (user_id, frame) in deliveries {
            match self.registry.lookup(user_id).await {
                Some(handle) => match handle.push(frame) {
                    Ok(()) => delivered += 1,
                    Err(e) => warn!("Live push dropped: {}", e),
                },
                None => trace!("{} offline, skipping live push", user_id),
            }
        }
        delivered
    }
}

fn validate_content(content: String) -> Result<String, GatewayError> {
    if content.trim().is_empty() {
        return Err(GatewayError::Validation("content is empty".into()));
    }
    if content.len() > MAX_CONTENT_LEN {
        return Err(GatewayError::Validation(format!(
            "content exceeds {} bytes",
            MAX_CONTENT_LEN
        )));
    }
    Ok(content)
}

/// Drop the actor and repeated ids, keeping first-seen order.
fn exclude_actor(targets: Vec<Uuid>, actor: Uuid) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(targets.len());
    seen.insert(actor);
    targets.into_iter().filter(|target| seen.insert(*target)).collect()
}
