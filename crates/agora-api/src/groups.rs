//! Group membership and event writes. Membership changes commit first and
//! then publish their notice as a separate unit. A new event and its notices
//! commit together.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use agora_db::models::{JoinOutcome, MembershipOrigin};
use agora_db::queries::insert_group_event;
use agora_gateway::fanout::{Audience, Notice};
use agora_types::api::{
    CreateEventRequest, CreateGroupRequest, InviteRequest, InviteResponse, JoinResponse,
    RespondRequest,
};
use agora_types::models::{GroupEvent, MembershipStatus, NotificationKind};

use crate::auth::AppState;
use crate::error::status_for;
use crate::middleware::AuthUser;

pub async fn create_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let title = req.title.trim().to_string();
    if title.is_empty() || title.len() > 100 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let creator = user.user_id;
    let group = state
        .fanout
        .blocking(move |db| db.create_group(creator, &title, &req.description))
        .await
        .map_err(status_for)?;

    info!("{} created group {} ({})", creator, group.title, group.id);
    Ok((StatusCode::CREATED, Json(group)))
}

/// Any accepted member may invite. Invitees end up pending and receive one
/// unread invite notification at most.
pub async fn invite(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<InviteRequest>,
) -> Result<Json<InviteResponse>, StatusCode> {
    state
        .fanout
        .require_member(group_id, user.user_id)
        .await
        .map_err(status_for)?;

    let (invited, title) = state
        .fanout
        .blocking(move |db| {
            let invited = db.invite_members(group_id, &req.user_ids)?;
            let title = db.with_conn(|conn| agora_db::queries::group_title(conn, group_id))?;
            Ok((invited, title.unwrap_or_default()))
        })
        .await
        .map_err(status_for)?;

    let created = state
        .fanout
        .publish_notice(Notice {
            actor: user.user_id,
            kind: NotificationKind::GroupInvite,
            reference_id: group_id,
            content: format!("You've been invited to join {}", title),
            audience: Audience::Users(invited.clone()),
        })
        .await
        .map_err(status_for)?;

    Ok(Json(InviteResponse {
        invited,
        notified: created.len(),
    }))
}

pub async fn request_join(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let requester = user.user_id;
    let (outcome, name) = state
        .fanout
        .blocking(move |db| {
            let outcome = db.request_join(group_id, requester)?;
            let name = db.with_conn(|conn| agora_db::queries::display_name(conn, requester))?;
            Ok((outcome, name.unwrap_or_else(|| "Someone".to_string())))
        })
        .await
        .map_err(status_for)?;

    match outcome {
        JoinOutcome::NoSuchGroup => Err(StatusCode::NOT_FOUND),
        JoinOutcome::AlreadyMember => Err(StatusCode::CONFLICT),
        JoinOutcome::AlreadyPending => {
            debug!("{} already asked to join {}", requester, group_id);
            Ok((
                StatusCode::ACCEPTED,
                Json(JoinResponse { status: MembershipStatus::Pending }),
            ))
        }
        JoinOutcome::Requested { creator_id } => {
            state
                .fanout
                .publish_notice(Notice {
                    actor: requester,
                    kind: NotificationKind::GroupJoinRequest,
                    reference_id: group_id,
                    content: format!("{} wants to join your group", name),
                    audience: Audience::User(creator_id),
                })
                .await
                .map_err(status_for)?;

            Ok((
                StatusCode::ACCEPTED,
                Json(JoinResponse { status: MembershipStatus::Pending }),
            ))
        }
    }
}

/// Without `user_id` the caller answers their own invitation. With it, the
/// group creator answers that user's join request.
pub async fn respond(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> Result<StatusCode, StatusCode> {
    let caller = user.user_id;
    let (subject, origin) = match req.user_id {
        Some(requester) if requester != caller => {
            let creator = state
                .fanout
                .blocking(move |db| db.get_group_creator(group_id))
                .await
                .map_err(status_for)?
                .ok_or(StatusCode::NOT_FOUND)?;
            if creator != caller {
                return Err(StatusCode::FORBIDDEN);
            }
            (requester, MembershipOrigin::Request)
        }
        _ => (caller, MembershipOrigin::Invite),
    };

    let accept = req.accept;
    let resolved = state
        .fanout
        .blocking(move |db| {
            if !db.resolve_pending_membership(group_id, subject, origin, accept)? {
                return Ok(false);
            }
            match origin {
                MembershipOrigin::Invite => {
                    db.mark_reference_read(caller, group_id, NotificationKind::GroupInvite)?
                }
                MembershipOrigin::Request => db.mark_join_request_read(caller, group_id, subject)?,
            };
            Ok(true)
        })
        .await
        .map_err(status_for)?;

    if !resolved {
        return Err(StatusCode::NOT_FOUND);
    }

    info!(
        "{} {} membership of {} in {}",
        caller,
        if accept { "accepted" } else { "declined" },
        subject,
        group_id
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    state
        .fanout
        .require_member(group_id, user.user_id)
        .await
        .map_err(status_for)?;

    let event = GroupEvent {
        id: Uuid::new_v4(),
        group_id,
        creator_id: user.user_id,
        title,
        description: req.description,
        event_time: req.event_time,
        created_at: Utc::now(),
    };

    let notice = Notice {
        actor: user.user_id,
        kind: NotificationKind::GroupEvent,
        reference_id: event.id,
        content: format!("New event '{}' created in your group", event.title),
        audience: Audience::Group(group_id),
    };
    let stored = event.clone();
    let notified = state
        .fanout
        .publish_notice_with(notice, move |tx| insert_group_event(tx, &stored))
        .await
        .map_err(status_for)?;

    debug!("Event {} in {} notified {} members", event.id, group_id, notified.len());

    Ok((StatusCode::CREATED, Json(event)))
}
