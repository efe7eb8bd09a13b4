use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use agora_types::events::{ClientFrame, FrameError, ServerFrame};

use crate::error::GatewayError;
use crate::fanout::Fanout;
use crate::registry::ConnectionHandle;

/// Server sends a Ping every 15 seconds. Two missed Pongs (~30s) drop the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_HEARTBEATS: u8 = 2;

/// Drive one authenticated socket until either side goes away.
///
/// The session was checked at the HTTP upgrade, so the connection is
/// registered immediately. A newer connection for the same user takes over
/// live pushes; this one keeps serving its own requests until it closes.
pub async fn handle_connection(socket: WebSocket, fanout: Fanout, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    let (handle, mut rx) = ConnectionHandle::new(user_id);
    let conn_id = handle.id();
    fanout.registry().register(user_id, handle.clone()).await;
    info!("{} connected to gateway (conn {})", user_id, conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Writer: the only task touching the sink, so frames leave in enqueue order.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode frame for {}: {}", user_id, e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MAX_MISSED_HEARTBEATS {
                            warn!("Heartbeat timeout for {} (missed {} pongs), dropping connection", user_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader: frames from one connection are handled strictly in arrival order.
    let recv_fanout = fanout.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let frame = match ClientFrame::parse(&text) {
                        Ok(frame) => frame,
                        Err(FrameError::UnknownKind(kind)) => {
                            warn!("{} sent unknown frame type `{}`, ignoring", user_id, kind);
                            continue;
                        }
                        Err(e) => {
                            warn!(
                                "{} sent bad frame: {} -- raw: {}",
                                user_id,
                                e,
                                text.chars().take(200).collect::<String>()
                            );
                            continue;
                        }
                    };

                    if let Some(reply) = handle_frame(&recv_fanout, user_id, frame).await {
                        if handle.push(reply).is_err() {
                            break;
                        }
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if fanout.registry().remove_if_current(user_id, conn_id).await {
        debug!("Unregistered conn {} for {}", conn_id, user_id);
    }
    info!("{} disconnected from gateway (conn {})", user_id, conn_id);
}

/// Execute one client frame on behalf of `user_id` and build the reply, if any.
pub async fn handle_frame(fanout: &Fanout, user_id: Uuid, frame: ClientFrame) -> Option<ServerFrame> {
    let request = frame.kind();

    let result: Result<Option<ServerFrame>, GatewayError> = match frame {
        ClientFrame::GetNotifications => fanout
            .blocking(move |db| db.notifications_for_user(user_id))
            .await
            .map(|list| Some(ServerFrame::Notifications(list))),

        ClientFrame::MarkRead { notification_id } => fanout
            .blocking(move |db| db.mark_notification_read(notification_id, user_id))
            .await
            .map(|updated| {
                if !updated {
                    debug!("{} marked unknown notification {}", user_id, notification_id);
                }
                None
            }),

        ClientFrame::SendPrivateMessage { recipient_id, content } => fanout
            .send_private_message(user_id, recipient_id, content)
            .await
            .map(|msg| Some(ServerFrame::MessageSent(msg))),

        ClientFrame::SendGroupMessage { group_id, content } => fanout
            .send_group_message(group_id, user_id, content)
            .await
            .map(|msg| Some(ServerFrame::MessageSent(msg))),

        ClientFrame::GetPrivateHistory { other_user_id } => fanout
            .blocking(move |db| db.private_history(user_id, other_user_id))
            .await
            .map(|history| Some(ServerFrame::PrivateMessageHistory(history))),

        ClientFrame::GetGroupHistory { group_id } => match fanout.require_member(group_id, user_id).await {
            Ok(()) => fanout
                .blocking(move |db| db.group_history(group_id))
                .await
                .map(|history| Some(ServerFrame::GroupMessageHistory(history))),
            Err(e) => Err(e),
        },

        ClientFrame::MarkMessagesRead { sender_id } => fanout
            .blocking(move |db| db.mark_messages_read(sender_id, user_id))
            .await
            .map(|updated| Some(ServerFrame::MessagesMarkedRead { sender_id, updated })),
    };

    match result {
        Ok(reply) => reply,
        Err(e) => {
            warn!("{} request `{}` failed: {}", user_id, request, e);
            Some(ServerFrame::Error {
                request: request.to_string(),
                message: e.to_string(),
            })
        }
    }
}
