//! WebSocket 连接生命周期
//!
//! 每个长连接一个任务对：发送任务串行化所有对 socket 写端的访问，
//! 接收任务解析入站帧并分发给用例服务。连接建立时挂接身份的
//! 会话房间快照；断开时按固定顺序清理输入状态、房间、在线状态。

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use application::{
    AckBody, ApplicationError, CreateConversationRequest, OutboundEvent, PresenceTransition,
    SendMessageRequest, SendTicketMessageRequest, UpdateTicketRequest,
};
use domain::{ConnectionId, ConversationId, Identity, RoomKey, TicketId};

use crate::protocol::{ClientEvent, InboundFrame};
use crate::state::AppState;

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

pub async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let connection_id = ConnectionId::generate();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<OutboundEvent>();
    state.rooms.register(connection_id, identity, event_tx);

    // 连接时的快照房间集合；会话中途的成员变动由重连或 conversation:create 覆盖
    let snapshot = match state
        .conversation_service
        .rooms_for_user(identity.user_id)
        .await
    {
        Ok(rooms) => rooms,
        Err(err) => {
            tracing::error!(error = %err, user_id = %identity.user_id, "failed to load room snapshot");
            state.rooms.unregister(connection_id);
            return;
        }
    };
    for room in &snapshot {
        state.rooms.join(*room, connection_id);
    }

    // 身份的第一条连接才是 online 边沿
    if state.presence.connect(identity.user_id, connection_id) == PresenceTransition::CameOnline {
        let event = OutboundEvent::UserOnline {
            user_id: identity.user_id,
        };
        for room in &snapshot {
            state.rooms.broadcast(*room, &event, Some(connection_id));
        }
    }

    tracing::info!(
        connection_id = %connection_id,
        user_id = %identity.user_id,
        rooms = snapshot.len(),
        "websocket connected"
    );

    let (mut sender, mut incoming) = socket.split();

    // mpsc channel 解耦对 sender 的访问
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

    // 发送任务：统一处理所有对 WebSocket sender 的写操作
    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => match cmd {
                    WsCommand::SendText(text) => {
                        if sender.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    WsCommand::SendPong(data) => {
                        if sender.send(WsMessage::Pong(data.into())).await.is_err() {
                            break;
                        }
                    }
                },
                Some(event) = event_rx.recv() => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to serialize outbound event");
                            continue;
                        }
                    };
                    if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
        tracing::debug!("websocket send task finished");
    });

    // 接收任务：解析并分发入站帧
    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = incoming.next().await {
            match message {
                WsMessage::Text(text) => {
                    handle_frame(&recv_state, identity, connection_id, text.to_string()).await;
                }
                WsMessage::Ping(data) => {
                    if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                WsMessage::Close(_) => break,
                WsMessage::Pong(_) | WsMessage::Binary(_) => {}
            }
        }
        tracing::debug!("websocket receive task finished");
    });

    // 任意一个任务结束即视为连接断开
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    // 输入状态先清：此刻房间成员关系还在，显式 typing:stop 能送达
    for room in state.typing.clear_user(identity.user_id) {
        let (conversation_id, ticket_id) = typing_scope(room);
        state.rooms.broadcast(
            room,
            &OutboundEvent::TypingStop {
                conversation_id,
                ticket_id,
                user_id: identity.user_id,
            },
            Some(connection_id),
        );
    }

    let joined = state.rooms.unregister(connection_id);
    // 最后一条连接关闭才是 offline 边沿
    if state.presence.disconnect(identity.user_id, connection_id)
        == PresenceTransition::WentOffline
    {
        let event = OutboundEvent::UserOffline {
            user_id: identity.user_id,
        };
        for room in joined
            .iter()
            .filter(|room| matches!(room, RoomKey::Conversation(_)))
        {
            state.rooms.broadcast(*room, &event, None);
        }
    }

    tracing::info!(
        connection_id = %connection_id,
        user_id = %identity.user_id,
        "websocket disconnected"
    );
}

async fn handle_frame(
    state: &AppState,
    identity: Identity,
    connection_id: ConnectionId,
    text: String,
) {
    let frame: InboundFrame = match serde_json::from_str(&text) {
        Ok(frame) => frame,
        Err(err) => {
            // 协议错误不中断连接，回一个无关联 id 的错误 ack
            state.rooms.send_to_connection(
                connection_id,
                OutboundEvent::Ack(AckBody::error(None, format!("invalid frame: {err}"))),
            );
            return;
        }
    };

    if let Some(ack) = dispatch(state, identity, connection_id, frame).await {
        state
            .rooms
            .send_to_connection(connection_id, OutboundEvent::Ack(ack));
    }
}

/// 把入站事件分发给用例服务。变更型事件恰好返回一个 ack；
/// 输入状态事件 fire-and-forget，返回 None。
async fn dispatch(
    state: &AppState,
    identity: Identity,
    connection_id: ConnectionId,
    frame: InboundFrame,
) -> Option<AckBody> {
    let request_id = frame.request_id;
    match frame.event {
        ClientEvent::MessageSend {
            conversation_id,
            content,
            message_type,
            attachment_url,
        } => {
            let result = state
                .conversation_service
                .send_message(
                    identity,
                    SendMessageRequest {
                        conversation_id,
                        content,
                        message_type,
                        attachment_url,
                    },
                )
                .await;
            Some(ack_with_message(request_id, result))
        }

        ClientEvent::MessageRead { conversation_id } => Some(
            match state
                .conversation_service
                .mark_read(identity, conversation_id)
                .await
            {
                Ok(_) => AckBody::ok(request_id),
                Err(err) => AckBody::error(request_id, err.to_string()),
            },
        ),

        ClientEvent::MessageEdit {
            message_id,
            new_content,
        } => {
            let result = state
                .conversation_service
                .edit_message(identity, message_id, new_content)
                .await;
            Some(ack_with_message(request_id, result))
        }

        ClientEvent::MessageDelete { message_id } => Some(
            match state
                .conversation_service
                .delete_message(identity, message_id)
                .await
            {
                Ok(_) => AckBody::ok(request_id),
                Err(err) => AckBody::error(request_id, err.to_string()),
            },
        ),

        ClientEvent::ConversationCreate {
            participant_ids,
            kind,
            title,
            ad_id,
        } => Some(
            match state
                .conversation_service
                .create_conversation(
                    identity,
                    CreateConversationRequest {
                        participant_ids,
                        kind,
                        title,
                        ad_id,
                    },
                )
                .await
            {
                Ok(conversation) => AckBody::ok_with_conversation(request_id, conversation),
                Err(err) => AckBody::error(request_id, err.to_string()),
            },
        ),

        ClientEvent::TypingStart { conversation_id } => {
            handle_typing(
                state,
                identity,
                connection_id,
                RoomKey::Conversation(ConversationId::from(conversation_id)),
                true,
            );
            None
        }

        ClientEvent::TypingStop { conversation_id } => {
            handle_typing(
                state,
                identity,
                connection_id,
                RoomKey::Conversation(ConversationId::from(conversation_id)),
                false,
            );
            None
        }

        ClientEvent::SupportJoinTicket { ticket_id } => Some(
            match state
                .support_service
                .join_ticket(identity, connection_id, ticket_id)
                .await
            {
                Ok(ticket) => ack_data(request_id, &ticket),
                Err(err) => AckBody::error(request_id, err.to_string()),
            },
        ),

        ClientEvent::SupportLeaveTicket { ticket_id } => {
            state.support_service.leave_ticket(connection_id, ticket_id);
            Some(AckBody::ok(request_id))
        }

        ClientEvent::SupportJoinStaffRoom => Some(
            match state
                .support_service
                .join_staff_room(identity, connection_id)
            {
                Ok(()) => AckBody::ok(request_id),
                Err(err) => AckBody::error(request_id, err.to_string()),
            },
        ),

        ClientEvent::SupportSendMessage {
            ticket_id,
            content,
            is_internal,
        } => {
            let result = state
                .support_service
                .send_message(
                    identity,
                    connection_id,
                    SendTicketMessageRequest {
                        ticket_id,
                        content,
                        is_internal,
                    },
                )
                .await;
            Some(ack_with_message(request_id, result))
        }

        ClientEvent::SupportUpdateTicket {
            ticket_id,
            status,
            priority,
            assigned_to,
        } => Some(
            match state
                .support_service
                .update_ticket(
                    identity,
                    UpdateTicketRequest {
                        ticket_id,
                        status,
                        priority,
                        assigned_to,
                    },
                )
                .await
            {
                Ok(ticket) => ack_data(request_id, &ticket),
                Err(err) => AckBody::error(request_id, err.to_string()),
            },
        ),

        ClientEvent::SupportTypingStart { ticket_id } => {
            handle_typing(
                state,
                identity,
                connection_id,
                RoomKey::Ticket(TicketId::from(ticket_id)),
                true,
            );
            None
        }

        ClientEvent::SupportTypingStop { ticket_id } => {
            handle_typing(
                state,
                identity,
                connection_id,
                RoomKey::Ticket(TicketId::from(ticket_id)),
                false,
            );
            None
        }
    }
}

/// 输入状态只在已加入的房间内有效；边沿去抖由 TypingTracker 决定
fn handle_typing(
    state: &AppState,
    identity: Identity,
    connection_id: ConnectionId,
    room: RoomKey,
    start: bool,
) {
    if !state.rooms.is_joined(room, connection_id) {
        return;
    }
    let (conversation_id, ticket_id) = typing_scope(room);
    let user_id = identity.user_id;
    if start {
        if state.typing.start(room, user_id) {
            state.rooms.broadcast(
                room,
                &OutboundEvent::TypingStart {
                    conversation_id,
                    ticket_id,
                    user_id,
                },
                Some(connection_id),
            );
        }
    } else if state.typing.stop(room, user_id) {
        state.rooms.broadcast(
            room,
            &OutboundEvent::TypingStop {
                conversation_id,
                ticket_id,
                user_id,
            },
            Some(connection_id),
        );
    }
}

fn typing_scope(room: RoomKey) -> (Option<ConversationId>, Option<TicketId>) {
    match room {
        RoomKey::Conversation(id) => (Some(id), None),
        RoomKey::Ticket(id) => (None, Some(id)),
        RoomKey::SupportStaff => (None, None),
    }
}

fn ack_with_message<T: serde::Serialize>(
    request_id: Option<String>,
    result: Result<T, ApplicationError>,
) -> AckBody {
    match result.and_then(|value| {
        serde_json::to_value(&value)
            .map_err(|err| ApplicationError::infrastructure(err.to_string()))
    }) {
        Ok(json) => AckBody::ok_with_message(request_id, json),
        Err(err) => AckBody::error(request_id, err.to_string()),
    }
}

fn ack_data<T: serde::Serialize>(request_id: Option<String>, value: &T) -> AckBody {
    match serde_json::to_value(value) {
        Ok(json) => AckBody::ok_with_data(request_id, json),
        Err(err) => AckBody::error(request_id, err.to_string()),
    }
}
