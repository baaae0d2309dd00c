//! 客服工单频道
//!
//! 工单房间按工单维度隔离：请求人只能进自己的工单，客服可进任意工单。
//! 内部消息的投递过滤发生在逐收件人广播处；摘要频道（support:staff）
//! 的内部消息内容统一替换为占位文本，对所有收件人一致。

use std::sync::Arc;

use uuid::Uuid;

use domain::{
    BackfillCursor, ConnectionId, DomainError, Identity, MessageContent, NewTicketMessage,
    RoomKey, Ticket, TicketId, TicketMessage, TicketPriority, TicketStatus, TicketUpdate, UserId,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    events::OutboundEvent,
    repository::{TicketMessageRepository, TicketRepository},
    rooms::RoomRegistry,
};

#[derive(Debug, Clone)]
pub struct SendTicketMessageRequest {
    pub ticket_id: Uuid,
    pub content: String,
    pub is_internal: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct UpdateTicketRequest {
    pub ticket_id: Uuid,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<Uuid>,
}

pub struct SupportServiceDependencies {
    pub tickets: Arc<dyn TicketRepository>,
    pub ticket_messages: Arc<dyn TicketMessageRepository>,
    pub clock: Arc<dyn Clock>,
    pub rooms: Arc<RoomRegistry>,
}

pub struct SupportService {
    deps: SupportServiceDependencies,
}

impl SupportService {
    pub fn new(deps: SupportServiceDependencies) -> Self {
        Self { deps }
    }

    async fn require_ticket_access(
        &self,
        identity: Identity,
        ticket_id: TicketId,
    ) -> Result<Ticket, ApplicationError> {
        let ticket = self
            .deps
            .tickets
            .find_by_id(ticket_id)
            .await?
            .ok_or(DomainError::TicketNotFound)?;
        if !identity.is_staff() && ticket.requester_id != identity.user_id {
            return Err(DomainError::TicketAccessDenied.into());
        }
        Ok(ticket)
    }

    /// 显式加入工单房间。工单房间不在连接快照里，必须主动加入。
    pub async fn join_ticket(
        &self,
        identity: Identity,
        connection_id: ConnectionId,
        ticket_id: Uuid,
    ) -> Result<Ticket, ApplicationError> {
        let ticket_id = TicketId::from(ticket_id);
        let ticket = self.require_ticket_access(identity, ticket_id).await?;
        self.deps
            .rooms
            .join(RoomKey::Ticket(ticket_id), connection_id);
        tracing::debug!(ticket_id = %ticket_id, user_id = %identity.user_id, "joined ticket room");
        Ok(ticket)
    }

    pub fn leave_ticket(&self, connection_id: ConnectionId, ticket_id: Uuid) {
        self.deps
            .rooms
            .leave(RoomKey::Ticket(TicketId::from(ticket_id)), connection_id);
    }

    /// 摘要频道只对客服开放
    pub fn join_staff_room(
        &self,
        identity: Identity,
        connection_id: ConnectionId,
    ) -> Result<(), ApplicationError> {
        if !identity.is_staff() {
            return Err(DomainError::StaffOnly.into());
        }
        self.deps.rooms.join(RoomKey::SupportStaff, connection_id);
        Ok(())
    }

    pub async fn send_message(
        &self,
        identity: Identity,
        connection_id: ConnectionId,
        request: SendTicketMessageRequest,
    ) -> Result<TicketMessage, ApplicationError> {
        let ticket_id = TicketId::from(request.ticket_id);
        let room = RoomKey::Ticket(ticket_id);
        // 发消息前必须已在房间里，房间成员资格本身就是访问检查的结果
        if !self.deps.rooms.is_joined(room, connection_id) {
            return Err(DomainError::NotInTicketRoom.into());
        }

        let mut ticket = self
            .deps
            .tickets
            .find_by_id(ticket_id)
            .await?
            .ok_or(DomainError::TicketNotFound)?;

        let content = MessageContent::new(request.content)?;
        let is_internal = NewTicketMessage::resolve_visibility(
            request.is_internal.unwrap_or(false),
            identity.is_staff(),
        );
        let now = self.deps.clock.now();

        let stored = self
            .deps
            .ticket_messages
            .create(NewTicketMessage {
                ticket_id,
                sender_id: identity.user_id,
                content,
                is_internal,
                created_at: now,
            })
            .await?;

        let status_changed = ticket.register_reply(identity.is_staff(), now);
        if status_changed {
            self.deps.tickets.update(&ticket).await?;
        }

        // 工单房间：内部消息只投给客服连接
        self.deps.rooms.broadcast_filtered(room, None, |recipient| {
            if stored.is_internal && !recipient.is_staff() {
                return None;
            }
            Some(OutboundEvent::SupportMessageNew {
                message: stored.clone(),
            })
        });

        // 摘要频道：内容统一脱敏，不区分收件人角色
        self.deps.rooms.broadcast(
            RoomKey::SupportStaff,
            &OutboundEvent::SupportTicketUpdated {
                ticket: ticket.clone(),
                last_message: Some(stored.redacted_for_digest()),
            },
            None,
        );

        if status_changed {
            let event = OutboundEvent::SupportTicketStatusChanged {
                ticket: ticket.clone(),
            };
            self.deps.rooms.broadcast(room, &event, None);
            self.deps.rooms.broadcast(RoomKey::SupportStaff, &event, None);
        }

        tracing::info!(
            ticket_id = %ticket_id,
            message_id = %stored.id,
            is_internal = stored.is_internal,
            "ticket message sent"
        );
        Ok(stored)
    }

    /// 状态 / 优先级 / 受理人变更，仅客服
    pub async fn update_ticket(
        &self,
        identity: Identity,
        request: UpdateTicketRequest,
    ) -> Result<Ticket, ApplicationError> {
        if !identity.is_staff() {
            return Err(DomainError::StaffOnly.into());
        }

        let ticket_id = TicketId::from(request.ticket_id);
        let mut ticket = self
            .deps
            .tickets
            .find_by_id(ticket_id)
            .await?
            .ok_or(DomainError::TicketNotFound)?;

        let now = self.deps.clock.now();
        let status_changed = ticket.apply_update(
            TicketUpdate {
                status: request.status,
                priority: request.priority,
                assigned_to: request.assigned_to.map(UserId::from),
            },
            now,
        );
        self.deps.tickets.update(&ticket).await?;

        let room = RoomKey::Ticket(ticket_id);
        if status_changed {
            let event = OutboundEvent::SupportTicketStatusChanged {
                ticket: ticket.clone(),
            };
            self.deps.rooms.broadcast(room, &event, None);
            self.deps.rooms.broadcast(RoomKey::SupportStaff, &event, None);
        } else {
            let event = OutboundEvent::SupportTicketUpdated {
                ticket: ticket.clone(),
                last_message: None,
            };
            self.deps.rooms.broadcast(room, &event, None);
            self.deps.rooms.broadcast(RoomKey::SupportStaff, &event, None);
        }

        tracing::info!(ticket_id = %ticket_id, status = ?ticket.status, "ticket updated");
        Ok(ticket)
    }

    /// 工单补拉。非客服请求人永远看不到内部消息，
    /// 过滤发生在服务端返回之前。
    pub async fn backfill(
        &self,
        identity: Identity,
        ticket_id: Uuid,
        since: Option<BackfillCursor>,
    ) -> Result<Vec<TicketMessage>, ApplicationError> {
        let ticket_id = TicketId::from(ticket_id);
        self.require_ticket_access(identity, ticket_id).await?;

        let mut messages = self
            .deps
            .ticket_messages
            .list_since(ticket_id, since)
            .await?;
        if !identity.is_staff() {
            messages.retain(|m| !m.is_internal);
        }
        Ok(messages)
    }
}
