use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use domain::{
    ConnectionId, DomainError, Identity, Role, RoomKey, Ticket, TicketId, TicketPriority,
    TicketStatus, UserId, INTERNAL_NOTE_PREVIEW,
};

use crate::clock::testing::SteppingClock;
use crate::error::ApplicationError;
use crate::events::OutboundEvent;
use crate::repository::memory::MemoryTicketStore;
use crate::repository::TicketRepository;
use crate::rooms::RoomRegistry;

use super::support_service::{
    SendTicketMessageRequest, SupportService, SupportServiceDependencies, UpdateTicketRequest,
};

struct Fixture {
    store: Arc<MemoryTicketStore>,
    rooms: Arc<RoomRegistry>,
    service: SupportService,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryTicketStore::new());
    let rooms = Arc::new(RoomRegistry::new());
    let service = SupportService::new(SupportServiceDependencies {
        tickets: store.clone(),
        ticket_messages: store.clone(),
        clock: Arc::new(SteppingClock::new()),
        rooms: rooms.clone(),
    });
    Fixture {
        store,
        rooms,
        service,
    }
}

fn user() -> Identity {
    Identity::new(UserId::from(Uuid::new_v4()), Role::User)
}

fn staff() -> Identity {
    Identity::new(UserId::from(Uuid::new_v4()), Role::StaffTier1)
}

fn sample_ticket(requester_id: UserId) -> Ticket {
    let now = Utc::now();
    Ticket {
        id: TicketId::from(Uuid::new_v4()),
        requester_id,
        status: TicketStatus::Open,
        priority: TicketPriority::Normal,
        assigned_to: None,
        created_at: now,
        updated_at: now,
    }
}

fn attach(
    rooms: &RoomRegistry,
    identity: Identity,
) -> (ConnectionId, mpsc::UnboundedReceiver<OutboundEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connection_id = ConnectionId::generate();
    rooms.register(connection_id, identity, tx);
    (connection_id, rx)
}

fn message_request(ticket_id: TicketId, content: &str, is_internal: bool) -> SendTicketMessageRequest {
    SendTicketMessageRequest {
        ticket_id: ticket_id.into(),
        content: content.to_string(),
        is_internal: Some(is_internal),
    }
}

#[tokio::test]
async fn ticket_room_admits_requester_and_staff_only() {
    let fx = fixture();
    let requester = user();
    let outsider = user();
    let agent = staff();
    let ticket = sample_ticket(requester.user_id);
    fx.store.seed_ticket(ticket.clone()).await;

    let (requester_conn, _) = attach(&fx.rooms, requester);
    let (outsider_conn, _) = attach(&fx.rooms, outsider);
    let (agent_conn, _) = attach(&fx.rooms, agent);

    fx.service
        .join_ticket(requester, requester_conn, ticket.id.into())
        .await
        .unwrap();
    fx.service
        .join_ticket(agent, agent_conn, ticket.id.into())
        .await
        .unwrap();

    let err = fx
        .service
        .join_ticket(outsider, outsider_conn, ticket.id.into())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::TicketAccessDenied)
    ));
    assert!(!fx
        .rooms
        .is_joined(RoomKey::Ticket(ticket.id), outsider_conn));
}

#[tokio::test]
async fn staff_room_rejects_regular_users() {
    let fx = fixture();
    let requester = user();
    let agent = staff();
    let (user_conn, _) = attach(&fx.rooms, requester);
    let (agent_conn, _) = attach(&fx.rooms, agent);

    let err = fx
        .service
        .join_staff_room(requester, user_conn)
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::StaffOnly)
    ));

    fx.service.join_staff_room(agent, agent_conn).unwrap();
    assert!(fx.rooms.is_joined(RoomKey::SupportStaff, agent_conn));
}

#[tokio::test]
async fn sending_requires_room_membership() {
    let fx = fixture();
    let requester = user();
    let ticket = sample_ticket(requester.user_id);
    fx.store.seed_ticket(ticket.clone()).await;
    let (conn, _) = attach(&fx.rooms, requester);

    let err = fx
        .service
        .send_message(requester, conn, message_request(ticket.id, "hello", false))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::NotInTicketRoom)
    ));
}

#[tokio::test]
async fn internal_note_never_reaches_requester_connections() {
    let fx = fixture();
    let requester = user();
    let agent = staff();
    let observer = staff();
    let ticket = sample_ticket(requester.user_id);
    fx.store.seed_ticket(ticket.clone()).await;

    let (requester_conn, mut requester_rx) = attach(&fx.rooms, requester);
    let (agent_conn, mut agent_rx) = attach(&fx.rooms, agent);
    let (observer_conn, mut observer_rx) = attach(&fx.rooms, observer);
    fx.service
        .join_ticket(requester, requester_conn, ticket.id.into())
        .await
        .unwrap();
    fx.service
        .join_ticket(agent, agent_conn, ticket.id.into())
        .await
        .unwrap();
    fx.service.join_staff_room(observer, observer_conn).unwrap();

    let stored = fx
        .service
        .send_message(
            agent,
            agent_conn,
            message_request(ticket.id, "escalating, user sounds like a reseller", true),
        )
        .await
        .unwrap();
    assert!(stored.is_internal);

    // 客服连接收到原文
    match agent_rx.try_recv().unwrap() {
        OutboundEvent::SupportMessageNew { message } => {
            assert_eq!(message.id, stored.id);
            assert_eq!(
                message.content.as_str(),
                "escalating, user sounds like a reseller"
            );
        }
        other => panic!("expected support:message-new, got {other:?}"),
    }

    // 摘要频道内容被统一脱敏
    match observer_rx.try_recv().unwrap() {
        OutboundEvent::SupportTicketUpdated { last_message, .. } => {
            let digest = last_message.expect("digest carries last message");
            assert_eq!(digest.content.as_str(), INTERNAL_NOTE_PREVIEW);
        }
        other => panic!("expected support:ticket-updated, got {other:?}"),
    }

    // 请求人连接：没有 support:message-new；排水剩余帧确认内容不外泄
    while let Ok(event) = requester_rx.try_recv() {
        if let OutboundEvent::SupportMessageNew { .. } = event {
            panic!("internal note delivered to requester connection");
        }
    }
}

#[tokio::test]
async fn requester_cannot_smuggle_internal_flag() {
    let fx = fixture();
    let requester = user();
    let ticket = sample_ticket(requester.user_id);
    fx.store.seed_ticket(ticket.clone()).await;

    let (conn, _) = attach(&fx.rooms, requester);
    fx.service
        .join_ticket(requester, conn, ticket.id.into())
        .await
        .unwrap();

    let stored = fx
        .service
        .send_message(
            requester,
            conn,
            message_request(ticket.id, "please check my order", true),
        )
        .await
        .unwrap();
    assert!(!stored.is_internal);
}

#[tokio::test]
async fn replies_drive_status_transitions() {
    let fx = fixture();
    let requester = user();
    let agent = staff();
    let ticket = sample_ticket(requester.user_id);
    fx.store.seed_ticket(ticket.clone()).await;

    let (requester_conn, mut requester_rx) = attach(&fx.rooms, requester);
    let (agent_conn, _) = attach(&fx.rooms, agent);
    fx.service
        .join_ticket(requester, requester_conn, ticket.id.into())
        .await
        .unwrap();
    fx.service
        .join_ticket(agent, agent_conn, ticket.id.into())
        .await
        .unwrap();

    // 客服回复：open → waiting_on_user
    fx.service
        .send_message(
            agent,
            agent_conn,
            message_request(ticket.id, "We are looking into it", false),
        )
        .await
        .unwrap();
    let updated = fx
        .store
        .find_by_id(ticket.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, TicketStatus::WaitingOnUser);

    assert!(matches!(
        requester_rx.try_recv().unwrap(),
        OutboundEvent::SupportMessageNew { .. }
    ));
    match requester_rx.try_recv().unwrap() {
        OutboundEvent::SupportTicketStatusChanged { ticket } => {
            assert_eq!(ticket.status, TicketStatus::WaitingOnUser);
        }
        other => panic!("expected support:ticket-status-changed, got {other:?}"),
    }

    // 请求人回复：waiting_on_user → in_progress
    fx.service
        .send_message(
            requester,
            requester_conn,
            message_request(ticket.id, "any news?", false),
        )
        .await
        .unwrap();
    let updated = fx
        .store
        .find_by_id(ticket.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, TicketStatus::InProgress);
}

#[tokio::test]
async fn staff_reply_leaves_resolved_ticket_alone() {
    let fx = fixture();
    let requester = user();
    let agent = staff();
    let mut ticket = sample_ticket(requester.user_id);
    ticket.status = TicketStatus::Resolved;
    fx.store.seed_ticket(ticket.clone()).await;

    let (agent_conn, _) = attach(&fx.rooms, agent);
    fx.service
        .join_ticket(agent, agent_conn, ticket.id.into())
        .await
        .unwrap();
    fx.service
        .send_message(
            agent,
            agent_conn,
            message_request(ticket.id, "closing note", false),
        )
        .await
        .unwrap();

    let unchanged = fx.store.find_by_id(ticket.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, TicketStatus::Resolved);
}

#[tokio::test]
async fn ticket_updates_are_staff_only_and_broadcast() {
    let fx = fixture();
    let requester = user();
    let agent = staff();
    let ticket = sample_ticket(requester.user_id);
    fx.store.seed_ticket(ticket.clone()).await;

    let err = fx
        .service
        .update_ticket(
            requester,
            UpdateTicketRequest {
                ticket_id: ticket.id.into(),
                status: Some(TicketStatus::Closed),
                priority: None,
                assigned_to: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::StaffOnly)
    ));

    let (requester_conn, mut requester_rx) = attach(&fx.rooms, requester);
    fx.service
        .join_ticket(requester, requester_conn, ticket.id.into())
        .await
        .unwrap();

    let updated = fx
        .service
        .update_ticket(
            agent,
            UpdateTicketRequest {
                ticket_id: ticket.id.into(),
                status: Some(TicketStatus::InProgress),
                priority: Some(TicketPriority::High),
                assigned_to: Some(agent.user_id.into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, TicketStatus::InProgress);
    assert_eq!(updated.priority, TicketPriority::High);
    assert_eq!(updated.assigned_to, Some(agent.user_id));

    match requester_rx.try_recv().unwrap() {
        OutboundEvent::SupportTicketStatusChanged { ticket } => {
            assert_eq!(ticket.status, TicketStatus::InProgress);
        }
        other => panic!("expected support:ticket-status-changed, got {other:?}"),
    }
}

#[tokio::test]
async fn backfill_hides_internal_messages_from_requester() {
    let fx = fixture();
    let requester = user();
    let agent = staff();
    let ticket = sample_ticket(requester.user_id);
    fx.store.seed_ticket(ticket.clone()).await;

    let (agent_conn, _) = attach(&fx.rooms, agent);
    fx.service
        .join_ticket(agent, agent_conn, ticket.id.into())
        .await
        .unwrap();
    let public = fx
        .service
        .send_message(
            agent,
            agent_conn,
            message_request(ticket.id, "public reply", false),
        )
        .await
        .unwrap();
    let internal = fx
        .service
        .send_message(
            agent,
            agent_conn,
            message_request(ticket.id, "internal context", true),
        )
        .await
        .unwrap();

    let requester_view = fx
        .service
        .backfill(requester, ticket.id.into(), None)
        .await
        .unwrap();
    assert_eq!(
        requester_view.iter().map(|m| m.id).collect::<Vec<_>>(),
        vec![public.id]
    );

    let staff_view = fx
        .service
        .backfill(agent, ticket.id.into(), None)
        .await
        .unwrap();
    assert_eq!(
        staff_view.iter().map(|m| m.id).collect::<Vec<_>>(),
        vec![public.id, internal.id]
    );

    // 局外人连补拉入口都进不来
    let outsider = user();
    let err = fx
        .service
        .backfill(outsider, ticket.id.into(), None)
        .await
        .unwrap_err();
    assert!(err.is_authorization());
}
