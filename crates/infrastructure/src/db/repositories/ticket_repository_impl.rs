//! 工单与工单消息仓储实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, FromRow};
use uuid::Uuid;

use application::{TicketMessageRepository, TicketRepository};
use domain::{
    BackfillCursor, MessageContent, MessageId, NewTicketMessage, RepositoryError, Ticket,
    TicketId, TicketMessage, TicketPriority, TicketStatus, UserId,
};

use super::map_sqlx;
use crate::db::DbPool;

/// 数据库工单模型
#[derive(Debug, Clone, FromRow)]
struct DbTicket {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub status: String,
    pub priority: String,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn status_to_db(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Open => "open",
        TicketStatus::InProgress => "in_progress",
        TicketStatus::WaitingOnUser => "waiting_on_user",
        TicketStatus::Resolved => "resolved",
        TicketStatus::Closed => "closed",
    }
}

fn status_from_db(value: &str) -> Result<TicketStatus, RepositoryError> {
    match value {
        "open" => Ok(TicketStatus::Open),
        "in_progress" => Ok(TicketStatus::InProgress),
        "waiting_on_user" => Ok(TicketStatus::WaitingOnUser),
        "resolved" => Ok(TicketStatus::Resolved),
        "closed" => Ok(TicketStatus::Closed),
        other => Err(RepositoryError::storage(format!(
            "unknown ticket status: {other}"
        ))),
    }
}

fn priority_to_db(priority: TicketPriority) -> &'static str {
    match priority {
        TicketPriority::Low => "low",
        TicketPriority::Normal => "normal",
        TicketPriority::High => "high",
        TicketPriority::Urgent => "urgent",
    }
}

fn priority_from_db(value: &str) -> Result<TicketPriority, RepositoryError> {
    match value {
        "low" => Ok(TicketPriority::Low),
        "normal" => Ok(TicketPriority::Normal),
        "high" => Ok(TicketPriority::High),
        "urgent" => Ok(TicketPriority::Urgent),
        other => Err(RepositoryError::storage(format!(
            "unknown ticket priority: {other}"
        ))),
    }
}

impl TryFrom<DbTicket> for Ticket {
    type Error = RepositoryError;

    fn try_from(row: DbTicket) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: TicketId::from(row.id),
            requester_id: UserId::from(row.requester_id),
            status: status_from_db(&row.status)?,
            priority: priority_from_db(&row.priority)?,
            assigned_to: row.assigned_to.map(UserId::from),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// 数据库工单消息模型
#[derive(Debug, Clone, FromRow)]
struct DbTicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbTicketMessage> for TicketMessage {
    type Error = RepositoryError;

    fn try_from(row: DbTicketMessage) -> Result<Self, Self::Error> {
        Ok(TicketMessage {
            id: MessageId::from(row.id),
            ticket_id: TicketId::from(row.ticket_id),
            sender_id: UserId::from(row.sender_id),
            content: MessageContent::new(row.content).map_err(RepositoryError::storage)?,
            is_internal: row.is_internal,
            created_at: row.created_at,
        })
    }
}

const TICKET_MESSAGE_COLUMNS: &str =
    "id, ticket_id, sender_id, content, is_internal, created_at";

pub struct PostgresTicketRepository {
    pool: Arc<DbPool>,
}

impl PostgresTicketRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketRepository for PostgresTicketRepository {
    async fn find_by_id(&self, id: TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let row = query_as::<_, DbTicket>(
            r#"
            SELECT id, requester_id, status, priority, assigned_to, created_at, updated_at
            FROM tickets
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn update(&self, ticket: &Ticket) -> Result<(), RepositoryError> {
        let result = query(
            r#"
            UPDATE tickets
            SET status = $2, priority = $3, assigned_to = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(ticket.id.0)
        .bind(status_to_db(ticket.status))
        .bind(priority_to_db(ticket.priority))
        .bind(ticket.assigned_to.map(|id| id.0))
        .bind(ticket.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl TicketMessageRepository for PostgresTicketRepository {
    async fn create(&self, draft: NewTicketMessage) -> Result<TicketMessage, RepositoryError> {
        let row = query_as::<_, DbTicketMessage>(&format!(
            r#"
            INSERT INTO ticket_messages (id, ticket_id, sender_id, content, is_internal, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {TICKET_MESSAGE_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(draft.ticket_id.0)
        .bind(draft.sender_id.0)
        .bind(draft.content.as_str())
        .bind(draft.is_internal)
        .bind(draft.created_at)
        .fetch_one(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        row.try_into()
    }

    async fn list_since(
        &self,
        ticket_id: TicketId,
        since: Option<BackfillCursor>,
    ) -> Result<Vec<TicketMessage>, RepositoryError> {
        let rows: Vec<DbTicketMessage> = match since {
            Some(BackfillCursor::MessageId(id)) => query_as(&format!(
                r#"
                SELECT {TICKET_MESSAGE_COLUMNS} FROM ticket_messages
                WHERE ticket_id = $1
                  AND created_at > COALESCE(
                        (SELECT created_at FROM ticket_messages WHERE id = $2),
                        '-infinity'::timestamptz)
                ORDER BY created_at ASC, id ASC
                "#,
            ))
            .bind(ticket_id.0)
            .bind(id.0)
            .fetch_all(&*self.pool)
            .await
            .map_err(map_sqlx)?,
            Some(BackfillCursor::Timestamp(ts)) => query_as(&format!(
                r#"
                SELECT {TICKET_MESSAGE_COLUMNS} FROM ticket_messages
                WHERE ticket_id = $1 AND created_at > $2
                ORDER BY created_at ASC, id ASC
                "#,
            ))
            .bind(ticket_id.0)
            .bind(ts)
            .fetch_all(&*self.pool)
            .await
            .map_err(map_sqlx)?,
            None => query_as(&format!(
                r#"
                SELECT {TICKET_MESSAGE_COLUMNS} FROM ticket_messages
                WHERE ticket_id = $1
                ORDER BY created_at ASC, id ASC
                "#,
            ))
            .bind(ticket_id.0)
            .fetch_all(&*self.pool)
            .await
            .map_err(map_sqlx)?,
        };

        rows.into_iter().map(TicketMessage::try_from).collect()
    }
}
