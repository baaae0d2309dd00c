//! 会话消息仓储实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query_as, FromRow};
use uuid::Uuid;

use application::MessageRepository;
use domain::{
    BackfillCursor, ConversationId, Message, MessageContent, MessageId, MessageType, NewMessage,
    RepositoryError, UserId,
};

use super::map_sqlx;
use crate::db::DbPool;

/// 数据库消息模型
#[derive(Debug, Clone, FromRow)]
struct DbMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

fn message_type_to_db(message_type: MessageType) -> &'static str {
    match message_type {
        MessageType::Text => "text",
        MessageType::Image => "image",
        MessageType::File => "file",
    }
}

fn message_type_from_db(value: &str) -> Result<MessageType, RepositoryError> {
    match value {
        "text" => Ok(MessageType::Text),
        "image" => Ok(MessageType::Image),
        "file" => Ok(MessageType::File),
        other => Err(RepositoryError::storage(format!(
            "unknown message type: {other}"
        ))),
    }
}

impl TryFrom<DbMessage> for Message {
    type Error = RepositoryError;

    fn try_from(row: DbMessage) -> Result<Self, Self::Error> {
        Ok(Message {
            id: MessageId::from(row.id),
            conversation_id: ConversationId::from(row.conversation_id),
            sender_id: UserId::from(row.sender_id),
            content: MessageContent::new(row.content).map_err(RepositoryError::storage)?,
            message_type: message_type_from_db(&row.message_type)?,
            attachment_url: row.attachment_url,
            created_at: row.created_at,
            edited_at: row.edited_at,
            deleted_at: row.deleted_at,
        })
    }
}

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, content, message_type, attachment_url, created_at, edited_at, deleted_at";

pub struct PostgresMessageRepository {
    pool: Arc<DbPool>,
}

impl PostgresMessageRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn create(&self, draft: NewMessage) -> Result<Message, RepositoryError> {
        let row = query_as::<_, DbMessage>(&format!(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, content, message_type, attachment_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {MESSAGE_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(draft.conversation_id.0)
        .bind(draft.sender_id.0)
        .bind(draft.content.as_str())
        .bind(message_type_to_db(draft.message_type))
        .bind(&draft.attachment_url)
        .bind(draft.created_at)
        .fetch_one(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        row.try_into()
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let row = query_as::<_, DbMessage>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1",
        ))
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(Message::try_from).transpose()
    }

    async fn update(&self, message: &Message) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET content = $2, edited_at = $3, deleted_at = $4
            WHERE id = $1
            "#,
        )
        .bind(message.id.0)
        .bind(message.content.as_str())
        .bind(message.edited_at)
        .bind(message.deleted_at)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_since(
        &self,
        conversation_id: ConversationId,
        since: Option<BackfillCursor>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows: Vec<DbMessage> = match since {
            // 游标消息不存在时回退为全量（与内存实现一致）
            Some(BackfillCursor::MessageId(id)) => query_as(&format!(
                r#"
                SELECT {MESSAGE_COLUMNS} FROM messages
                WHERE conversation_id = $1
                  AND created_at > COALESCE(
                        (SELECT created_at FROM messages WHERE id = $2),
                        '-infinity'::timestamptz)
                ORDER BY created_at ASC, id ASC
                "#,
            ))
            .bind(conversation_id.0)
            .bind(id.0)
            .fetch_all(&*self.pool)
            .await
            .map_err(map_sqlx)?,
            Some(BackfillCursor::Timestamp(ts)) => query_as(&format!(
                r#"
                SELECT {MESSAGE_COLUMNS} FROM messages
                WHERE conversation_id = $1 AND created_at > $2
                ORDER BY created_at ASC, id ASC
                "#,
            ))
            .bind(conversation_id.0)
            .bind(ts)
            .fetch_all(&*self.pool)
            .await
            .map_err(map_sqlx)?,
            None => query_as(&format!(
                r#"
                SELECT {MESSAGE_COLUMNS} FROM messages
                WHERE conversation_id = $1
                ORDER BY created_at ASC, id ASC
                "#,
            ))
            .bind(conversation_id.0)
            .fetch_all(&*self.pool)
            .await
            .map_err(map_sqlx)?,
        };

        rows.into_iter().map(Message::try_from).collect()
    }
}
