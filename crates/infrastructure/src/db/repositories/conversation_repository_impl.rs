//! 会话与参与关系仓储实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, FromRow};
use uuid::Uuid;

use application::{ConversationRepository, ParticipantRepository};
use domain::{
    Conversation, ConversationId, ConversationKind, NewConversation, Participant,
    RepositoryError, Timestamp, UserId,
};

use super::map_sqlx;
use crate::db::DbPool;

/// 数据库会话模型
#[derive(Debug, Clone, FromRow)]
struct DbConversation {
    pub id: Uuid,
    pub participant_ids: Vec<Uuid>,
    pub kind: String,
    pub title: Option<String>,
    pub ad_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn kind_to_db(kind: ConversationKind) -> &'static str {
    match kind {
        ConversationKind::Direct => "direct",
        ConversationKind::AdInquiry => "ad_inquiry",
        ConversationKind::Group => "group",
    }
}

fn kind_from_db(value: &str) -> Result<ConversationKind, RepositoryError> {
    match value {
        "direct" => Ok(ConversationKind::Direct),
        "ad_inquiry" => Ok(ConversationKind::AdInquiry),
        "group" => Ok(ConversationKind::Group),
        other => Err(RepositoryError::storage(format!(
            "unknown conversation kind: {other}"
        ))),
    }
}

impl TryFrom<DbConversation> for Conversation {
    type Error = RepositoryError;

    fn try_from(row: DbConversation) -> Result<Self, Self::Error> {
        Ok(Conversation {
            id: ConversationId::from(row.id),
            participant_ids: row.participant_ids.into_iter().map(UserId::from).collect(),
            kind: kind_from_db(&row.kind)?,
            title: row.title,
            ad_id: row.ad_id,
            last_message_at: row.last_message_at,
            created_at: row.created_at,
        })
    }
}

/// 数据库参与关系模型
#[derive(Debug, Clone, FromRow)]
struct DbParticipant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub last_read_at: DateTime<Utc>,
}

impl From<DbParticipant> for Participant {
    fn from(row: DbParticipant) -> Self {
        Participant {
            conversation_id: ConversationId::from(row.conversation_id),
            user_id: UserId::from(row.user_id),
            last_read_at: row.last_read_at,
        }
    }
}

pub struct PostgresConversationRepository {
    pool: Arc<DbPool>,
}

impl PostgresConversationRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PostgresConversationRepository {
    async fn create(&self, draft: NewConversation) -> Result<Conversation, RepositoryError> {
        let participant_ids: Vec<Uuid> =
            draft.participant_ids.iter().map(|id| id.0).collect();

        let row = query_as::<_, DbConversation>(
            r#"
            INSERT INTO conversations (id, participant_ids, kind, title, ad_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, participant_ids, kind, title, ad_id, last_message_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&participant_ids)
        .bind(kind_to_db(draft.kind))
        .bind(&draft.title)
        .bind(draft.ad_id)
        .bind(draft.created_at)
        .fetch_one(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        row.try_into()
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = query_as::<_, DbConversation>(
            r#"
            SELECT id, participant_ids, kind, title, ad_id, last_message_at, created_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(Conversation::try_from).transpose()
    }

    async fn touch_last_message(
        &self,
        id: ConversationId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let result = query("UPDATE conversations SET last_message_at = $2 WHERE id = $1")
            .bind(id.0)
            .bind(at)
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
impl ParticipantRepository for PostgresConversationRepository {
    async fn find(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Option<Participant>, RepositoryError> {
        let row = query_as::<_, DbParticipant>(
            r#"
            SELECT conversation_id, user_id, last_read_at
            FROM participants
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id.0)
        .bind(user_id.0)
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(row.map(Participant::from))
    }

    async fn insert(&self, participant: Participant) -> Result<(), RepositoryError> {
        query(
            r#"
            INSERT INTO participants (conversation_id, user_id, last_read_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (conversation_id, user_id) DO NOTHING
            "#,
        )
        .bind(participant.conversation_id.0)
        .bind(participant.user_id.0)
        .bind(participant.last_read_at)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn advance_last_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        at: Timestamp,
    ) -> Result<Participant, RepositoryError> {
        // 水位只前进不回退，GREATEST 在数据库端保证
        let row = query_as::<_, DbParticipant>(
            r#"
            UPDATE participants
            SET last_read_at = GREATEST(last_read_at, $3)
            WHERE conversation_id = $1 AND user_id = $2
            RETURNING conversation_id, user_id, last_read_at
            "#,
        )
        .bind(conversation_id.0)
        .bind(user_id.0)
        .bind(at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    async fn list_conversations_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationId>, RepositoryError> {
        let rows: Vec<(Uuid,)> =
            query_as("SELECT conversation_id FROM participants WHERE user_id = $1")
                .bind(user_id.0)
                .fetch_all(&*self.pool)
                .await
                .map_err(map_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|(id,)| ConversationId::from(id))
            .collect())
    }
}
