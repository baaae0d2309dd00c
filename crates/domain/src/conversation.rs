use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{ConversationId, Timestamp, UserId};

/// 会话类别。买卖双方就某条广告发起的询价是最常见的一种。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Direct,
    AdInquiry,
    Group,
}

impl Default for ConversationKind {
    fn default() -> Self {
        ConversationKind::Direct
    }
}

/// 会话实体，归存储协作方所有，核心只通过仓储读写。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub participant_ids: Vec<UserId>,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Conversation {
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participant_ids.contains(&user_id)
    }
}

/// 待持久化的会话草稿。id 由存储协作方分配。
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub participant_ids: Vec<UserId>,
    pub kind: ConversationKind,
    pub title: Option<String>,
    pub ad_id: Option<Uuid>,
    pub created_at: Timestamp,
}

/// 参与关系：每 (conversation, user) 一行。
/// 存在这一行才允许在该会话上读写消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub last_read_at: Timestamp,
}

impl Participant {
    pub fn new(conversation_id: ConversationId, user_id: UserId, at: Timestamp) -> Self {
        Self {
            conversation_id,
            user_id,
            last_read_at: at,
        }
    }

    /// 推进已读水位。只前进，不回退。
    pub fn advance_read(&mut self, at: Timestamp) {
        if at > self.last_read_at {
            self.last_read_at = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn last_read_at_never_regresses() {
        let now = Utc::now();
        let mut participant = Participant::new(
            ConversationId::from(Uuid::new_v4()),
            UserId::from(Uuid::new_v4()),
            now,
        );

        participant.advance_read(now - Duration::seconds(30));
        assert_eq!(participant.last_read_at, now);

        let later = now + Duration::seconds(5);
        participant.advance_read(later);
        assert_eq!(participant.last_read_at, later);
    }
}
