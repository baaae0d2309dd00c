use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ConversationId, MessageContent, MessageId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Text
    }
}

/// 会话消息。状态机：created → [edited]* → [deleted]。
/// 删除是软删除，`deleted_at` 打标记后内容保留在存储里。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: MessageContent,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn edit(&mut self, new_content: MessageContent, at: Timestamp) -> Result<(), DomainError> {
        if self.is_deleted() {
            return Err(DomainError::OperationNotAllowed);
        }
        self.content = new_content;
        self.edited_at = Some(at);
        Ok(())
    }

    pub fn mark_deleted(&mut self, at: Timestamp) -> Result<(), DomainError> {
        if self.is_deleted() {
            return Err(DomainError::OperationNotAllowed);
        }
        self.deleted_at = Some(at);
        Ok(())
    }
}

/// 待持久化的消息草稿。id 由存储协作方分配。
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub message_type: MessageType,
    pub attachment_url: Option<String>,
    pub created_at: Timestamp,
}

/// 补拉游标：客户端可以传最后已知消息 id，也可以传时间戳。
#[derive(Debug, Clone, Copy)]
pub enum BackfillCursor {
    MessageId(MessageId),
    Timestamp(Timestamp),
}
