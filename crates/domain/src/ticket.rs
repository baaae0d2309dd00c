use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{MessageContent, MessageId, TicketId, Timestamp, UserId};

/// 内部备注在摘要频道里统一显示的占位内容。
/// 摘要频道的访问控制比工单房间宽松，连内容长度都不外泄。
pub const INTERNAL_NOTE_PREVIEW: &str = "[Internal note]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    WaitingOnUser,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// 终态工单不再被回复驱动流转
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Normal,
    High,
    Urgent,
}

/// 客服工单。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub requester_id: UserId,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Ticket {
    /// 回复驱动的状态流转：客服回复 → waiting_on_user（终态除外）；
    /// 请求人回复 → in_progress。返回状态是否发生变化。
    pub fn register_reply(&mut self, from_staff: bool, at: Timestamp) -> bool {
        let next = if from_staff {
            if self.status.is_terminal() {
                return false;
            }
            TicketStatus::WaitingOnUser
        } else {
            TicketStatus::InProgress
        };

        if next == self.status {
            return false;
        }
        self.status = next;
        self.updated_at = at;
        true
    }

    /// 只有客服能改这些字段；调用方负责授权检查。
    pub fn apply_update(&mut self, update: TicketUpdate, at: Timestamp) -> bool {
        let mut status_changed = false;
        if let Some(status) = update.status {
            status_changed = status != self.status;
            self.status = status;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(assigned_to) = update.assigned_to {
            self.assigned_to = Some(assigned_to);
        }
        self.updated_at = at;
        status_changed
    }
}

/// 工单字段变更集
#[derive(Debug, Clone, Default)]
pub struct TicketUpdate {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<UserId>,
}

/// 工单消息。`is_internal` 为真的消息只对客服可见，
/// 任何发往非客服连接的载荷都不得包含其内容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketMessage {
    pub id: MessageId,
    pub ticket_id: TicketId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub is_internal: bool,
    pub created_at: Timestamp,
}

impl TicketMessage {
    /// 摘要频道用的版本：内部备注内容统一替换为占位文本，
    /// 对客服和非客服一视同仁。
    pub fn redacted_for_digest(&self) -> TicketMessage {
        if !self.is_internal {
            return self.clone();
        }
        let mut redacted = self.clone();
        redacted.content = MessageContent::new(INTERNAL_NOTE_PREVIEW)
            .unwrap_or_else(|_| self.content.clone());
        redacted
    }
}

/// 待持久化的工单消息草稿。id 由存储协作方分配。
#[derive(Debug, Clone)]
pub struct NewTicketMessage {
    pub ticket_id: TicketId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub is_internal: bool,
    pub created_at: Timestamp,
}

impl NewTicketMessage {
    /// 发送规则：只有客服能把消息标为内部，请求人提交的一律强制公开。
    pub fn resolve_visibility(requested_internal: bool, sender_is_staff: bool) -> bool {
        requested_internal && sender_is_staff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_ticket(status: TicketStatus) -> Ticket {
        Ticket {
            id: TicketId::from(Uuid::new_v4()),
            requester_id: UserId::from(Uuid::new_v4()),
            status,
            priority: TicketPriority::Normal,
            assigned_to: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn staff_reply_moves_to_waiting_on_user() {
        let mut ticket = sample_ticket(TicketStatus::Open);
        assert!(ticket.register_reply(true, Utc::now()));
        assert_eq!(ticket.status, TicketStatus::WaitingOnUser);
    }

    #[test]
    fn staff_reply_leaves_terminal_status_alone() {
        let mut ticket = sample_ticket(TicketStatus::Resolved);
        assert!(!ticket.register_reply(true, Utc::now()));
        assert_eq!(ticket.status, TicketStatus::Resolved);

        let mut closed = sample_ticket(TicketStatus::Closed);
        assert!(!closed.register_reply(true, Utc::now()));
        assert_eq!(closed.status, TicketStatus::Closed);
    }

    #[test]
    fn requester_reply_moves_to_in_progress() {
        let mut ticket = sample_ticket(TicketStatus::WaitingOnUser);
        assert!(ticket.register_reply(false, Utc::now()));
        assert_eq!(ticket.status, TicketStatus::InProgress);
    }

    #[test]
    fn requester_cannot_mark_internal() {
        assert!(!NewTicketMessage::resolve_visibility(true, false));
        assert!(NewTicketMessage::resolve_visibility(true, true));
        assert!(!NewTicketMessage::resolve_visibility(false, true));
    }

    #[test]
    fn digest_redaction_is_uniform() {
        let message = TicketMessage {
            id: MessageId::from(Uuid::new_v4()),
            ticket_id: TicketId::from(Uuid::new_v4()),
            sender_id: UserId::from(Uuid::new_v4()),
            content: MessageContent::new("secret internal context").unwrap(),
            is_internal: true,
            created_at: Utc::now(),
        };

        let redacted = message.redacted_for_digest();
        assert_eq!(redacted.content.as_str(), INTERNAL_NOTE_PREVIEW);

        let public = TicketMessage {
            is_internal: false,
            ..message.clone()
        };
        assert_eq!(
            public.redacted_for_digest().content.as_str(),
            "secret internal context"
        );
    }
}
