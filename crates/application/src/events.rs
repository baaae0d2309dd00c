//! 出站事件定义
//!
//! 服务器推给客户端的所有广播帧。序列化为
//! `{"event": "<名称>", "data": {...}}`，事件名与线协议保持一致。

use serde::Serialize;
use serde_json::Value;

use domain::{
    Conversation, ConversationId, Message, MessageId, Ticket, TicketId, TicketMessage, Timestamp,
    UserId,
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "message:new")]
    MessageNew { message: Message },

    #[serde(rename = "message:edited")]
    MessageEdited { message: Message },

    #[serde(rename = "message:deleted")]
    #[serde(rename_all = "camelCase")]
    MessageDeleted {
        conversation_id: ConversationId,
        message_id: MessageId,
        deleted_at: Timestamp,
    },

    /// 已读回执：按读者维度，不按消息维度
    #[serde(rename = "message:read")]
    #[serde(rename_all = "camelCase")]
    MessageRead {
        conversation_id: ConversationId,
        user_id: UserId,
        last_read_at: Timestamp,
    },

    #[serde(rename = "conversation:updated")]
    #[serde(rename_all = "camelCase")]
    ConversationUpdated {
        conversation: Conversation,
        last_message: Message,
    },

    #[serde(rename = "conversation:created")]
    ConversationCreated { conversation: Conversation },

    #[serde(rename = "typing:start")]
    #[serde(rename_all = "camelCase")]
    TypingStart {
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ticket_id: Option<TicketId>,
        user_id: UserId,
    },

    #[serde(rename = "typing:stop")]
    #[serde(rename_all = "camelCase")]
    TypingStop {
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ticket_id: Option<TicketId>,
        user_id: UserId,
    },

    #[serde(rename = "user:online")]
    #[serde(rename_all = "camelCase")]
    UserOnline { user_id: UserId },

    #[serde(rename = "user:offline")]
    #[serde(rename_all = "camelCase")]
    UserOffline { user_id: UserId },

    #[serde(rename = "support:message-new")]
    SupportMessageNew { message: TicketMessage },

    /// 工单活动摘要；内部备注内容已被统一替换
    #[serde(rename = "support:ticket-updated")]
    #[serde(rename_all = "camelCase")]
    SupportTicketUpdated {
        ticket: Ticket,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_message: Option<TicketMessage>,
    },

    #[serde(rename = "support:ticket-status-changed")]
    SupportTicketStatusChanged { ticket: Ticket },

    /// 入站事件的请求/响应确认帧。每个变更型事件恰好返回一个。
    #[serde(rename = "ack")]
    Ack(AckBody),
}

/// 确认帧载荷：`{success:true, ...}` 或 `{error}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Conversation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AckBody {
    pub fn ok(request_id: Option<String>) -> Self {
        Self {
            request_id,
            success: true,
            message: None,
            conversation: None,
            data: None,
            error: None,
        }
    }

    pub fn ok_with_message(request_id: Option<String>, message: Value) -> Self {
        Self {
            message: Some(message),
            ..Self::ok(request_id)
        }
    }

    pub fn ok_with_conversation(request_id: Option<String>, conversation: Conversation) -> Self {
        Self {
            conversation: Some(conversation),
            ..Self::ok(request_id)
        }
    }

    pub fn ok_with_data(request_id: Option<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok(request_id)
        }
    }

    pub fn error(request_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            message: None,
            conversation: None,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn events_carry_wire_names() {
        let event = OutboundEvent::UserOnline {
            user_id: UserId::from(Uuid::new_v4()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "user:online");
        assert!(json["data"]["userId"].is_string());

        let event = OutboundEvent::TypingStart {
            conversation_id: Some(ConversationId::from(Uuid::new_v4())),
            ticket_id: None,
            user_id: UserId::from(Uuid::new_v4()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "typing:start");
        assert!(json["data"].get("ticketId").is_none());
    }

    #[test]
    fn ack_error_shape() {
        let ack = AckBody::error(Some("req-1".into()), "Message not found or unauthorized");
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Message not found or unauthorized");
        assert_eq!(json["requestId"], "req-1");
        assert!(json.get("message").is_none());
    }
}
