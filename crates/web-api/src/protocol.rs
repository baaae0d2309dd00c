//! 入站线协议
//!
//! 客户端发来的帧形如 `{"type": "<事件名>", "requestId": "...", "data": {...}}`。
//! `requestId` 可选，带了就会原样回到对应的 ack 帧里。

use serde::Deserialize;
use uuid::Uuid;

use domain::{ConversationKind, MessageType, TicketPriority, TicketStatus};

/// 入站帧：事件体外加可选的请求关联 id
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub event: ClientEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "message:send")]
    #[serde(rename_all = "camelCase")]
    MessageSend {
        conversation_id: Uuid,
        content: String,
        message_type: Option<MessageType>,
        attachment_url: Option<String>,
    },

    #[serde(rename = "message:read")]
    #[serde(rename_all = "camelCase")]
    MessageRead { conversation_id: Uuid },

    #[serde(rename = "message:edit")]
    #[serde(rename_all = "camelCase")]
    MessageEdit { message_id: Uuid, new_content: String },

    #[serde(rename = "message:delete")]
    #[serde(rename_all = "camelCase")]
    MessageDelete { message_id: Uuid },

    #[serde(rename = "typing:start")]
    #[serde(rename_all = "camelCase")]
    TypingStart { conversation_id: Uuid },

    #[serde(rename = "typing:stop")]
    #[serde(rename_all = "camelCase")]
    TypingStop { conversation_id: Uuid },

    #[serde(rename = "conversation:create")]
    #[serde(rename_all = "camelCase")]
    ConversationCreate {
        participant_ids: Vec<Uuid>,
        #[serde(rename = "type")]
        kind: Option<ConversationKind>,
        title: Option<String>,
        ad_id: Option<Uuid>,
    },

    #[serde(rename = "support:join-ticket")]
    #[serde(rename_all = "camelCase")]
    SupportJoinTicket { ticket_id: Uuid },

    #[serde(rename = "support:leave-ticket")]
    #[serde(rename_all = "camelCase")]
    SupportLeaveTicket { ticket_id: Uuid },

    #[serde(rename = "support:join-staff-room")]
    SupportJoinStaffRoom,

    #[serde(rename = "support:send-message")]
    #[serde(rename_all = "camelCase")]
    SupportSendMessage {
        ticket_id: Uuid,
        content: String,
        is_internal: Option<bool>,
    },

    #[serde(rename = "support:update-ticket")]
    #[serde(rename_all = "camelCase")]
    SupportUpdateTicket {
        ticket_id: Uuid,
        status: Option<TicketStatus>,
        priority: Option<TicketPriority>,
        assigned_to: Option<Uuid>,
    },

    #[serde(rename = "support:typing-start")]
    #[serde(rename_all = "camelCase")]
    SupportTypingStart { ticket_id: Uuid },

    #[serde(rename = "support:typing-stop")]
    #[serde(rename_all = "camelCase")]
    SupportTypingStop { ticket_id: Uuid },
}
