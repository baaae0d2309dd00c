//! 存储协作方接口
//!
//! 核心对广告 / 用户 / 工单存储只有读写依赖，这里定义最小的仓储 trait。
//! 消息 id 由存储层分配，保证唯一并可用作客户端去重键。

use async_trait::async_trait;
use domain::{
    BackfillCursor, Conversation, ConversationId, Message, MessageId, NewConversation, NewMessage,
    NewTicketMessage, Participant, RepositoryError, Ticket, TicketId, TicketMessage, Timestamp,
    UserId,
};

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create(&self, conversation: NewConversation)
        -> Result<Conversation, RepositoryError>;
    async fn find_by_id(&self, id: ConversationId)
        -> Result<Option<Conversation>, RepositoryError>;
    /// 推进会话的 last_message_at
    async fn touch_last_message(
        &self,
        id: ConversationId,
        at: Timestamp,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    async fn find(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Option<Participant>, RepositoryError>;
    async fn insert(&self, participant: Participant) -> Result<(), RepositoryError>;
    /// 推进已读水位，只前进不回退；参与关系不存在时返回 NotFound
    async fn advance_last_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        at: Timestamp,
    ) -> Result<Participant, RepositoryError>;
    /// 连接建立时用来计算快照房间集合
    async fn list_conversations_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationId>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化消息并分配 id
    async fn create(&self, draft: NewMessage) -> Result<Message, RepositoryError>;
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;
    async fn update(&self, message: &Message) -> Result<(), RepositoryError>;
    /// 补拉：返回权威有序消息列表（created_at 升序，id 决胜）
    async fn list_since(
        &self,
        conversation_id: ConversationId,
        since: Option<BackfillCursor>,
    ) -> Result<Vec<Message>, RepositoryError>;
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn find_by_id(&self, id: TicketId) -> Result<Option<Ticket>, RepositoryError>;
    async fn update(&self, ticket: &Ticket) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TicketMessageRepository: Send + Sync {
    async fn create(&self, draft: NewTicketMessage) -> Result<TicketMessage, RepositoryError>;
    async fn list_since(
        &self,
        ticket_id: TicketId,
        since: Option<BackfillCursor>,
    ) -> Result<Vec<TicketMessage>, RepositoryError>;
}

/// 内存实现（用于测试）
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;
    use uuid::Uuid;

    /// 会话 / 参与关系 / 消息的内存存储
    #[derive(Default)]
    pub struct MemoryConversationStore {
        conversations: RwLock<HashMap<ConversationId, Conversation>>,
        participants: RwLock<HashMap<(ConversationId, UserId), Participant>>,
        messages: RwLock<HashMap<MessageId, Message>>,
    }

    impl MemoryConversationStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// 测试辅助：直接插入一条参与关系
        pub async fn seed_participant(&self, participant: Participant) {
            let mut participants = self.participants.write().await;
            participants.insert(
                (participant.conversation_id, participant.user_id),
                participant,
            );
        }

        /// 测试辅助：直接插入一个会话
        pub async fn seed_conversation(&self, conversation: Conversation) {
            let mut conversations = self.conversations.write().await;
            conversations.insert(conversation.id, conversation);
        }
    }

    #[async_trait]
    impl ConversationRepository for MemoryConversationStore {
        async fn create(
            &self,
            draft: NewConversation,
        ) -> Result<Conversation, RepositoryError> {
            let conversation = Conversation {
                id: ConversationId::from(Uuid::new_v4()),
                participant_ids: draft.participant_ids,
                kind: draft.kind,
                title: draft.title,
                ad_id: draft.ad_id,
                last_message_at: None,
                created_at: draft.created_at,
            };
            let mut conversations = self.conversations.write().await;
            conversations.insert(conversation.id, conversation.clone());
            Ok(conversation)
        }

        async fn find_by_id(
            &self,
            id: ConversationId,
        ) -> Result<Option<Conversation>, RepositoryError> {
            let conversations = self.conversations.read().await;
            Ok(conversations.get(&id).cloned())
        }

        async fn touch_last_message(
            &self,
            id: ConversationId,
            at: Timestamp,
        ) -> Result<(), RepositoryError> {
            let mut conversations = self.conversations.write().await;
            let conversation = conversations.get_mut(&id).ok_or(RepositoryError::NotFound)?;
            conversation.last_message_at = Some(at);
            Ok(())
        }
    }

    #[async_trait]
    impl ParticipantRepository for MemoryConversationStore {
        async fn find(
            &self,
            conversation_id: ConversationId,
            user_id: UserId,
        ) -> Result<Option<Participant>, RepositoryError> {
            let participants = self.participants.read().await;
            Ok(participants.get(&(conversation_id, user_id)).cloned())
        }

        async fn insert(&self, participant: Participant) -> Result<(), RepositoryError> {
            let mut participants = self.participants.write().await;
            participants.insert(
                (participant.conversation_id, participant.user_id),
                participant,
            );
            Ok(())
        }

        async fn advance_last_read(
            &self,
            conversation_id: ConversationId,
            user_id: UserId,
            at: Timestamp,
        ) -> Result<Participant, RepositoryError> {
            let mut participants = self.participants.write().await;
            let participant = participants
                .get_mut(&(conversation_id, user_id))
                .ok_or(RepositoryError::NotFound)?;
            participant.advance_read(at);
            Ok(participant.clone())
        }

        async fn list_conversations_for_user(
            &self,
            user_id: UserId,
        ) -> Result<Vec<ConversationId>, RepositoryError> {
            let participants = self.participants.read().await;
            Ok(participants
                .keys()
                .filter(|(_, uid)| *uid == user_id)
                .map(|(cid, _)| *cid)
                .collect())
        }
    }

    #[async_trait]
    impl MessageRepository for MemoryConversationStore {
        async fn create(&self, draft: NewMessage) -> Result<Message, RepositoryError> {
            let message = Message {
                id: MessageId::from(Uuid::new_v4()),
                conversation_id: draft.conversation_id,
                sender_id: draft.sender_id,
                content: draft.content,
                message_type: draft.message_type,
                attachment_url: draft.attachment_url,
                created_at: draft.created_at,
                edited_at: None,
                deleted_at: None,
            };
            let mut messages = self.messages.write().await;
            messages.insert(message.id, message.clone());
            Ok(message)
        }

        async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
            let messages = self.messages.read().await;
            Ok(messages.get(&id).cloned())
        }

        async fn update(&self, message: &Message) -> Result<(), RepositoryError> {
            let mut messages = self.messages.write().await;
            if !messages.contains_key(&message.id) {
                return Err(RepositoryError::NotFound);
            }
            messages.insert(message.id, message.clone());
            Ok(())
        }

        async fn list_since(
            &self,
            conversation_id: ConversationId,
            since: Option<BackfillCursor>,
        ) -> Result<Vec<Message>, RepositoryError> {
            let messages = self.messages.read().await;
            let cutoff = match since {
                Some(BackfillCursor::MessageId(id)) => {
                    messages.get(&id).map(|m| m.created_at)
                }
                Some(BackfillCursor::Timestamp(ts)) => Some(ts),
                None => None,
            };
            let mut result: Vec<Message> = messages
                .values()
                .filter(|m| m.conversation_id == conversation_id)
                .filter(|m| cutoff.map_or(true, |c| m.created_at > c))
                .cloned()
                .collect();
            result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(result)
        }
    }

    /// 工单 / 工单消息的内存存储
    #[derive(Default)]
    pub struct MemoryTicketStore {
        tickets: RwLock<HashMap<TicketId, Ticket>>,
        messages: RwLock<HashMap<MessageId, TicketMessage>>,
    }

    impl MemoryTicketStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// 测试辅助：直接插入一张工单
        pub async fn seed_ticket(&self, ticket: Ticket) {
            let mut tickets = self.tickets.write().await;
            tickets.insert(ticket.id, ticket);
        }
    }

    #[async_trait]
    impl TicketRepository for MemoryTicketStore {
        async fn find_by_id(&self, id: TicketId) -> Result<Option<Ticket>, RepositoryError> {
            let tickets = self.tickets.read().await;
            Ok(tickets.get(&id).cloned())
        }

        async fn update(&self, ticket: &Ticket) -> Result<(), RepositoryError> {
            let mut tickets = self.tickets.write().await;
            if !tickets.contains_key(&ticket.id) {
                return Err(RepositoryError::NotFound);
            }
            tickets.insert(ticket.id, ticket.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl TicketMessageRepository for MemoryTicketStore {
        async fn create(
            &self,
            draft: NewTicketMessage,
        ) -> Result<TicketMessage, RepositoryError> {
            let message = TicketMessage {
                id: MessageId::from(Uuid::new_v4()),
                ticket_id: draft.ticket_id,
                sender_id: draft.sender_id,
                content: draft.content,
                is_internal: draft.is_internal,
                created_at: draft.created_at,
            };
            let mut messages = self.messages.write().await;
            messages.insert(message.id, message.clone());
            Ok(message)
        }

        async fn list_since(
            &self,
            ticket_id: TicketId,
            since: Option<BackfillCursor>,
        ) -> Result<Vec<TicketMessage>, RepositoryError> {
            let messages = self.messages.read().await;
            let cutoff = match since {
                Some(BackfillCursor::MessageId(id)) => {
                    messages.get(&id).map(|m| m.created_at)
                }
                Some(BackfillCursor::Timestamp(ts)) => Some(ts),
                None => None,
            };
            let mut result: Vec<TicketMessage> = messages
                .values()
                .filter(|m| m.ticket_id == ticket_id)
                .filter(|m| cutoff.map_or(true, |c| m.created_at > c))
                .cloned()
                .collect();
            result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(result)
        }
    }
}
