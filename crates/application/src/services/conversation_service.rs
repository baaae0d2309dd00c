//! 会话消息引擎
//!
//! 所有操作先过成员资格门槛（Participant 行必须存在），
//! 持久化成功后才广播 —— 广播只反映已落库的状态。

use std::sync::Arc;

use uuid::Uuid;

use domain::{
    BackfillCursor, Conversation, ConversationId, ConversationKind, DomainError, Identity,
    Message, MessageContent, MessageId, MessageType, NewConversation, NewMessage, Participant,
    RoomKey, UserId,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    events::OutboundEvent,
    repository::{ConversationRepository, MessageRepository, ParticipantRepository},
    rooms::RoomRegistry,
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    pub content: String,
    pub message_type: Option<MessageType>,
    pub attachment_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateConversationRequest {
    pub participant_ids: Vec<Uuid>,
    pub kind: Option<ConversationKind>,
    pub title: Option<String>,
    pub ad_id: Option<Uuid>,
}

pub struct ConversationServiceDependencies {
    pub conversations: Arc<dyn ConversationRepository>,
    pub participants: Arc<dyn ParticipantRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub clock: Arc<dyn Clock>,
    pub rooms: Arc<RoomRegistry>,
}

pub struct ConversationService {
    deps: ConversationServiceDependencies,
}

impl ConversationService {
    pub fn new(deps: ConversationServiceDependencies) -> Self {
        Self { deps }
    }

    /// 成员资格门槛：Participant 行不存在一律按授权失败处理
    async fn require_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Participant, ApplicationError> {
        self.deps
            .participants
            .find(conversation_id, user_id)
            .await?
            .ok_or_else(|| DomainError::NotAParticipant.into())
    }

    pub async fn send_message(
        &self,
        identity: Identity,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let conversation_id = ConversationId::from(request.conversation_id);
        self.require_participant(conversation_id, identity.user_id)
            .await?;

        let mut conversation = self
            .deps
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or(DomainError::ConversationNotFound)?;

        let content = MessageContent::new(request.content)?;
        let now = self.deps.clock.now();

        let stored = self
            .deps
            .messages
            .create(NewMessage {
                conversation_id,
                sender_id: identity.user_id,
                content,
                message_type: request.message_type.unwrap_or_default(),
                attachment_url: request.attachment_url,
                created_at: now,
            })
            .await?;

        // 发送者自己的已读水位顺带前移
        self.deps
            .participants
            .advance_last_read(conversation_id, identity.user_id, now)
            .await?;
        self.deps
            .conversations
            .touch_last_message(conversation_id, now)
            .await?;
        conversation.last_message_at = Some(now);

        let room = RoomKey::Conversation(conversation_id);
        self.deps.rooms.broadcast(
            room,
            &OutboundEvent::MessageNew {
                message: stored.clone(),
            },
            None,
        );
        self.deps.rooms.broadcast(
            room,
            &OutboundEvent::ConversationUpdated {
                conversation,
                last_message: stored.clone(),
            },
            None,
        );

        tracing::info!(
            conversation_id = %conversation_id,
            message_id = %stored.id,
            sender_id = %identity.user_id,
            "message sent"
        );
        Ok(stored)
    }

    /// 已读回执按读者维度推进，不按消息维度
    pub async fn mark_read(
        &self,
        identity: Identity,
        conversation_id: Uuid,
    ) -> Result<Participant, ApplicationError> {
        let conversation_id = ConversationId::from(conversation_id);
        self.require_participant(conversation_id, identity.user_id)
            .await?;

        let now = self.deps.clock.now();
        let participant = self
            .deps
            .participants
            .advance_last_read(conversation_id, identity.user_id, now)
            .await?;

        self.deps.rooms.broadcast(
            RoomKey::Conversation(conversation_id),
            &OutboundEvent::MessageRead {
                conversation_id,
                user_id: identity.user_id,
                last_read_at: participant.last_read_at,
            },
            None,
        );
        Ok(participant)
    }

    pub async fn edit_message(
        &self,
        identity: Identity,
        message_id: Uuid,
        new_content: String,
    ) -> Result<Message, ApplicationError> {
        let mut message = self
            .deps
            .messages
            .find_by_id(MessageId::from(message_id))
            .await?
            .ok_or(DomainError::MessageNotOwned)?;
        if message.sender_id != identity.user_id {
            return Err(DomainError::MessageNotOwned.into());
        }

        let content = MessageContent::new(new_content)?;
        message.edit(content, self.deps.clock.now())?;
        self.deps.messages.update(&message).await?;

        self.deps.rooms.broadcast(
            RoomKey::Conversation(message.conversation_id),
            &OutboundEvent::MessageEdited {
                message: message.clone(),
            },
            None,
        );
        Ok(message)
    }

    pub async fn delete_message(
        &self,
        identity: Identity,
        message_id: Uuid,
    ) -> Result<Message, ApplicationError> {
        let mut message = self
            .deps
            .messages
            .find_by_id(MessageId::from(message_id))
            .await?
            .ok_or(DomainError::MessageNotOwned)?;
        if message.sender_id != identity.user_id {
            return Err(DomainError::MessageNotOwned.into());
        }

        let now = self.deps.clock.now();
        message.mark_deleted(now)?;
        self.deps.messages.update(&message).await?;

        self.deps.rooms.broadcast(
            RoomKey::Conversation(message.conversation_id),
            &OutboundEvent::MessageDeleted {
                conversation_id: message.conversation_id,
                message_id: message.id,
                deleted_at: now,
            },
            None,
        );
        Ok(message)
    }

    pub async fn create_conversation(
        &self,
        identity: Identity,
        request: CreateConversationRequest,
    ) -> Result<Conversation, ApplicationError> {
        let mut participant_ids: Vec<UserId> = request
            .participant_ids
            .into_iter()
            .map(UserId::from)
            .collect();
        if !participant_ids.contains(&identity.user_id) {
            participant_ids.push(identity.user_id);
        }
        let mut seen = std::collections::HashSet::new();
        participant_ids.retain(|id| seen.insert(*id));
        if participant_ids.len() < 2 {
            return Err(DomainError::invalid_argument(
                "participantIds",
                "need at least one other participant",
            )
            .into());
        }

        let now = self.deps.clock.now();
        let conversation = self
            .deps
            .conversations
            .create(NewConversation {
                participant_ids: participant_ids.clone(),
                kind: request.kind.unwrap_or_default(),
                title: request.title,
                ad_id: request.ad_id,
                created_at: now,
            })
            .await?;

        for user_id in &participant_ids {
            self.deps
                .participants
                .insert(Participant::new(conversation.id, *user_id, now))
                .await?;
        }

        // 参与者的在线连接立刻挂进新房间，随后的消息不用等重连
        let room = RoomKey::Conversation(conversation.id);
        for user_id in &participant_ids {
            self.deps.rooms.join_user_connections(room, *user_id);
        }
        self.deps.rooms.broadcast(
            room,
            &OutboundEvent::ConversationCreated {
                conversation: conversation.clone(),
            },
            None,
        );

        tracing::info!(conversation_id = %conversation.id, "conversation created");
        Ok(conversation)
    }

    /// 补拉：返回权威有序列表，客户端按消息 id 幂等合并
    pub async fn backfill(
        &self,
        identity: Identity,
        conversation_id: Uuid,
        since: Option<BackfillCursor>,
    ) -> Result<Vec<Message>, ApplicationError> {
        let conversation_id = ConversationId::from(conversation_id);
        self.require_participant(conversation_id, identity.user_id)
            .await?;
        Ok(self.deps.messages.list_since(conversation_id, since).await?)
    }

    /// 连接建立时的快照房间集合；会话中途的成员变动不会触发重新加入
    pub async fn rooms_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RoomKey>, ApplicationError> {
        let conversations = self
            .deps
            .participants
            .list_conversations_for_user(user_id)
            .await?;
        Ok(conversations
            .into_iter()
            .map(RoomKey::Conversation)
            .collect())
    }
}
