use std::sync::Arc;

use application::{
    ConversationService, PresenceTracker, RoomRegistry, SupportService, TypingTracker,
};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub conversation_service: Arc<ConversationService>,
    pub support_service: Arc<SupportService>,
    pub rooms: Arc<RoomRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub typing: Arc<TypingTracker>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        conversation_service: Arc<ConversationService>,
        support_service: Arc<SupportService>,
        rooms: Arc<RoomRegistry>,
        presence: Arc<PresenceTracker>,
        typing: Arc<TypingTracker>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            conversation_service,
            support_service,
            rooms,
            presence,
            typing,
            jwt_service,
        }
    }
}
