pub mod conversation_service;
pub mod support_service;

pub use conversation_service::{
    ConversationService, ConversationServiceDependencies, CreateConversationRequest,
    SendMessageRequest,
};
pub use support_service::{
    SendTicketMessageRequest, SupportService, SupportServiceDependencies, UpdateTicketRequest,
};

#[cfg(test)]
mod support_service_tests;
