//! 应用层：实时通信核心的用例服务与内存状态
//!
//! 持有权威的在线状态 / 房间 / 输入状态（单进程假设），
//! 持久化通过仓储 trait 委托给存储协作方。

pub mod clock;
pub mod error;
pub mod events;
pub mod presence;
pub mod repository;
pub mod rooms;
pub mod services;
pub mod typing;

pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use events::{AckBody, OutboundEvent};
pub use presence::{PresenceTracker, PresenceTransition};
pub use repository::{
    ConversationRepository, MessageRepository, ParticipantRepository, TicketMessageRepository,
    TicketRepository,
};
pub use rooms::{ConnectionSender, RoomRegistry};
pub use services::{
    ConversationService, ConversationServiceDependencies, CreateConversationRequest,
    SendMessageRequest, SendTicketMessageRequest, SupportService, SupportServiceDependencies,
    UpdateTicketRequest,
};
pub use typing::TypingTracker;
