//! 市场实时通信核心领域模型
//!
//! 包含身份、会话、消息、工单等核心实体，以及相关的业务规则。

pub mod conversation;
pub mod errors;
pub mod identity;
pub mod message;
pub mod room;
pub mod ticket;
pub mod value_objects;

// 重新导出常用类型
pub use conversation::*;
pub use errors::*;
pub use identity::*;
pub use message::*;
pub use room::*;
pub use ticket::*;
pub use value_objects::*;
