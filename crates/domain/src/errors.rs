//! 领域模型错误定义
//!
//! 错误分类对应网关的确认帧语义：授权类错误在本地解决并通过 ack 返回，
//! 永远不会导致连接崩溃。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 验证错误
    #[error("{field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 会话不存在
    #[error("Conversation not found")]
    ConversationNotFound,

    /// 调用者不是会话参与者
    #[error("Not a participant of this conversation")]
    NotAParticipant,

    /// 消息不存在，或调用者不是发送者。
    /// 合并为一个错误，避免向非发送者泄露消息是否存在。
    #[error("Message not found or unauthorized")]
    MessageNotOwned,

    /// 工单不存在
    #[error("Ticket not found")]
    TicketNotFound,

    /// 工单房间只对请求人和客服开放
    #[error("Not allowed to join this ticket")]
    TicketAccessDenied,

    /// 仅客服可执行的操作
    #[error("Staff access required")]
    StaffOnly,

    /// 必须先加入工单房间
    #[error("Not joined to this ticket room")]
    NotInTicketRoom,

    /// 操作在当前状态下不允许（例如编辑已删除的消息）
    #[error("Operation not allowed")]
    OperationNotAllowed,
}

impl DomainError {
    /// 创建验证错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 是否属于授权类错误（而不是验证 / 不存在）
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            DomainError::NotAParticipant
                | DomainError::MessageNotOwned
                | DomainError::TicketAccessDenied
                | DomainError::StaffOnly
                | DomainError::NotInTicketRoom
        )
    }
}

/// 存储协作方错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
