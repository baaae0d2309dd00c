//! 仓储实现

mod conversation_repository_impl;
mod message_repository_impl;
mod ticket_repository_impl;

pub use conversation_repository_impl::PostgresConversationRepository;
pub use message_repository_impl::PostgresMessageRepository;
pub use ticket_repository_impl::PostgresTicketRepository;

use domain::RepositoryError;

/// 统一的 sqlx 错误映射。NotFound / Conflict 属于正常业务分支，
/// 其余存储故障在这里记日志再上抛。
pub(crate) fn map_sqlx(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => RepositoryError::Conflict,
        other => {
            tracing::error!(error = %other, "database operation failed");
            RepositoryError::storage(other)
        }
    }
}
