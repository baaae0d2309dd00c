//! 基础设施层：PostgreSQL 仓储实现

pub mod db;

pub use db::repositories::{
    PostgresConversationRepository, PostgresMessageRepository, PostgresTicketRepository,
};
pub use db::{Db, DbPool};
