//! Web 层：WebSocket 网关与 HTTP 补拉接口

pub mod auth;
pub mod error;
pub mod protocol;
pub mod routes;
pub mod state;
pub mod ws_connection;

pub use auth::{Claims, JwtService};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
