//! 路由定义
//!
//! `/ws` 升级为网关长连接；`/api/.../messages` 是对账补拉入口，
//! 与实时路径共用同一套服务和授权检查。

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use domain::{BackfillCursor, Message, MessageId, TicketMessage};

use crate::error::ApiError;
use crate::state::AppState;
use crate::ws_connection;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route(
            "/api/conversations/{id}/messages",
            get(conversation_messages),
        )
        .route("/api/tickets/{id}/messages", get(ticket_messages))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// WebSocket 握手查询参数
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT access token
    pub token: String,
}

/// 握手即验证：token 无效直接拒绝升级
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Result<Response, StatusCode> {
    let identity = state
        .jwt_service
        .verify_token(&query.token)
        .map_err(|_| {
            tracing::warn!("websocket upgrade rejected: invalid token");
            StatusCode::UNAUTHORIZED
        })?;

    Ok(ws.on_upgrade(move |socket| ws_connection::handle_socket(socket, state, identity)))
}

/// 补拉游标参数
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillQuery {
    pub since: Option<DateTime<Utc>>,
    pub since_message_id: Option<Uuid>,
}

impl BackfillQuery {
    /// 消息 id 游标优先，时间戳兜底
    fn cursor(&self) -> Option<BackfillCursor> {
        if let Some(id) = self.since_message_id {
            return Some(BackfillCursor::MessageId(MessageId::from(id)));
        }
        self.since.map(BackfillCursor::Timestamp)
    }
}

async fn conversation_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<BackfillQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Message>>, ApiError> {
    let identity = state.jwt_service.extract_identity_from_headers(&headers)?;
    let messages = state
        .conversation_service
        .backfill(identity, id, query.cursor())
        .await?;
    Ok(Json(messages))
}

async fn ticket_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<BackfillQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<TicketMessage>>, ApiError> {
    let identity = state.jwt_service.extract_identity_from_headers(&headers)?;
    let messages = state
        .support_service
        .backfill(identity, id, query.cursor())
        .await?;
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_cursor_takes_precedence() {
        let id = Uuid::new_v4();
        let query = BackfillQuery {
            since: Some(Utc::now()),
            since_message_id: Some(id),
        };
        assert!(matches!(
            query.cursor(),
            Some(BackfillCursor::MessageId(m)) if m == MessageId::from(id)
        ));
    }

    #[test]
    fn timestamp_cursor_when_no_message_id() {
        let query = BackfillQuery {
            since: Some(Utc::now()),
            since_message_id: None,
        };
        assert!(matches!(
            query.cursor(),
            Some(BackfillCursor::Timestamp(_))
        ));

        let empty = BackfillQuery {
            since: None,
            since_message_id: None,
        };
        assert!(empty.cursor().is_none());
    }
}
