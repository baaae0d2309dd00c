//! 主应用程序入口
//!
//! 组装仓储、用例服务与网关状态，启动 Axum 服务。

use std::{env, sync::Arc, time::Duration};

use application::{
    Clock, ConversationService, ConversationServiceDependencies, PresenceTracker, RoomRegistry,
    SupportService, SupportServiceDependencies, SystemClock, TypingTracker,
};
use config::AppConfig;
use infrastructure::{
    Db, PostgresConversationRepository, PostgresMessageRepository, PostgresTicketRepository,
};
use tracing_subscriber::EnvFilter;
use web_api::{create_router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // JWT_SECRET 已配置时走严格加载并拒绝非法配置；否则退回开发默认值
    let config = if env::var("JWT_SECRET").is_ok() {
        let config = AppConfig::from_env();
        config.validate()?;
        config
    } else {
        tracing::warn!("JWT_SECRET not set, falling back to development defaults");
        AppConfig::from_env_with_defaults()
    };

    tracing::info!(
        database = %config.database.url.split('@').next_back().unwrap_or("unknown"),
        "connecting to database"
    );

    let pg_pool = Arc::new(
        Db::create_pool(&config.database.url, config.database.max_connections).await?,
    );

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&*pg_pool).await?;

    let conversation_store = Arc::new(PostgresConversationRepository::new(pg_pool.clone()));
    let message_store = Arc::new(PostgresMessageRepository::new(pg_pool.clone()));
    let ticket_store = Arc::new(PostgresTicketRepository::new(pg_pool));

    // 单进程权威的连接 / 在线 / 输入状态
    let rooms = Arc::new(RoomRegistry::new());
    let presence = Arc::new(PresenceTracker::new());
    let typing = Arc::new(TypingTracker::new(Duration::from_secs(
        config.gateway.typing_window_secs,
    )));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let conversation_service = Arc::new(ConversationService::new(
        ConversationServiceDependencies {
            conversations: conversation_store.clone(),
            participants: conversation_store,
            messages: message_store,
            clock: clock.clone(),
            rooms: rooms.clone(),
        },
    ));

    let support_service = Arc::new(SupportService::new(SupportServiceDependencies {
        tickets: ticket_store.clone(),
        ticket_messages: ticket_store,
        clock,
        rooms: rooms.clone(),
    }));

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(
        conversation_service,
        support_service,
        rooms,
        presence,
        typing,
        jwt_service,
    );

    let app = create_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("realtime gateway listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
