use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use festive_backend::{
    AppState,
    config::Config,
    festival::{FestivalCalendar, current_year},
    router::create_router,
    routes::notification::spawn_retention_task,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
#[cfg(debug_assertions)]
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env()?;

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    if config.allow_unlock_override {
        tracing::warn!("Unlock override is enabled, ?unlock=true opens all festival content");
    }

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'festive_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // 设置 Redis 客户端
    let redis_client = redis::Client::open(config.redis_url.clone())?;

    let calendar = FestivalCalendar::default().with_spring_dates(config.spring_festival_dates.clone());
    calendar.warn_if_spring_missing(current_year(chrono::Utc::now()));

    // 设置应用状态
    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        redis: Arc::new(redis_client),
        calendar: Arc::new(calendar),
    };

    spawn_retention_task(
        pool,
        config.notification_retention_days,
        config.notification_purge_interval(),
    );

    let router = create_router(state);

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr).await?,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
