use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timetable::api::router;
use timetable::config::AppConfig;
use timetable::feishu::{
    BitableStore, FeishuCalendar, FeishuHttpClient, StoredTokenProvider, UserToken,
};
use timetable::repository::CourseRepository;
use timetable::services::CalendarSyncEngine;
use timetable::state::AppState;
use timetable::storage::{KvStore, LinkageCache, SqliteKvStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "timetable=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenvy::dotenv() {
        warn!("no .env loaded: {}", e);
    }

    let config = AppConfig::new_from_env()?;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let kv = Arc::new(SqliteKvStore::new(pool));
    kv.migrate().await?;
    let kv_dyn: Arc<dyn KvStore> = kv.clone();

    let tokens = StoredTokenProvider::new(kv_dyn.clone());
    if let Some(access_token) = &config.user_token {
        tokens
            .save(&UserToken {
                access_token: access_token.clone(),
                refresh_token: None,
                expire_time: None,
            })
            .await?;
        info!("seeded user token from environment");
    }

    let api = Arc::new(FeishuHttpClient::new(&config.api_base, Arc::new(tokens))?);
    let records = Arc::new(BitableStore::new(api.clone(), &config.app_token));
    let courses = Arc::new(CourseRepository::new(records, &config.course_table));
    let engine = CalendarSyncEngine::new(
        Arc::new(FeishuCalendar::new(api)),
        courses.clone(),
        LinkageCache::new(kv_dyn),
    )
    .with_pacing(config.sync_pacing);

    let state = AppState {
        kv,
        courses,
        engine: Arc::new(engine),
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
