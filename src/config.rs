use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::AppError;
use crate::repository::DEFAULT_COURSE_TABLE;
use crate::services::calendar_sync::DEFAULT_SYNC_PACING;

pub const DEFAULT_API_BASE: &str = "https://open.feishu.cn/open-apis";
const DEFAULT_DATABASE_URL: &str = "sqlite://timetable.db?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base: String,
    pub app_token: String,
    pub user_token: Option<String>,
    pub course_table: String,
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub sync_pacing: Duration,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let app_token = var("FEISHU_APP_TOKEN")
            .ok_or_else(|| AppError::BadRequest("FEISHU_APP_TOKEN is not set".to_string()))?;

        let bind_raw = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse()
            .map_err(|e| AppError::BadRequest(format!("Invalid BIND_ADDR {}: {}", bind_raw, e)))?;

        let sync_pacing = match var("SYNC_PACING_MS") {
            Some(raw) => Duration::from_millis(raw.trim().parse().map_err(|e| {
                AppError::BadRequest(format!("Invalid SYNC_PACING_MS {}: {}", raw, e))
            })?),
            None => DEFAULT_SYNC_PACING,
        };

        Ok(Self {
            api_base: var("FEISHU_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            app_token,
            user_token: var("FEISHU_USER_TOKEN"),
            course_table: var("COURSE_TABLE_NAME")
                .unwrap_or_else(|| DEFAULT_COURSE_TABLE.to_string()),
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            bind_addr,
            sync_pacing,
        })
    }
}
