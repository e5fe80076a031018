use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::AppError;

pub const CALENDAR_ID_KEY: &str = "course_calendar_id";
pub const CALENDAR_FALLBACK_KEY: &str = "course_calendar_fallback";
pub const USER_TOKEN_KEY: &str = "feishu_user_token";

/// Client-side key/value storage (calendar linkage, user token).
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn remove(&self, key: &str) -> Result<(), AppError>;
}

pub struct SqliteKvStore {
    db: SqlitePool,
}

impl SqliteKvStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("select 1").execute(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let values = self.values.lock().map_err(|_| AppError::InternalServerError)?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut values = self.values.lock().map_err(|_| AppError::InternalServerError)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut values = self.values.lock().map_err(|_| AppError::InternalServerError)?;
        values.remove(key);
        Ok(())
    }
}

/// The id of the calendar container holding every generated course event.
#[derive(Clone)]
pub struct LinkageCache {
    store: Arc<dyn KvStore>,
}

impl LinkageCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn calendar_id(&self) -> Result<Option<String>, AppError> {
        Ok(self
            .store
            .get(CALENDAR_ID_KEY)
            .await?
            .filter(|id| !id.is_empty()))
    }

    pub async fn remember(&self, calendar_id: &str) -> Result<(), AppError> {
        self.store.remove(CALENDAR_FALLBACK_KEY).await?;
        self.store.set(CALENDAR_ID_KEY, calendar_id).await
    }

    /// Remembers a calendar that is not owned by this service, e.g. the
    /// user's primary calendar.
    pub async fn remember_fallback(&self, calendar_id: &str) -> Result<(), AppError> {
        self.store.set(CALENDAR_ID_KEY, calendar_id).await?;
        self.store.set(CALENDAR_FALLBACK_KEY, "true").await
    }

    pub async fn is_fallback(&self) -> Result<bool, AppError> {
        Ok(self.store.get(CALENDAR_FALLBACK_KEY).await?.as_deref() == Some("true"))
    }

    pub async fn forget(&self) -> Result<(), AppError> {
        self.store.remove(CALENDAR_FALLBACK_KEY).await?;
        self.store.remove(CALENDAR_ID_KEY).await
    }
}
