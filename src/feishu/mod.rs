pub mod bitable;
pub mod calendar;
pub mod dto;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::storage::{KvStore, USER_TOKEN_KEY};

pub use bitable::{BitableStore, RecordStore};
pub use calendar::{CalendarService, FeishuCalendar};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Platform codes meaning the user token is no longer usable.
const TOKEN_ERROR_CODES: [i64; 4] = [901001, 901002, 901003, 901004];

/// Authenticated request against the platform open API. Returns the `data`
/// member of the response envelope.
#[async_trait]
pub trait FeishuRequest: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: &[(&str, String)],
    ) -> Result<Value, AppError>;

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, AppError> {
        self.request(Method::GET, path, None, query).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, AppError> {
        self.request(Method::POST, path, Some(body), &[]).await
    }

    async fn put(&self, path: &str, body: Value) -> Result<Value, AppError> {
        self.request(Method::PUT, path, Some(body), &[]).await
    }

    async fn delete(&self, path: &str) -> Result<Value, AppError> {
        self.request(Method::DELETE, path, None, &[]).await
    }
}

/// Supplies the bearer token for platform calls.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AppError>;

    /// Drops the token after the platform rejected it.
    async fn invalidate(&self) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds; `None` when the expiry is unknown.
    #[serde(default)]
    pub expire_time: Option<i64>,
}

impl UserToken {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expire_time.is_some_and(|expires| expires <= now)
    }
}

/// Reads the user token that the login flow left in the key/value store.
pub struct StoredTokenProvider {
    store: Arc<dyn KvStore>,
}

impl StoredTokenProvider {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn save(&self, token: &UserToken) -> Result<(), AppError> {
        let raw = serde_json::to_string(token)
            .map_err(|e| AppError::BadRequest(format!("Failed to encode token: {}", e)))?;
        self.store.set(USER_TOKEN_KEY, &raw).await
    }
}

#[async_trait]
impl AccessTokenProvider for StoredTokenProvider {
    async fn access_token(&self) -> Result<String, AppError> {
        let raw = self
            .store
            .get(USER_TOKEN_KEY)
            .await?
            .ok_or(AppError::Unauthorized)?;
        let token: UserToken = serde_json::from_str(&raw).map_err(|e| {
            warn!("stored user token is unreadable: {}", e);
            AppError::Unauthorized
        })?;

        if token.access_token.is_empty() || token.is_expired(Utc::now().timestamp()) {
            return Err(AppError::Unauthorized);
        }
        Ok(token.access_token)
    }

    async fn invalidate(&self) -> Result<(), AppError> {
        self.store.remove(USER_TOKEN_KEY).await
    }
}

pub struct FeishuHttpClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl FeishuHttpClient {
    pub fn new(base_url: &str, tokens: Arc<dyn AccessTokenProvider>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::BadRequest(format!("Failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, AppError> {
        let raw = format!("{}{}", self.base_url, path);
        let parsed = if query.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, query.iter().map(|(k, v)| (*k, v.as_str())))
        };
        parsed.map_err(|e| AppError::BadRequest(format!("Invalid request url {}: {}", raw, e)))
    }
}

#[async_trait]
impl FeishuRequest for FeishuHttpClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: &[(&str, String)],
    ) -> Result<Value, AppError> {
        let token = self.tokens.access_token().await?;
        let url = self.url(path, query)?;
        debug!("feishu request {} {}", method, path);

        let mut request = self.client.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: dto::Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(AppError::Api {
                    code: i64::from(status.as_u16()),
                    msg: text,
                });
            }
            Err(e) => {
                return Err(AppError::UnexpectedResponse(format!(
                    "{} {}: {}",
                    method, path, e
                )));
            }
        };

        if envelope.code != 0 {
            warn!(
                "feishu request {} {} failed: {} (code {})",
                method, path, envelope.msg, envelope.code
            );
            if TOKEN_ERROR_CODES.contains(&envelope.code) {
                if let Err(e) = self.tokens.invalidate().await {
                    warn!("failed to clear rejected user token: {}", e);
                }
                return Err(AppError::Unauthorized);
            }
            return Err(AppError::Api {
                code: envelope.code,
                msg: envelope.msg,
            });
        }

        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::storage::MemoryKvStore;

    async fn client_for(server: &MockServer) -> (FeishuHttpClient, Arc<dyn KvStore>) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::default());
        let tokens = StoredTokenProvider::new(store.clone());
        tokens
            .save(&UserToken {
                access_token: "u-test".to_string(),
                refresh_token: None,
                expire_time: None,
            })
            .await
            .expect("save token");
        let client = FeishuHttpClient::new(&server.uri(), Arc::new(tokens)).expect("client");
        (client, store)
    }

    #[tokio::test]
    async fn test_request_returns_data_member() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendar/v4/calendars"))
            .and(query_param("page_size", "50"))
            .and(header("Authorization", "Bearer u-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "success",
                "data": { "calendar_list": [] }
            })))
            .mount(&server)
            .await;

        let (client, _) = client_for(&server).await;
        let data = client
            .get("/calendar/v4/calendars", &[("page_size", "50".to_string())])
            .await
            .expect("request succeeds");
        assert_eq!(data, json!({ "calendar_list": [] }));
    }

    #[tokio::test]
    async fn test_request_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(body_json(json!({ "a": 1 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": { "ok": true }
            })))
            .mount(&server)
            .await;

        let (client, _) = client_for(&server).await;
        let data = client.post("/echo", json!({ "a": 1 })).await.expect("post");
        assert_eq!(data["ok"], true);
    }

    #[tokio::test]
    async fn test_non_zero_code_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendar/v4/calendars"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 190002,
                "msg": "invalid parameters"
            })))
            .mount(&server)
            .await;

        let (client, _) = client_for(&server).await;
        let err = client
            .post("/calendar/v4/calendars", json!({}))
            .await
            .expect_err("should fail");
        assert!(matches!(err, AppError::Api { code: 190002, .. }));
    }

    #[tokio::test]
    async fn test_token_error_clears_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/authen/v1/user_info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 901002,
                "msg": "token expired"
            })))
            .mount(&server)
            .await;

        let (client, store) = client_for(&server).await;
        let err = client.get("/authen/v1/user_info", &[]).await.expect_err("should fail");
        assert!(matches!(err, AppError::Unauthorized));
        assert_eq!(store.get(USER_TOKEN_KEY).await.expect("get"), None);

        let err = client.get("/authen/v1/user_info", &[]).await.expect_err("no token left");
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn test_http_error_without_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/calendar/v4/calendars/c1"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let (client, _) = client_for(&server).await;
        let err = client.delete("/calendar/v4/calendars/c1").await.expect_err("should fail");
        assert!(matches!(err, AppError::Api { code: 502, .. }));
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_before_sending() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::default());
        let tokens = StoredTokenProvider::new(store);
        tokens
            .save(&UserToken {
                access_token: "u-old".to_string(),
                refresh_token: Some("r-old".to_string()),
                expire_time: Some(1),
            })
            .await
            .expect("save token");

        assert!(matches!(tokens.access_token().await, Err(AppError::Unauthorized)));
    }
}
