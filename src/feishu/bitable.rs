use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::FeishuRequest;
use super::dto::{self, RawRecord, RecordFilter, RecordPage, TableInfo};
use crate::error::AppError;

const SEARCH_PAGE_SIZE: u32 = 500;
const TABLE_PAGE_SIZE: u32 = 100;

/// Remote tabular datastore holding course records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, AppError>;

    async fn search_records(
        &self,
        table_id: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<RawRecord>, AppError>;

    async fn batch_create_records(
        &self,
        table_id: &str,
        records: Vec<Map<String, Value>>,
    ) -> Result<Vec<RawRecord>, AppError>;

    async fn update_record(
        &self,
        table_id: &str,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<RawRecord, AppError>;
}

pub struct BitableStore {
    api: Arc<dyn FeishuRequest>,
    app_token: String,
}

impl BitableStore {
    pub fn new(api: Arc<dyn FeishuRequest>, app_token: &str) -> Self {
        Self {
            api,
            app_token: app_token.to_string(),
        }
    }

    fn tables_path(&self) -> String {
        format!("/bitable/v1/apps/{}/tables", self.app_token)
    }

    fn records_path(&self, table_id: &str) -> String {
        format!("{}/{}/records", self.tables_path(), table_id)
    }
}

#[async_trait]
impl RecordStore for BitableStore {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, AppError> {
        let data = self
            .api
            .get(&self.tables_path(), &[("page_size", TABLE_PAGE_SIZE.to_string())])
            .await?;
        Ok(dto::extract_list(&data, &["items"]))
    }

    async fn search_records(
        &self,
        table_id: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<RawRecord>, AppError> {
        let path = format!("{}/search", self.records_path(table_id));
        let body = if filter.is_empty() {
            json!({})
        } else {
            json!({ "filter": filter })
        };

        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("page_size", SEARCH_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let data = self
                .api
                .request(Method::POST, &path, Some(body.clone()), &query)
                .await?;
            let page: RecordPage = serde_json::from_value(data).map_err(|e| {
                AppError::UnexpectedResponse(format!("Failed to parse record page: {}", e))
            })?;
            records.extend(page.items);

            match page.page_token {
                Some(token) if page.has_more && !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("searched table {}: {} records", table_id, records.len());
        Ok(records)
    }

    async fn batch_create_records(
        &self,
        table_id: &str,
        records: Vec<Map<String, Value>>,
    ) -> Result<Vec<RawRecord>, AppError> {
        let path = format!("{}/batch_create", self.records_path(table_id));
        let body = json!({
            "records": records
                .into_iter()
                .map(|fields| json!({ "fields": fields }))
                .collect::<Vec<_>>()
        });

        let data = self.api.post(&path, body).await?;
        Ok(dto::extract_list(&data, &["records", "items"]))
    }

    async fn update_record(
        &self,
        table_id: &str,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<RawRecord, AppError> {
        let path = format!("{}/{}", self.records_path(table_id), record_id);
        let data = self.api.put(&path, json!({ "fields": fields })).await?;
        dto::extract_record(&data).ok_or_else(|| {
            AppError::UnexpectedResponse(format!("update of record {} returned no record", record_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

    use super::*;
    use crate::feishu::dto::FilterOperator;
    use crate::feishu::{FeishuHttpClient, StoredTokenProvider, UserToken};
    use crate::storage::{KvStore, MemoryKvStore};

    struct FirstPage;

    impl Match for FirstPage {
        fn matches(&self, request: &Request) -> bool {
            !request.url.query_pairs().any(|(key, _)| key == "page_token")
        }
    }

    async fn store_for(server: &MockServer) -> BitableStore {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::default());
        let tokens = StoredTokenProvider::new(kv);
        tokens
            .save(&UserToken {
                access_token: "u-test".to_string(),
                refresh_token: None,
                expire_time: None,
            })
            .await
            .expect("save token");
        let client = FeishuHttpClient::new(&server.uri(), Arc::new(tokens)).expect("client");
        BitableStore::new(Arc::new(client), "app123")
    }

    #[tokio::test]
    async fn test_search_follows_pages() {
        let server = MockServer::start().await;
        let records_path = "/bitable/v1/apps/app123/tables/tbl1/records/search";

        Mock::given(method("POST"))
            .and(path(records_path))
            .and(FirstPage)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {
                    "items": [{ "record_id": "r1", "fields": {} }],
                    "has_more": true,
                    "page_token": "p2"
                }
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(records_path))
            .and(query_param("page_token", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {
                    "items": [{ "record_id": "r2", "fields": {} }],
                    "has_more": false
                }
            })))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let filter = RecordFilter::all().and("event_id", FilterOperator::IsNotEmpty, &[]);
        let records = store.search_records("tbl1", &filter).await.expect("search");
        let ids: Vec<_> = records.iter().map(|r| r.record_id.as_str()).collect();
        assert_eq!(ids, ["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_update_record_unwraps_nested_record() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/bitable/v1/apps/app123/tables/tbl1/records/r1"))
            .and(body_json(json!({ "fields": { "event_id": "evt_1" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": { "record": { "record_id": "r1", "fields": { "event_id": "evt_1" } } }
            })))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let mut fields = Map::new();
        fields.insert("event_id".into(), json!("evt_1"));
        let record = store.update_record("tbl1", "r1", fields).await.expect("update");
        assert_eq!(record.record_id, "r1");
        assert_eq!(record.fields["event_id"], "evt_1");
    }

    #[tokio::test]
    async fn test_list_tables() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bitable/v1/apps/app123/tables"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": { "items": [
                    { "table_id": "tbl0", "name": "students" },
                    { "table_id": "tbl1", "name": "course_information" }
                ] }
            })))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let tables = store.list_tables().await.expect("tables");
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].table_id, "tbl1");
    }
}
