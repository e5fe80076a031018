use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::FeishuRequest;
use super::dto::{self, CalendarEvent, CalendarInfo, EventPayload, NewCalendar};
use crate::error::AppError;

const CALENDAR_PAGE_SIZE: u32 = 500;
const EVENT_PAGE_SIZE: u32 = 500;

/// Remote calendar the course events are mirrored into.
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>, AppError>;

    /// Returns the new calendar's id.
    async fn create_calendar(&self, calendar: &NewCalendar) -> Result<String, AppError>;

    /// Returns the new event's id.
    async fn create_event(&self, calendar_id: &str, event: &EventPayload)
    -> Result<String, AppError>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), AppError>;

    async fn delete_calendar(&self, calendar_id: &str) -> Result<(), AppError>;

    /// Events overlapping `[start, end]`, both in epoch seconds.
    async fn list_events(
        &self,
        calendar_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<CalendarEvent>, AppError>;
}

pub struct FeishuCalendar {
    api: Arc<dyn FeishuRequest>,
}

impl FeishuCalendar {
    pub fn new(api: Arc<dyn FeishuRequest>) -> Self {
        Self { api }
    }
}

fn next_page_token(data: &Value) -> Option<String> {
    let has_more = data.get("has_more").and_then(Value::as_bool).unwrap_or(false);
    data.get("page_token")
        .and_then(Value::as_str)
        .filter(|token| has_more && !token.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl CalendarService for FeishuCalendar {
    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>, AppError> {
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("page_size", CALENDAR_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }
            let data = self.api.get("/calendar/v4/calendars", &query).await?;
            calendars.extend(dto::extract_list::<CalendarInfo>(&data, &["calendar_list", "items"]));

            match next_page_token(&data) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(calendars)
    }

    async fn create_calendar(&self, calendar: &NewCalendar) -> Result<String, AppError> {
        let body = serde_json::to_value(calendar)
            .map_err(|e| AppError::BadRequest(format!("Failed to encode calendar: {}", e)))?;
        let data = self.api.post("/calendar/v4/calendars", body).await?;
        dto::extract_calendar_id(&data).ok_or_else(|| {
            AppError::UnexpectedResponse("calendar creation returned no calendar_id".to_string())
        })
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        event: &EventPayload,
    ) -> Result<String, AppError> {
        let body = serde_json::to_value(event)
            .map_err(|e| AppError::BadRequest(format!("Failed to encode event: {}", e)))?;
        let path = format!("/calendar/v4/calendars/{}/events", calendar_id);
        let data = self.api.post(&path, body).await?;
        dto::extract_event_id(&data).ok_or_else(|| {
            AppError::UnexpectedResponse("event creation returned no event_id".to_string())
        })
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), AppError> {
        let path = format!("/calendar/v4/calendars/{}/events/{}", calendar_id, event_id);
        self.api.delete(&path).await?;
        Ok(())
    }

    async fn delete_calendar(&self, calendar_id: &str) -> Result<(), AppError> {
        let path = format!("/calendar/v4/calendars/{}", calendar_id);
        self.api.delete(&path).await?;
        Ok(())
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<CalendarEvent>, AppError> {
        let path = format!("/calendar/v4/calendars/{}/events", calendar_id);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("start_time", start.to_string()),
                ("end_time", end.to_string()),
                ("page_size", EVENT_PAGE_SIZE.to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }
            let data = self.api.get(&path, &query).await?;
            events.extend(dto::extract_list::<CalendarEvent>(&data, &["items"]));

            match next_page_token(&data) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(events)
    }
}
