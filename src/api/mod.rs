use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{delete, post};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;
use crate::models::*;
use crate::schedule::semester::REFERENCE_TZ;
use crate::schedule::{PeriodInfo, SemesterCalendar, WeekRange, all_periods, current_period};
use crate::services::{ReminderOption, ToggleOutcome};
use crate::state::AppState;

#[derive(Deserialize)]
struct OwnerQuery {
    open_id: String,
}

#[derive(Deserialize)]
struct WeekCoursesQuery {
    open_id: String,
    week: Option<u32>,
}

#[derive(Deserialize)]
struct DeleteEventQuery {
    record_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportRequest {
    open_id: String,
    courses: Vec<ImportedCourse>,
    #[serde(default)]
    sync: bool,
    #[serde(default)]
    reminder: ReminderOption,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    open_id: String,
    week: Option<u32>,
    #[serde(default)]
    reminder: ReminderOption,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleRequest {
    open_id: String,
    #[serde(default)]
    reminder: ReminderOption,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WeekOverview {
    current_week: u32,
    view_week: u32,
    total_weeks: u32,
    semester_start: chrono::NaiveDate,
    range: WeekRange,
    current_period: Option<PeriodInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WeekCourses {
    week: u32,
    courses: Vec<CourseRecord>,
    by_day: BTreeMap<u32, Vec<CourseRecord>>,
}

#[derive(Serialize)]
struct SyncResponse {
    message: String,
    result: SyncResult,
    progress: Vec<SyncProgress>,
}

#[derive(Serialize)]
struct ImportResponse {
    imported: Vec<CourseRecord>,
    sync: Option<SyncResponse>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/periods", get(list_periods))
        .route("/weeks/current", get(current_week))
        .route("/weeks/{week}", get(week_range))
        .route("/courses", get(list_week_courses))
        .route("/courses/all", get(list_all_courses))
        .route("/courses/import", post(import_courses))
        .route("/calendar", delete(delete_calendar))
        .route("/calendar/sync", post(sync_calendar))
        .route("/calendar/courses/{record_id}/toggle", post(toggle_course))
        .route("/calendar/events/{event_id}", delete(delete_event))
        .route("/calendar/links/clear", post(clear_links))
        .with_state(state)
}

/// Week shown by default: on Saturday and Sunday the coming week, clamped to
/// the term.
pub fn default_view_week(semester: &SemesterCalendar, now: DateTime<Utc>) -> u32 {
    let week = semester.current_week(now);
    match now.with_timezone(&REFERENCE_TZ).weekday() {
        Weekday::Sat | Weekday::Sun => (week + 1).min(semester.total_weeks()),
        _ => week,
    }
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.kv.ping().await?;
    Ok(StatusCode::OK)
}

async fn list_periods() -> Json<Vec<PeriodInfo>> {
    Json(all_periods())
}

async fn current_week(State(state): State<AppState>) -> Json<WeekOverview> {
    let now = Utc::now();
    let semester = state.engine.semester();
    let current_week = semester.current_week(now);
    let local = now.with_timezone(&REFERENCE_TZ);

    Json(WeekOverview {
        current_week,
        view_week: default_view_week(&semester, now),
        total_weeks: semester.total_weeks(),
        semester_start: semester.start_date(),
        range: semester.week_date_range(current_week),
        current_period: current_period(local.hour() * 60 + local.minute()),
    })
}

async fn week_range(
    State(state): State<AppState>,
    Path(week): Path<u32>,
) -> Result<Json<WeekRange>, AppError> {
    let semester = state.engine.semester();
    if !semester.is_valid_week(week) {
        return Err(AppError::BadRequest(format!(
            "week {} is outside 1-{}",
            week,
            semester.total_weeks()
        )));
    }
    Ok(Json(semester.week_date_range(week)))
}

async fn list_week_courses(
    State(state): State<AppState>,
    Query(params): Query<WeekCoursesQuery>,
) -> Result<Json<WeekCourses>, AppError> {
    let semester = state.engine.semester();
    let week = match params.week {
        Some(week) if semester.is_valid_week(week) => week,
        Some(week) => return Err(AppError::BadRequest(format!("invalid week {}", week))),
        None => default_view_week(&semester, Utc::now()),
    };

    let fetched = state
        .courses
        .fetch_courses_for_week(&params.open_id, week)
        .await?;
    let courses = semester.filter_courses_by_week(&fetched, week);
    let by_day = group_courses_by_day(&courses);

    Ok(Json(WeekCourses {
        week,
        courses,
        by_day,
    }))
}

async fn list_all_courses(
    State(state): State<AppState>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<Vec<CourseRecord>>, AppError> {
    let courses = state.courses.fetch_all_courses(&params.open_id).await?;
    Ok(Json(courses))
}

async fn import_courses(
    State(state): State<AppState>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, AppError> {
    if req.courses.is_empty() {
        return Err(AppError::BadRequest("no courses to import".to_string()));
    }

    let imported = state
        .courses
        .import_courses(&req.open_id, &req.courses)
        .await?;
    info!("imported {} courses", imported.len());

    let sync = if req.sync {
        let pending: Vec<CourseRecord> = imported
            .iter()
            .filter(|c| !c.is_synced())
            .cloned()
            .collect();
        Some(run_sync(&state, &pending, req.reminder).await?)
    } else {
        None
    };

    Ok(Json(ImportResponse { imported, sync }))
}

async fn sync_calendar(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    let semester = state.engine.semester();
    let courses = match req.week {
        Some(week) if semester.is_valid_week(week) => {
            let fetched = state
                .courses
                .fetch_courses_for_week(&req.open_id, week)
                .await?;
            semester.filter_courses_by_week(&fetched, week)
        }
        Some(week) => return Err(AppError::BadRequest(format!("invalid week {}", week))),
        None => state.courses.fetch_all_courses(&req.open_id).await?,
    };

    Ok(Json(run_sync(&state, &courses, req.reminder).await?))
}

async fn run_sync(
    state: &AppState,
    courses: &[CourseRecord],
    reminder: ReminderOption,
) -> Result<SyncResponse, AppError> {
    let mut progress = Vec::with_capacity(courses.len());
    let result = state
        .engine
        .sync_courses_to_calendar(courses, reminder, |p| progress.push(p))
        .await?;

    Ok(SyncResponse {
        message: result.summary(),
        result,
        progress,
    })
}

async fn toggle_course(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<ToggleOutcome>, AppError> {
    let course = state.courses.find_course(&req.open_id, &record_id).await?;
    let outcome = state.engine.toggle_course_event(&course, req.reminder).await?;
    Ok(Json(outcome))
}

async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Query(params): Query<DeleteEventQuery>,
) -> Result<StatusCode, AppError> {
    state
        .engine
        .delete_course_event(&event_id, params.record_id.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_links(State(state): State<AppState>) -> Result<Json<ClearResult>, AppError> {
    Ok(Json(state.engine.clear_all_course_event_ids().await?))
}

async fn delete_calendar(State(state): State<AppState>) -> Result<Json<ClearResult>, AppError> {
    Ok(Json(state.engine.delete_course_calendar().await?))
}
