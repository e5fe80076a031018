use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, TimeZone, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::feishu::CalendarService;
use crate::feishu::dto::NewCalendar;
use crate::models::{
    ClearResult, CourseRecord, ProgressStatus, SkippedCourse, SyncFailure, SyncProgress,
    SyncResult, SyncedCourse,
};
use crate::repository::CourseRepository;
use crate::schedule::semester::{REFERENCE_TZ, SemesterCalendar};
use crate::services::event::{ReminderOption, build_event_payload};
use crate::storage::LinkageCache;

pub const COURSE_CALENDAR_NAME: &str = "课程表";
pub const COURSE_CALENDAR_ALIAS: &str = "Course Schedule";
const COURSE_CALENDAR_DESCRIPTION: &str = "课程表自动同步的课程日程";
const COURSE_CALENDAR_COLOR: i32 = -14_513_409;

pub const DEFAULT_SYNC_PACING: Duration = Duration::from_millis(200);
const DEFAULT_CLEAR_PACING: Duration = Duration::from_millis(100);

const SKIP_ALREADY_SYNCED: &str = "already synced";
const SKIP_CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ToggleOutcome {
    Created {
        #[serde(rename = "eventId")]
        event_id: String,
    },
    Deleted,
}

/// Mirrors course records into the course calendar and keeps the records'
/// `event_id` linkage in step.
pub struct CalendarSyncEngine {
    calendar: Arc<dyn CalendarService>,
    courses: Arc<CourseRepository>,
    linkage: LinkageCache,
    semester: Option<SemesterCalendar>,
    pacing: Duration,
    clear_pacing: Duration,
}

impl CalendarSyncEngine {
    pub fn new(
        calendar: Arc<dyn CalendarService>,
        courses: Arc<CourseRepository>,
        linkage: LinkageCache,
    ) -> Self {
        Self {
            calendar,
            courses,
            linkage,
            semester: None,
            pacing: DEFAULT_SYNC_PACING,
            clear_pacing: DEFAULT_CLEAR_PACING,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.clear_pacing = pacing.min(DEFAULT_CLEAR_PACING);
        self.pacing = pacing;
        self
    }

    /// Pins the term instead of picking it from the current date.
    pub fn with_semester(mut self, semester: SemesterCalendar) -> Self {
        self.semester = Some(semester);
        self
    }

    pub fn semester(&self) -> SemesterCalendar {
        self.semester
            .unwrap_or_else(|| SemesterCalendar::current(Utc::now()))
    }

    /// Cached id, then a calendar matching the fixed name, then a newly
    /// created one. Falls back to the first listed calendar when any of that
    /// fails.
    pub async fn get_or_create_course_calendar(&self) -> Result<String, AppError> {
        match self.resolve_course_calendar().await {
            Ok(calendar_id) => Ok(calendar_id),
            Err(e) => {
                warn!("course calendar resolution failed, falling back: {}", e);
                self.fallback_calendar().await
            }
        }
    }

    async fn resolve_course_calendar(&self) -> Result<String, AppError> {
        if let Some(calendar_id) = self.linkage.calendar_id().await? {
            return Ok(calendar_id);
        }

        let calendars = self.calendar.list_calendars().await?;
        let existing = calendars.into_iter().find(|c| {
            c.summary == COURSE_CALENDAR_NAME || c.summary_alias == COURSE_CALENDAR_ALIAS
        });

        let calendar_id = match existing {
            Some(found) => {
                debug!("found course calendar {}", found.calendar_id);
                found.calendar_id
            }
            None => {
                let created = self
                    .calendar
                    .create_calendar(&NewCalendar {
                        summary: COURSE_CALENDAR_NAME.to_string(),
                        description: COURSE_CALENDAR_DESCRIPTION.to_string(),
                        permissions: "private".to_string(),
                        color: COURSE_CALENDAR_COLOR,
                        summary_alias: COURSE_CALENDAR_ALIAS.to_string(),
                    })
                    .await?;
                info!("created course calendar {}", created);
                created
            }
        };

        self.linkage.remember(&calendar_id).await?;
        Ok(calendar_id)
    }

    async fn fallback_calendar(&self) -> Result<String, AppError> {
        let calendars = self
            .calendar
            .list_calendars()
            .await
            .map_err(|e| AppError::CalendarResolution(e.to_string()))?;

        let calendar_id = calendars
            .into_iter()
            .map(|c| c.calendar_id)
            .find(|id| !id.is_empty())
            .ok_or_else(|| AppError::CalendarResolution("no calendar available".to_string()))?;

        // Events created here must stay reachable for delete and toggle.
        if let Err(e) = self.linkage.remember_fallback(&calendar_id).await {
            warn!("failed to cache fallback calendar {}: {}", calendar_id, e);
        }
        Ok(calendar_id)
    }

    /// Creates one recurring event per unsynced course, strictly in order.
    ///
    /// Only calendar resolution failures are returned as errors; every
    /// per-course outcome lands in the [`SyncResult`].
    pub async fn sync_courses_to_calendar<F>(
        &self,
        courses: &[CourseRecord],
        reminder: ReminderOption,
        on_progress: F,
    ) -> Result<SyncResult, AppError>
    where
        F: FnMut(SyncProgress) + Send,
    {
        self.sync_courses_to_calendar_with_cancel(
            courses,
            reminder,
            &CancellationToken::new(),
            on_progress,
        )
        .await
    }

    /// Like [`Self::sync_courses_to_calendar`], checking `cancel` between
    /// courses. Courses left over after cancellation are reported as skipped.
    pub async fn sync_courses_to_calendar_with_cancel<F>(
        &self,
        courses: &[CourseRecord],
        reminder: ReminderOption,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<SyncResult, AppError>
    where
        F: FnMut(SyncProgress) + Send,
    {
        let span = info_span!("calendar_sync", batch = %Uuid::new_v4());

        async move {
            let total = courses.len();
            info!("syncing {} courses to calendar", total);

            if cancel.is_cancelled() {
                warn!("calendar sync cancelled before start");
                let mut result = SyncResult::with_total(total);
                result.skipped.extend(cancelled(courses));
                return Ok(result);
            }

            let calendar_id = self.get_or_create_course_calendar().await.map_err(|e| {
                error!("calendar sync aborted: {}", e);
                e
            })?;
            let semester_start = self.semester().start_date();

            let mut result = SyncResult::with_total(total);

            for (index, course) in courses.iter().enumerate() {
                if cancel.is_cancelled() {
                    warn!("calendar sync cancelled after {} of {} courses", index, total);
                    result.skipped.extend(cancelled(&courses[index..]));
                    break;
                }

                let synced = course.is_synced();
                on_progress(SyncProgress {
                    current: index + 1,
                    total,
                    course_name: course.course_name.clone(),
                    status: if synced {
                        ProgressStatus::Skipped
                    } else {
                        ProgressStatus::Processing
                    },
                });

                if synced {
                    debug!("skipping {} (already linked)", course.course_name);
                    result.skipped.push(SkippedCourse {
                        course: course.course_name.clone(),
                        record_id: course.record_id.clone(),
                        event_id: course.event_id.clone(),
                        reason: SKIP_ALREADY_SYNCED.to_string(),
                    });
                } else {
                    match self
                        .create_course_event(&calendar_id, course, semester_start, reminder)
                        .await
                    {
                        Ok(event_id) => result.success.push(SyncedCourse {
                            course: course.course_name.clone(),
                            record_id: course.record_id.clone(),
                            event_id,
                        }),
                        Err(e) => {
                            warn!("failed to sync {}: {}", course.course_name, e);
                            result.failed.push(SyncFailure {
                                course: course.course_name.clone(),
                                record_id: course.record_id.clone(),
                                error: e.to_string(),
                            });
                        }
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.pacing) => {}
                    _ = cancel.cancelled() => {}
                }
            }

            info!("calendar sync finished: {}", result.summary());
            Ok::<_, AppError>(result)
        }
        .instrument(span)
        .await
    }

    /// Creates the event and writes its id back onto the record. The write
    /// back is best effort.
    async fn create_course_event(
        &self,
        calendar_id: &str,
        course: &CourseRecord,
        semester_start: chrono::NaiveDate,
        reminder: ReminderOption,
    ) -> Result<String, AppError> {
        let payload = build_event_payload(course, semester_start, reminder)?;
        let event_id = self.calendar.create_event(calendar_id, &payload).await?;
        debug!("created event {} for {}", event_id, course.course_name);

        if course.record_id.is_empty() {
            warn!("{} has no record id, event {} stays unlinked", course.course_name, event_id);
        } else if let Err(e) = self.courses.set_event_id(&course.record_id, &event_id).await {
            warn!(
                "failed to link event {} to record {}: {}",
                event_id, course.record_id, e
            );
        }

        Ok(event_id)
    }

    /// Needs a cached course calendar; fails with `CalendarNotFound` before
    /// touching the calendar service otherwise.
    pub async fn delete_course_event(
        &self,
        event_id: &str,
        record_id: Option<&str>,
    ) -> Result<(), AppError> {
        let calendar_id = self
            .linkage
            .calendar_id()
            .await?
            .ok_or(AppError::CalendarNotFound)?;

        self.calendar.delete_event(&calendar_id, event_id).await?;
        info!("deleted event {}", event_id);

        if let Some(record_id) = record_id.filter(|id| !id.is_empty()) {
            if let Err(e) = self.courses.clear_event_id(record_id).await {
                warn!("failed to unlink record {}: {}", record_id, e);
            }
        }

        Ok(())
    }

    /// Removes the course's event when it has one, creates it otherwise.
    pub async fn toggle_course_event(
        &self,
        course: &CourseRecord,
        reminder: ReminderOption,
    ) -> Result<ToggleOutcome, AppError> {
        if let Some(event_id) = course.event_id.as_deref().filter(|id| !id.is_empty()) {
            self.delete_course_event(event_id, Some(&course.record_id))
                .await?;
            return Ok(ToggleOutcome::Deleted);
        }

        let calendar_id = self.get_or_create_course_calendar().await?;
        let semester_start = self.semester().start_date();
        let event_id = self
            .create_course_event(&calendar_id, course, semester_start, reminder)
            .await?;
        Ok(ToggleOutcome::Created { event_id })
    }

    /// Clears `event_id` on every linked record, one at a time.
    pub async fn clear_all_course_event_ids(&self) -> Result<ClearResult, AppError> {
        let linked = self.courses.fetch_linked_courses().await?;
        let mut result = ClearResult {
            total: linked.len(),
            ..ClearResult::default()
        };

        for course in &linked {
            match self.courses.clear_event_id(&course.record_id).await {
                Ok(()) => result.success += 1,
                Err(e) => {
                    warn!("failed to clear event_id of {}: {}", course.record_id, e);
                    result.failed += 1;
                }
            }
            tokio::time::sleep(self.clear_pacing).await;
        }

        info!(
            "cleared event ids: {} of {} ({} failed)",
            result.success, result.total, result.failed
        );
        Ok(result)
    }

    /// Deletes the course calendar (best effort), forgets it and unlinks
    /// every record. Without a cached calendar nothing is touched.
    ///
    /// A fallback calendar is never deleted; only the linked events are
    /// removed from it.
    pub async fn delete_course_calendar(&self) -> Result<ClearResult, AppError> {
        let calendar_id = self
            .linkage
            .calendar_id()
            .await?
            .ok_or(AppError::CalendarNotFound)?;

        if self.linkage.is_fallback().await? {
            self.delete_linked_events(&calendar_id).await?;
        } else {
            match self.calendar.delete_calendar(&calendar_id).await {
                Ok(()) => info!("deleted course calendar {}", calendar_id),
                Err(e) => warn!("failed to delete course calendar {}: {}", calendar_id, e),
            }
        }

        self.linkage.forget().await?;
        self.clear_all_course_event_ids().await
    }

    async fn delete_linked_events(&self, calendar_id: &str) -> Result<(), AppError> {
        let linked = self.courses.fetch_linked_courses().await?;
        for course in &linked {
            let Some(event_id) = course.event_id.as_deref() else {
                continue;
            };
            match self.calendar.delete_event(calendar_id, event_id).await {
                Ok(()) => debug!("deleted event {} from {}", event_id, calendar_id),
                Err(e) => warn!("failed to delete event {}: {}", event_id, e),
            }
            tokio::time::sleep(self.clear_pacing).await;
        }
        info!("removed {} course events from {}", linked.len(), calendar_id);
        Ok(())
    }

    /// Deletes events in the course calendar with the course's title and
    /// location, except the one the record is linked to. Returns the deleted
    /// ids.
    pub async fn remove_duplicate_events(
        &self,
        course: &CourseRecord,
    ) -> Result<Vec<String>, AppError> {
        let calendar_id = self
            .linkage
            .calendar_id()
            .await?
            .ok_or(AppError::CalendarNotFound)?;

        let semester = self.semester();
        let (start, end) = term_bounds(&semester)?;
        let events = self.calendar.list_events(&calendar_id, start, end).await?;

        let mut deleted = Vec::new();
        for event in events.iter().filter(|e| {
            e.summary == course.course_name
                && e.location_name() == course.location
                && course.event_id.as_deref() != Some(e.event_id.as_str())
        }) {
            match self.calendar.delete_event(&calendar_id, &event.event_id).await {
                Ok(()) => deleted.push(event.event_id.clone()),
                Err(e) => warn!("failed to delete duplicate {}: {}", event.event_id, e),
            }
        }

        if !deleted.is_empty() {
            info!("removed {} duplicates of {}", deleted.len(), course.course_name);
        }
        Ok(deleted)
    }
}

/// Epoch seconds spanning the whole term, midnight to midnight.
fn cancelled(courses: &[CourseRecord]) -> impl Iterator<Item = SkippedCourse> + '_ {
    courses.iter().map(|c| SkippedCourse {
        course: c.course_name.clone(),
        record_id: c.record_id.clone(),
        event_id: c.event_id.clone(),
        reason: SKIP_CANCELLED.to_string(),
    })
}

fn term_bounds(semester: &SemesterCalendar) -> Result<(i64, i64), AppError> {
    let start_date = semester.start_date();
    let end_date = start_date + Days::new(u64::from(semester.total_weeks()) * 7);

    let midnight = |date: chrono::NaiveDate| {
        REFERENCE_TZ
            .from_local_datetime(&date.and_time(chrono::NaiveTime::MIN))
            .single()
            .map(|dt| dt.timestamp())
            .ok_or_else(|| AppError::Validation(format!("ambiguous local midnight {}", date)))
    };

    Ok((midnight(start_date)?, midnight(end_date)?))
}
