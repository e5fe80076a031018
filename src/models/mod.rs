pub mod course;
pub mod sync;

pub use course::{
    CourseRecord, ImportedCourse, WeekType, group_courses_by_day, palette_color,
    process_feishu_records,
};
pub use sync::{
    ClearResult, ProgressStatus, SkippedCourse, SyncFailure, SyncProgress, SyncResult,
    SyncedCourse,
};
