use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Processing,
    Skipped,
}

/// Emitted once per course, before it is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub current: usize,
    pub total: usize,
    pub course_name: String,
    pub status: ProgressStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedCourse {
    pub course: String,
    pub record_id: String,
    pub event_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub course: String,
    pub record_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedCourse {
    pub course: String,
    pub record_id: String,
    pub event_id: Option<String>,
    pub reason: String,
}

/// Outcome of a batch sync. `success + failed + skipped == total`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub success: Vec<SyncedCourse>,
    pub failed: Vec<SyncFailure>,
    pub skipped: Vec<SkippedCourse>,
    pub total: usize,
}

impl SyncResult {
    pub fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn attempted(&self) -> usize {
        self.success.len() + self.failed.len() + self.skipped.len()
    }

    pub fn summary(&self) -> String {
        let mut message = format!("成功 {} 门", self.success.len());
        if !self.failed.is_empty() {
            message.push_str(&format!("，失败 {} 门", self.failed.len()));
        }
        if !self.skipped.is_empty() {
            message.push_str(&format!("，跳过 {} 门", self.skipped.len()));
        }
        message
    }
}

/// Outcome of clearing linkage ids in the record store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearResult {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}
