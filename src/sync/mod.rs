use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod engine;

pub use engine::{DownloadReport, SyncEngine, SyncOutcome, UploadReport};

/// Connectivity and sync progress, published for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub online: bool,
    pub syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_uploads: i64,
}
