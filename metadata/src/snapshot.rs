use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One Iceberg snapshot of a table, projected from the catalog.
///
/// `operation` is never empty: refresh coerces a missing operation to
/// `"unknown"` before the record is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub snapshot_id: i64,
    pub parent_id: Option<i64>,
    pub committed_at: DateTime<Utc>,
    pub operation: String,
    pub manifest_list: String,
    pub summary: serde_json::Value,
}
