use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Data files smaller than this are undersized; a partition containing one is
/// flagged for compaction.
pub const COMPACTION_THRESHOLD_BYTES: i64 = 128 * 1024 * 1024;

/// Aggregated statistics for one logical partition of a table.
///
/// `partition` maps logical level names (`year`, `month`, `day`, or identity
/// column names) to string values, with month/day zero-padded to two digits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub partition: BTreeMap<String, String>,
    pub spec_id: i32,
    pub record_count: i64,
    pub file_count: i64,
    pub total_data_file_size_in_bytes: i64,
    pub needs_optimize: bool,
    pub needs_optimize_count: i64,
    pub last_updated_at: DateTime<Utc>,
    pub last_updated_snapshot_id: Option<i64>,
}

/// One value of a partition drill-down, aggregated over all partitions
/// sharing the drilled prefix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionDrillEntry {
    pub value: String,
    pub partition_count: i64,
    pub record_count: i64,
    pub file_count: i64,
    pub total_data_file_size_in_bytes: i64,
    pub needs_optimize: bool,
}

/// Sums over all partitions of one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableTotals {
    pub partition_count: i64,
    pub record_count: i64,
    pub file_count: i64,
    pub total_data_file_size_in_bytes: i64,
    pub partitions_needing_optimize: i64,
}
