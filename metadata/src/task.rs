use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The maintenance operations the queue can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ExpireSnapshots,
    RemoveOrphanFiles,
    Optimize,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExpireSnapshots => "expire_snapshots",
            Self::RemoveOrphanFiles => "remove_orphan_files",
            Self::Optimize => "optimize",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "expire_snapshots" => Some(Self::ExpireSnapshots),
            "remove_orphan_files" => Some(Self::RemoveOrphanFiles),
            "optimize" => Some(Self::Optimize),
            _ => None,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle states: `queued → running → {success, error}`, terminal states
/// are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the task queue.
///
/// `kind` is kept as the raw stored string: rows written by a newer release
/// can carry kinds this build does not understand, and the worker must be
/// able to claim and fail them instead of refusing to read the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub table_name: String,
    pub kind: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub input: serde_json::Value,
    pub result: Option<serde_json::Value>,
}

/// Typed task inputs: built by the planner, serialized to JSON only at the
/// database edge, parsed back by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireSnapshotsInput {
    pub retention_days: i32,
    pub retain_last: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOrphanFilesInput {
    pub retention_days: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeInput {
    pub file_size_threshold_mb: i64,
    pub from: NaiveDate,
    pub to: NaiveDate,
}
