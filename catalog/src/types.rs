use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::transform::PartitionTransform;

/// A top-level column of an Iceberg table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// One field of a partition spec: a source column routed through a transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionField {
    pub field_id: i32,
    pub source_column: String,
    pub transform: PartitionTransform,
}

/// Schema and partition structure of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
    pub partition_spec: Vec<PartitionField>,
}

/// One snapshot as the catalog reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotInfo {
    pub snapshot_id: i64,
    pub parent_id: Option<i64>,
    pub timestamp_ms: i64,
    pub operation: String,
    pub manifest_list: String,
    pub summary: serde_json::Value,
}

/// Physical partition value Iceberg wrote for one spec field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionValue {
    Date(NaiveDate),
    Int(i64),
    Text(String),
    Null,
}

impl PartitionValue {
    /// String form stored for identity levels.
    pub fn render(&self) -> String {
        match self {
            Self::Date(date) => date.format("%Y-%m-%d").to_string(),
            Self::Int(value) => value.to_string(),
            Self::Text(value) => value.clone(),
            Self::Null => String::new(),
        }
    }
}

/// One data file with the statistics refresh aggregates over.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFile {
    pub partition: BTreeMap<i32, PartitionValue>,
    pub spec_id: i32,
    pub record_count: i64,
    pub file_size_bytes: i64,
}
