use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A column of an Iceberg table, as recorded in the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Time transform applied to the source column of a hidden partition level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeTransform {
    Year,
    Month,
    Day,
}

/// Source column and transform backing a hidden partition level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenSource {
    pub column: String,
    #[serde(rename = "type")]
    pub transform: TimeTransform,
}

/// A logical partition level: either an identity column, or a calendar level
/// (`year`, `month`, `day`) derived from a time-transformed source column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionLevel {
    pub name: String,
    pub is_hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<HiddenSource>,
}

/// Authoritative description of one table, replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub partition_levels: Vec<PartitionLevel>,
    pub updated_at: DateTime<Utc>,
}

impl TableDescriptor {
    /// Source column of the first day-transformed partition level. Compaction
    /// predicates are date ranges over this column; tables without one cannot
    /// be optimized through the task queue.
    pub fn day_partition_column(&self) -> Option<&str> {
        self.partition_levels.iter().find_map(|level| {
            level.hidden.as_ref().and_then(|hidden| {
                (level.is_hidden && hidden.transform == TimeTransform::Day)
                    .then_some(hidden.column.as_str())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden_level(name: &str, column: &str, transform: TimeTransform) -> PartitionLevel {
        PartitionLevel {
            name: name.to_string(),
            is_hidden: true,
            hidden: Some(HiddenSource {
                column: column.to_string(),
                transform,
            }),
        }
    }

    #[test]
    fn test_day_partition_column() {
        let descriptor = TableDescriptor {
            name: String::from("events"),
            columns: vec![],
            partition_levels: vec![
                hidden_level("year", "event_time", TimeTransform::Day),
                hidden_level("month", "event_time", TimeTransform::Day),
                hidden_level("day", "event_time", TimeTransform::Day),
            ],
            updated_at: Utc::now(),
        };
        assert_eq!(descriptor.day_partition_column(), Some("event_time"));
    }

    #[test]
    fn test_day_partition_column_absent_for_month_table() {
        let descriptor = TableDescriptor {
            name: String::from("monthly_rollup"),
            columns: vec![],
            partition_levels: vec![
                hidden_level("year", "event_time", TimeTransform::Month),
                hidden_level("month", "event_time", TimeTransform::Month),
            ],
            updated_at: Utc::now(),
        };
        assert_eq!(descriptor.day_partition_column(), None);
    }

    #[test]
    fn test_partition_level_json_shape() {
        let level = hidden_level("day", "event_time", TimeTransform::Day);
        let value = serde_json::to_value(&level).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "name": "day",
                "is_hidden": true,
                "hidden": {"column": "event_time", "type": "day"}
            })
        );

        let identity = PartitionLevel {
            name: String::from("region"),
            is_hidden: false,
            hidden: None,
        };
        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"name": "region", "is_hidden": false})
        );
    }
}
