//! Client for an Iceberg REST catalog.
//!
//! Tables and snapshots come from the standard load-table response; data
//! files come from the scan-planning endpoint, so no manifest parsing happens
//! in this process.

use std::collections::BTreeMap;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::error::CatalogError;
use crate::gateway::{CatalogGateway, DataFileStream};
use crate::transform::PartitionTransform;
use crate::types::{Column, DataFile, PartitionField, PartitionValue, SnapshotInfo, TableSchema};

pub struct RestCatalogGateway {
    client: reqwest::Client,
    base_url: String,
    namespace: String,
}

#[derive(Debug, Deserialize)]
struct ListTablesResponse {
    #[serde(default)]
    identifiers: Vec<TableIdentifier>,
}

#[derive(Debug, Deserialize)]
struct TableIdentifier {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LoadTableResponse {
    metadata: TableMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TableMetadata {
    #[serde(default)]
    current_schema_id: Option<i32>,
    #[serde(default)]
    schemas: Vec<SchemaJson>,
    #[serde(default)]
    default_spec_id: Option<i32>,
    #[serde(default)]
    partition_specs: Vec<PartitionSpecJson>,
    #[serde(default)]
    snapshots: Vec<SnapshotJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SchemaJson {
    #[serde(default)]
    schema_id: i32,
    #[serde(default)]
    fields: Vec<FieldJson>,
}

#[derive(Debug, Deserialize)]
struct FieldJson {
    id: i32,
    name: String,
    #[serde(rename = "type")]
    field_type: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PartitionSpecJson {
    #[serde(default)]
    spec_id: i32,
    #[serde(default)]
    fields: Vec<PartitionFieldJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PartitionFieldJson {
    field_id: i32,
    source_id: i32,
    transform: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SnapshotJson {
    snapshot_id: i64,
    #[serde(default)]
    parent_snapshot_id: Option<i64>,
    timestamp_ms: i64,
    #[serde(default)]
    manifest_list: String,
    #[serde(default)]
    summary: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PlanTableScanResponse {
    plan_status: String,
    #[serde(default)]
    file_scan_tasks: Vec<FileScanTaskJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FileScanTaskJson {
    data_file: DataFileJson,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DataFileJson {
    #[serde(default)]
    spec_id: i32,
    #[serde(default)]
    partition: Vec<serde_json::Value>,
    record_count: i64,
    file_size_in_bytes: i64,
}

fn connection_error(err: reqwest::Error) -> CatalogError {
    CatalogError::Transient(anyhow::Error::from(err).context("catalog request failed"))
}

fn status_error(status: reqwest::StatusCode, body: String) -> CatalogError {
    if status.is_server_error() {
        CatalogError::Transient(anyhow!("catalog returned {status}: {body}"))
    } else {
        CatalogError::Corrupt(format!("catalog returned {status}: {body}"))
    }
}

/// Column types are rendered as their plain spelling; nested types keep only
/// their kind (`struct`, `list`, `map`).
fn render_type(field_type: &serde_json::Value) -> String {
    match field_type {
        serde_json::Value::String(name) => name.clone(),
        serde_json::Value::Object(object) => object
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("unknown")
            .to_string(),
        _ => String::from("unknown"),
    }
}

fn convert_partition_value(value: &serde_json::Value) -> PartitionValue {
    match value {
        serde_json::Value::Null => PartitionValue::Null,
        serde_json::Value::Number(number) => number
            .as_i64()
            .map(PartitionValue::Int)
            .unwrap_or_else(|| PartitionValue::Text(number.to_string())),
        serde_json::Value::String(text) => match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            Ok(date) => PartitionValue::Date(date),
            Err(_) => PartitionValue::Text(text.clone()),
        },
        other => PartitionValue::Text(other.to_string()),
    }
}

impl TableMetadata {
    fn current_schema(&self) -> Result<&SchemaJson, CatalogError> {
        let schema = match self.current_schema_id {
            Some(id) => self.schemas.iter().find(|s| s.schema_id == id),
            None => self.schemas.last(),
        };
        schema.ok_or_else(|| CatalogError::Corrupt(String::from("table metadata has no schema")))
    }

    fn spec_fields(&self, spec: &PartitionSpecJson) -> Result<Vec<PartitionField>, CatalogError> {
        let schema = self.current_schema()?;
        let mut fields = Vec::with_capacity(spec.fields.len());
        for field in &spec.fields {
            let source_column = schema
                .fields
                .iter()
                .find(|f| f.id == field.source_id)
                .map(|f| f.name.clone())
                .ok_or_else(|| {
                    CatalogError::Corrupt(format!(
                        "partition field {} references unknown column {}",
                        field.field_id, field.source_id
                    ))
                })?;
            fields.push(PartitionField {
                field_id: field.field_id,
                source_column,
                transform: PartitionTransform::parse(&field.transform)?,
            });
        }
        Ok(fields)
    }

    fn default_spec_fields(&self) -> Result<Vec<PartitionField>, CatalogError> {
        let spec = match self.default_spec_id {
            Some(id) => self.partition_specs.iter().find(|s| s.spec_id == id),
            None => self.partition_specs.first(),
        };
        match spec {
            Some(spec) => self.spec_fields(spec),
            None => Ok(vec![]),
        }
    }
}

impl RestCatalogGateway {
    pub fn new(base_url: String, namespace: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            namespace,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/v1/namespaces/{}/tables/{}",
            self.base_url.trim_end_matches('/'),
            self.namespace,
            table
        )
    }

    async fn load_table(&self, table: &str) -> Result<TableMetadata, CatalogError> {
        let response = self
            .client
            .get(self.table_url(table))
            .send()
            .await
            .map_err(connection_error)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::TableNotFound(table.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        let loaded: LoadTableResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Corrupt(format!("decoding metadata of {table}: {e}")))?;
        Ok(loaded.metadata)
    }
}

#[async_trait]
impl CatalogGateway for RestCatalogGateway {
    async fn list_tables(&self) -> Result<Vec<String>, CatalogError> {
        let url = format!(
            "{}/v1/namespaces/{}/tables",
            self.base_url.trim_end_matches('/'),
            self.namespace
        );
        let response = self.client.get(url).send().await.map_err(connection_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        let listed: ListTablesResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Corrupt(format!("decoding table listing: {e}")))?;
        Ok(listed.identifiers.into_iter().map(|id| id.name).collect())
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema, CatalogError> {
        let metadata = self.load_table(table).await?;
        let columns = metadata
            .current_schema()?
            .fields
            .iter()
            .map(|field| Column {
                name: field.name.clone(),
                data_type: render_type(&field.field_type),
            })
            .collect();
        Ok(TableSchema {
            columns,
            partition_spec: metadata.default_spec_fields()?,
        })
    }

    async fn list_snapshots(&self, table: &str) -> Result<Vec<SnapshotInfo>, CatalogError> {
        let metadata = self.load_table(table).await?;
        Ok(metadata
            .snapshots
            .into_iter()
            .map(|snapshot| {
                let operation = snapshot
                    .summary
                    .get("operation")
                    .and_then(|op| op.as_str())
                    .unwrap_or("")
                    .to_string();
                SnapshotInfo {
                    snapshot_id: snapshot.snapshot_id,
                    parent_id: snapshot.parent_snapshot_id,
                    timestamp_ms: snapshot.timestamp_ms,
                    operation,
                    manifest_list: snapshot.manifest_list,
                    summary: snapshot.summary,
                }
            })
            .collect())
    }

    async fn list_data_files(&self, table: &str) -> Result<DataFileStream, CatalogError> {
        let metadata = self.load_table(table).await?;
        let mut fields_by_spec: BTreeMap<i32, Vec<PartitionField>> = BTreeMap::new();
        for spec in &metadata.partition_specs {
            fields_by_spec.insert(spec.spec_id, metadata.spec_fields(spec)?);
        }

        let url = format!("{}/plan", self.table_url(table));
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(connection_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        let plan: PlanTableScanResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Corrupt(format!("decoding scan plan of {table}: {e}")))?;
        if plan.plan_status != "completed" {
            return Err(CatalogError::Transient(anyhow!(
                "scan planning of {table} is {}",
                plan.plan_status
            )));
        }
        debug!(
            "scan plan of {table} returned {} data files",
            plan.file_scan_tasks.len()
        );

        let mut files = Vec::with_capacity(plan.file_scan_tasks.len());
        for task in plan.file_scan_tasks {
            let file = task.data_file;
            let fields = fields_by_spec.get(&file.spec_id).ok_or_else(|| {
                CatalogError::Corrupt(format!("data file references unknown spec {}", file.spec_id))
            })?;
            let mut partition = BTreeMap::new();
            for (field, value) in fields.iter().zip(file.partition.iter()) {
                partition.insert(field.field_id, convert_partition_value(value));
            }
            files.push(Ok(DataFile {
                partition,
                spec_id: file.spec_id,
                record_count: file.record_count,
                file_size_bytes: file.file_size_in_bytes,
            }));
        }
        Ok(futures::stream::iter(files).boxed())
    }
}
