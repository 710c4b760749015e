use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::CatalogError;
use crate::types::{DataFile, SnapshotInfo, TableSchema};

pub type DataFileStream = BoxStream<'static, Result<DataFile, CatalogError>>;

/// Read-only capability over the external Iceberg catalog.
///
/// `describe_table` fails permanently when the partition spec uses a
/// transform the control plane does not recognize.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<String>, CatalogError>;

    async fn describe_table(&self, table: &str) -> Result<TableSchema, CatalogError>;

    async fn list_snapshots(&self, table: &str) -> Result<Vec<SnapshotInfo>, CatalogError>;

    async fn list_data_files(&self, table: &str) -> Result<DataFileStream, CatalogError>;
}
