use thiserror::Error;

/// Failures surfaced by the catalog gateway, split by whether a retry can
/// succeed.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("table {0} not found in catalog")]
    TableNotFound(String),

    #[error("unknown partition transform {0:?}")]
    UnknownPartitionTransform(String),

    #[error("malformed catalog metadata: {0}")]
    Corrupt(String),

    #[error("transient catalog failure: {0}")]
    Transient(#[source] anyhow::Error),
}

impl CatalogError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
