use std::fmt;

use crate::error::CatalogError;

/// Partition transforms the control plane understands. Anything else
/// (`bucket[n]`, `truncate[n]`, `hour`, …) makes the table unnavigable here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionTransform {
    Identity,
    Year,
    Month,
    Day,
}

impl PartitionTransform {
    /// Recognizes a transform from its catalog spelling.
    pub fn parse(value: &str) -> Result<Self, CatalogError> {
        match value {
            "identity" => Ok(Self::Identity),
            "year" => Ok(Self::Year),
            "month" => Ok(Self::Month),
            "day" => Ok(Self::Day),
            other => Err(CatalogError::UnknownPartitionTransform(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
        }
    }
}

impl fmt::Display for PartitionTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
