use thiserror::Error;

/// Engine failures, split by whether a retry can succeed.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("transient engine failure: {0}")]
    Transient(String),

    #[error("engine failure: {0}")]
    Permanent(String),
}

impl EngineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classifies a failure the engine reported for a statement. "Query
    /// failed" responses are engine-side flakiness and can be retried; any
    /// other reported failure is taken at its word.
    pub fn from_engine_message(message: String) -> Self {
        if message.to_ascii_lowercase().contains("query failed") {
            Self::Transient(message)
        } else {
            Self::Permanent(message)
        }
    }
}
