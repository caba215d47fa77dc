/// Result alias that carries the custom [`HighwayError`] type.
pub type Result<T> = std::result::Result<T, HighwayError>;

/// Common error type for the core crate.
///
/// Only loading paths (charts, configuration) can fail. The per-frame pipeline
/// resolves out-of-range queries with defaults and never returns an error.
#[derive(Debug, thiserror::Error)]
pub enum HighwayError {
    /// Free-form failure surfaced to the application.
    #[error("{0}")]
    Message(String),
    /// The chart object graph violates a structural rule, e.g. overlapping
    /// objects on one lane or a connection between non-adjacent segments.
    #[error("invalid chart: {0}")]
    InvalidChart(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON in a configuration or chart fixture.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl HighwayError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn chart<T: Into<String>>(reason: T) -> Self {
        Self::InvalidChart(reason.into())
    }
}

impl From<&str> for HighwayError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for HighwayError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
