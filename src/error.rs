use thiserror::Error;

pub type ViewerResult<T> = Result<T, ViewerError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewerError {
    #[error("missing state: {0}")]
    MissingState(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("expression error in `{expression}`: {message}")]
    Expression { expression: String, message: String },

    #[error("chart operation `{operation}` failed: {message}")]
    Chart {
        operation: &'static str,
        message: String,
    },

    #[error("storage error for key `{key}`: {message}")]
    Storage { key: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("re-entrant access to {0}")]
    Reentrant(&'static str),
}

impl ViewerError {
    #[must_use]
    pub fn chart(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Chart {
            operation,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn expression(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Expression {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Missing-state errors are skipped with a warning instead of triggering fallbacks.
    #[must_use]
    pub fn is_missing_state(&self) -> bool {
        matches!(self, Self::MissingState(_))
    }
}

impl From<serde_json::Error> for ViewerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}
