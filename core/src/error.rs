use thiserror::Error;

#[derive(Error, Debug)]
pub enum LgdError {
    #[error("Date '{input}' does not match pattern '{pattern}'")]
    Format { input: String, pattern: String },

    #[error("Unsupported date pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Stream '{stream}' is missing declared column '{column}'")]
    SchemaMismatch { stream: String, column: String },

    #[error("Step '{name}' not found")]
    StepNotFound { name: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LgdError {
    pub fn format(input: &str, pattern: &str) -> Self {
        LgdError::Format {
            input:   input.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

pub type LgdResult<T> = Result<T, LgdError>;
