use derive_more::derive::Display;

pub type EngineResult<T> = Result<T, EngineError>;

/// Whole-job failures. Per-item failures never surface here; they are
/// captured as data on the item results. The only conditions that abort a
/// job are ones discovered before any item is attempted.
#[derive(Debug, Display)]
pub enum EngineError {
    /// Provider credentials or configuration are unusable.
    #[display("provider configuration invalid: {_0}")]
    Configuration(String),
    /// The campaign template failed to compile.
    #[display("campaign template invalid: {_0}")]
    Template(String),
    Internal(anyhow::Error),
}

impl std::error::Error for EngineError {}

impl From<anyhow::Error> for EngineError {
    fn from(error: anyhow::Error) -> Self {
        EngineError::Internal(error)
    }
}

impl From<minijinja::Error> for EngineError {
    fn from(error: minijinja::Error) -> Self {
        EngineError::Template(error.to_string())
    }
}
