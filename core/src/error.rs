use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input, rejected before any engine state changes.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A saved search id that does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("saved-search store error: {0}")]
    Store(#[from] sled::Error),

    #[error("saved-search encoding error: {0}")]
    Codec(#[from] bincode::Error),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }
}
