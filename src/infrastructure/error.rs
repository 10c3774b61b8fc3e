use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Calendar credentials rejected: {0}")]
    Unauthenticated(String),
    #[error("Calendar resource not found: {0}")]
    NotFound(String),
    #[error("Calendar request failed: {0}")]
    Upstream(String),
    #[error("Calendar temporarily unreachable: {0}")]
    Transient(String),
    #[error("Runtime state error: {0}")]
    State(String),
}

impl InfraError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
