use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarnError {
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("not authorized to modify these shelves")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request superseded")]
    Cancelled,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BarnError {
    /// Whether the failure is a superseded request, which callers drop silently.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BarnError::Cancelled)
    }
}

impl From<sqlx::Error> for BarnError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => BarnError::NotFound("row".into()),
            other => BarnError::RemoteUnavailable(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for BarnError {
    fn from(err: reqwest::Error) -> Self {
        BarnError::RemoteUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for BarnError {
    fn from(err: std::io::Error) -> Self {
        BarnError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for BarnError {
    fn from(err: serde_json::Error) -> Self {
        BarnError::Config(err.to_string())
    }
}

pub type BarnResult<T> = Result<T, BarnError>;
