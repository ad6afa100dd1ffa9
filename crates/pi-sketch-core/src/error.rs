use thiserror::Error;

#[derive(Debug, Error)]
pub enum SketchError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Persist error: {0}")]
    Persist(String),

    #[error("{0} requires interactive mode")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SketchError>;
