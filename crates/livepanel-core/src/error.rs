use thiserror::Error;

#[derive(Debug, Error)]
pub enum LivePanelError {
    #[error("Item id already in use: {0}")]
    DuplicateId(String),

    #[error("Invalid theme '{0}' (expected light, dark or auto)")]
    InvalidTheme(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LivePanelError {
    /// Whether this is a programmer-contract violation raised at the call site.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::DuplicateId(_) | Self::InvalidTheme(_))
    }
}

pub type Result<T> = std::result::Result<T, LivePanelError>;
