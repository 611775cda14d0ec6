use thiserror::Error;

/// Failure of a single upstream fetch or parse, before it is attributed
/// to a source.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {status}")]
    Http { status: u16 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Upstream shape changed: {0}")]
    UpstreamShapeChanged(String),
}

impl FetchError {
    pub fn decoding(err: impl std::fmt::Display) -> Self {
        FetchError::Decoding(err.to_string())
    }

    pub fn shape(what: impl Into<String>) -> Self {
        FetchError::UpstreamShapeChanged(what.into())
    }

    /// Attach the originating source id.
    pub fn for_source(self, source_id: &str) -> TrendError {
        TrendError::Source {
            source_id: source_id.to_string(),
            error: self,
        }
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        FetchError::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decoding(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum TrendError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("[{source_id}] {error}")]
    Source {
        source_id: String,
        #[source]
        error: FetchError,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TrendError {
    /// The adapter-level error, if this failure came from a source fetch.
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            TrendError::Source { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn source_id(&self) -> Option<&str> {
        match self {
            TrendError::Source { source_id, .. } => Some(source_id),
            TrendError::SourceNotFound(id) => Some(id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrendError>;
