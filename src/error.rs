//! Error taxonomy shared by the analysis pipeline and the search engine.
//!
//! Local failures (one summarizer, one file's parse, one re-score) never show up
//! here: they are logged and replaced by a default where they happen. What
//! remains is either stage-fatal or a not-found.

use thiserror::Error;
use uuid::Uuid;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("source browser error: {0}")]
    SourceBrowser(#[from] SourceError),

    #[error("pattern generation failed: {0}")]
    PatternGeneration(GenerationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl CoreError {
    pub fn repository_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "repository",
            id,
        }
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Failure of the structured generation capability. A completion that is
/// merely empty is `Ok(String::new())`, never one of these.
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl GenerationError {
    /// Transport problems, rate limits and server errors are worth another try;
    /// a response that does not fit the schema or a client error is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Provider { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::Exhausted { .. } => false,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },
}

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("analysis {0} is already terminal")]
    AnalysisTerminal(Uuid),

    #[error("analysis {0} is still in progress")]
    AnalysisNotTerminal(Uuid),

    #[error("{entity} not found: {id}")]
    Missing { entity: &'static str, id: Uuid },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
