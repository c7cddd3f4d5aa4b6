use thiserror::Error;

/// Transport-level failure. Never retried inside a run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("relay error: {0}")]
    Relay(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Why a single search query produced nothing. Caught at the query-loop boundary.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Network(#[from] FetchError),

    #[error("blocked by marketplace: {reason}")]
    Blocked { reason: String },

    #[error("http status {status}")]
    Http { status: u16 },

    #[error("invalid search url: {0}")]
    InvalidUrl(String),

    #[error("persisting {count} items failed: {source}")]
    Persistence {
        count: usize,
        #[source]
        source: StoreError,
    },
}

impl QueryError {
    /// How many units this failure adds to the run's error counter.
    pub fn error_weight(&self) -> usize {
        match self {
            QueryError::Persistence { count, .. } => (*count).max(1),
            _ => 1,
        }
    }
}

/// Failures that stop a whole ingestion or refresh run before it starts working.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("a run is already in progress")]
    AlreadyRunning,

    #[error("run setup failed: {0}")]
    Setup(#[from] StoreError),
}
