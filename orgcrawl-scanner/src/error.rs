use thiserror::Error;

/// Failure to obtain a page body after the client's retry budget is spent.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client could not be built: {0}")]
    Client(String),
}

impl FetchError {
    /// Transport failures and 5xx/429 answers are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::InvalidUrl(_) | FetchError::Client(_) => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("detail link matches no known page layout: {0}")]
    UnknownShape(String),

    #[error("context table missing or shorter than {needed} cells")]
    MissingContext { needed: usize },

    #[error("page has {found} value cells, layout needs at least {needed}")]
    ShortPage { found: usize, needed: usize },

    #[error("unit record has {found} fields, at least {needed} are required")]
    ShortRecord { found: usize, needed: usize },

    #[error("unit page has no name cell and no title to fall back on")]
    MissingName,
}

/// A listing page whose parallel columns disagree in length.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "page {page} is ragged: {index} indexes, {names} names, {dates} dates, {units} units"
)]
pub struct RaggedPageError {
    pub page: u32,
    pub index: usize,
    pub names: usize,
    pub dates: usize,
    pub units: usize,
}

pub type Result<T> = std::result::Result<T, FetchError>;
