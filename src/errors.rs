//!
//! src/errors.rs
//!
//! Defines the error enum shared by both pipeline jobs and the
//! conversions from the library errors it wraps
//!

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),
    #[error("token endpoint returned {status}")]
    UpstreamAuth { status: u16 },
    #[error("playlist endpoint returned {status}")]
    UpstreamFetch { status: u16 },
    #[error("http error: {0}")]
    Http(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("csv error: {0}")]
    Csv(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self { PipelineError::Http(e.to_string()) }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self { PipelineError::Parse(e.to_string()) }
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self { PipelineError::Csv(e.to_string()) }
}

impl PipelineError {
    /// Message sent to the notification channel when an upstream endpoint
    /// refused a request, `None` for every other failure
    pub fn upstream_notice(&self) -> Option<String> {
        match self {
            PipelineError::UpstreamAuth { status } => Some(format!(
                "There is an error in get authorization token from Spotify, {status}"
            )),
            PipelineError::UpstreamFetch { status } => Some(format!(
                "There is an error in get playlist data from Spotify, {status}"
            )),
            _ => None,
        }
    }
}
