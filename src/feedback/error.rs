use thiserror::Error;

/// A failed round trip against the evaluation backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Evaluation not found: {0}")]
    NotFound(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Retrying cannot fix a missing session or question.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    #[error("Feedback is taking longer than expected (no result after {attempts} attempts). Please refresh to try again.")]
    Timeout { attempts: u32 },
    #[error("Evaluation not found: {0}")]
    NotFound(String),
    #[error("Invalid poll request: {0}")]
    InvalidRequest(String),
    #[error("Failed to submit answer: {0}")]
    Submit(String),
}

pub type Result<T> = std::result::Result<T, PollError>;
