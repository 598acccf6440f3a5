use std::sync::Arc;

use async_trait::async_trait;

use super::error::FetchError;
use super::types::{AnswerSubmission, FetchOutcome, PollRequest, SubmitOutcome};

/// One "is it ready yet?" round trip against whatever produces evaluations.
///
/// The HTTP client in `crate::api` is the production implementation.
#[async_trait]
pub trait EvaluationSource: Send + Sync {
    async fn fetch(&self, request: &PollRequest) -> Result<FetchOutcome, FetchError>;
}

#[async_trait]
impl<S: EvaluationSource + ?Sized> EvaluationSource for Arc<S> {
    async fn fetch(&self, request: &PollRequest) -> Result<FetchOutcome, FetchError> {
        (**self).fetch(request).await
    }
}

/// Sends an answer for evaluation.
#[async_trait]
pub trait AnswerSubmitter: Send + Sync {
    async fn submit(&self, submission: &AnswerSubmission) -> Result<SubmitOutcome, FetchError>;
}

#[async_trait]
impl<S: AnswerSubmitter + ?Sized> AnswerSubmitter for Arc<S> {
    async fn submit(&self, submission: &AnswerSubmission) -> Result<SubmitOutcome, FetchError> {
        (**self).submit(submission).await
    }
}
