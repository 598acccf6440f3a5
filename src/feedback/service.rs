use std::sync::Arc;

use log::info;
use validator::Validate;

use crate::config::PollerConfig;
use super::error::{PollError, Result};
use super::poller::{FeedbackPoller, PollHandle};
use super::registry::PollRegistry;
use super::source::{AnswerSubmitter, EvaluationSource};
use super::types::{AnswerSubmission, Evaluation, FeedbackResult, SubmitOutcome};

/// What happened to a submitted answer.
pub enum Tracking {
    /// The backend scored the answer inline; the callback has already seen it.
    Evaluated(Evaluation),
    /// The backend queued the answer; a poll sequence is running.
    Polling(Arc<PollHandle>),
}

/// Submits answers and follows their evaluation through to a result.
pub struct FeedbackService<C> {
    client: Arc<C>,
    registry: PollRegistry<C>,
}

impl<C> Clone for FeedbackService<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            registry: self.registry.clone(),
        }
    }
}

impl<C: EvaluationSource + AnswerSubmitter + 'static> FeedbackService<C> {
    pub fn new(client: C, config: PollerConfig) -> Self {
        let client = Arc::new(client);
        let registry = PollRegistry::new(FeedbackPoller::from_shared(Arc::clone(&client), config));
        Self { client, registry }
    }

    pub fn registry(&self) -> &PollRegistry<C> {
        &self.registry
    }

    pub async fn submit_and_track<F>(&self, submission: AnswerSubmission, mut on_update: F) -> Result<Tracking>
    where
        F: FnMut(FeedbackResult) + Send + 'static,
    {
        let submission = submission.normalized();
        submission
            .validate()
            .map_err(|e| PollError::InvalidRequest(e.to_string()))?;
        let request = submission.poll_request()?;

        info!("📝 Submitting answer for {}", request);
        let outcome = self
            .client
            .submit(&submission)
            .await
            .map_err(|e| PollError::Submit(e.to_string()))?;

        match outcome {
            SubmitOutcome::Evaluated(evaluation) => {
                // A fresh answer supersedes any poll still waiting on an older one.
                self.registry.cancel(&request.session_id, &request.question_id);
                info!("✅ Answer for {} evaluated inline", request);
                on_update(FeedbackResult::Ready(evaluation.clone()));
                Ok(Tracking::Evaluated(evaluation))
            }
            SubmitOutcome::Queued => {
                info!("⏳ Evaluation for {} queued, polling for feedback", request);
                let handle = self.registry.start(request, on_update)?;
                Ok(Tracking::Polling(handle))
            }
        }
    }
}
