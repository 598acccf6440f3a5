use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

use super::error::PollError;

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("must not be empty or whitespace".into());
        return Err(error);
    }
    Ok(())
}

/// Identifies the evaluation a poll sequence waits for.
#[derive(Serialize, Deserialize, Validate, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    #[validate(custom = "validate_not_blank")]
    pub session_id: String,
    #[validate(custom = "validate_not_blank")]
    pub question_id: String,
}

impl PollRequest {
    pub fn new(session_id: impl Into<String>, question_id: impl Into<String>) -> Result<Self, PollError> {
        let request = Self {
            session_id: session_id.into().trim().to_string(),
            question_id: question_id.into().trim().to_string(),
        };
        request.ensure_valid()?;
        Ok(request)
    }

    pub(crate) fn ensure_valid(&self) -> Result<(), PollError> {
        self.validate()
            .map_err(|e| PollError::InvalidRequest(e.to_string()))
    }

    pub fn key(&self) -> (String, String) {
        (self.session_id.clone(), self.question_id.clone())
    }
}

impl fmt::Display for PollRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.question_id)
    }
}

/// Zero-based ordinal of a network round trip within one poll sequence.
pub type PollAttempt = u32;

/// Scored feedback for one answer.
///
/// The evaluation service owns this shape. Common fields are typed for
/// convenience; everything else is kept verbatim in `extra`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, alias = "detailed_feedback", alias = "detailedFeedback", skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What the caller's `on_update` callback receives.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedbackResult {
    Ready(Evaluation),
    Pending,
    Failed(PollError),
}

impl FeedbackResult {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FeedbackResult::Pending)
    }
}

/// Outcome of a single successful round trip against the evaluation backend.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    Ready(Evaluation),
    Pending,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Ready,
    Failed,
    Cancelled,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PollState::Ready | PollState::Failed | PollState::Cancelled)
    }
}

/// An answer as sent to the evaluation backend.
#[derive(Serialize, Deserialize, Validate, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    #[serde(skip_serializing)]
    #[validate(custom = "validate_not_blank")]
    pub session_id: String,
    #[validate(custom = "validate_not_blank")]
    pub question_id: String,
    #[serde(rename = "answer")]
    #[validate(custom = "validate_not_blank")]
    pub answer_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u32>, // in seconds
}

impl AnswerSubmission {
    /// Trims the ids so the answer is posted to and polled from the same resource.
    pub fn normalized(mut self) -> Self {
        self.session_id = self.session_id.trim().to_string();
        self.question_id = self.question_id.trim().to_string();
        self
    }

    pub fn poll_request(&self) -> Result<PollRequest, PollError> {
        PollRequest::new(self.session_id.clone(), self.question_id.clone())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// Scored synchronously; no polling needed.
    Evaluated(Evaluation),
    /// Accepted for asynchronous evaluation.
    Queued,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_request_rejects_empty_ids() {
        assert!(PollRequest::new("s1", "q1").is_ok());
        assert!(matches!(PollRequest::new("", "q1"), Err(PollError::InvalidRequest(_))));
        assert!(matches!(PollRequest::new("s1", "   "), Err(PollError::InvalidRequest(_))));
    }

    #[test]
    fn test_blank_ids_rejected_without_constructor() {
        let request = PollRequest {
            session_id: " \t ".to_string(),
            question_id: "q1".to_string(),
        };
        assert!(matches!(request.ensure_valid(), Err(PollError::InvalidRequest(_))));

        let submission = AnswerSubmission {
            session_id: "s1".to_string(),
            question_id: "  ".to_string(),
            answer_text: "An answer".to_string(),
            response_time: None,
        };
        assert!(submission.validate().is_err());
    }

    #[test]
    fn test_normalized_submission_matches_poll_request() {
        let submission = AnswerSubmission {
            session_id: " s1 ".to_string(),
            question_id: "q1\n".to_string(),
            answer_text: "  keep my spacing ".to_string(),
            response_time: Some(30),
        }
        .normalized();

        assert_eq!(submission.session_id, "s1");
        assert_eq!(submission.question_id, "q1");
        assert_eq!(submission.answer_text, "  keep my spacing ");
        assert_eq!(submission.poll_request().unwrap(), PollRequest::new("s1", "q1").unwrap());
    }

    #[test]
    fn test_evaluation_keeps_unknown_fields() {
        let evaluation: Evaluation = serde_json::from_value(serde_json::json!({
            "score": 8,
            "detailed_feedback": "Solid structure",
            "strengths": ["clarity"],
            "rubric": {"depth": 3}
        }))
        .unwrap();

        assert_eq!(evaluation.score, Some(8.0));
        assert_eq!(evaluation.feedback.as_deref(), Some("Solid structure"));
        assert_eq!(evaluation.strengths, vec!["clarity".to_string()]);
        assert!(evaluation.improvements.is_empty());
        assert_eq!(evaluation.extra["rubric"]["depth"], 3);
    }

    #[test]
    fn test_submission_body_shape() {
        let submission = AnswerSubmission {
            session_id: "s1".to_string(),
            question_id: "q1".to_string(),
            answer_text: "I would use a queue".to_string(),
            response_time: None,
        };
        let body = serde_json::to_value(&submission).unwrap();
        assert_eq!(body, serde_json::json!({"questionId": "q1", "answer": "I would use a queue"}));
    }
}
