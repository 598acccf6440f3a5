use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use url::Url;

use crate::config::AppConfig;
use crate::feedback::{AnswerSubmission, AnswerSubmitter, Evaluation, EvaluationSource, FetchError, FetchOutcome, PollRequest, SubmitOutcome};

const USER_AGENT: &str = "MockMate/1.0";

/// HTTP client for the interview evaluation backend.
#[derive(Clone)]
pub struct EvaluationClient {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl EvaluationClient {
    pub fn new(base_url: &str, api_token: Option<String>, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| FetchError::Transport(format!("Invalid API base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::Transport(format!("API base URL '{}' cannot carry a path", base_url)));
        }

        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().unwrap_or_else(|e| {
            warn!("⚠️ Falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        });

        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, FetchError> {
        Self::new(&config.api_base_url, config.api_token.clone(), config.request_timeout)
    }

    /// `GET /interviews/{sessionId}/feedback?questionId={id}`
    pub async fn fetch_feedback(&self, request: &PollRequest) -> Result<FetchOutcome, FetchError> {
        let url = self.feedback_url(request)?;
        debug!("GET {}", url);

        let response = self
            .authorized(self.client.get(url))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        classify_feedback(status, &body)
    }

    /// `POST /interviews/{sessionId}/answers`
    pub async fn submit_answer(&self, submission: &AnswerSubmission) -> Result<SubmitOutcome, FetchError> {
        let url = self.endpoint(&["interviews", &submission.session_id, "answers"])?;
        info!("📤 Submitting answer for question {} in session {}", submission.question_id, submission.session_id);

        let response = self
            .authorized(self.client.post(url))
            .header("Accept", "application/json")
            .json(submission)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        classify_submission(status, &body)
    }

    pub(crate) fn feedback_url(&self, request: &PollRequest) -> Result<Url, FetchError> {
        let mut url = self.endpoint(&["interviews", &request.session_id, "feedback"])?;
        url.query_pairs_mut().append_pair("questionId", &request.question_id);
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Transport(format!("API base URL '{}' cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }
}

#[async_trait]
impl EvaluationSource for EvaluationClient {
    async fn fetch(&self, request: &PollRequest) -> Result<FetchOutcome, FetchError> {
        self.fetch_feedback(request).await
    }
}

#[async_trait]
impl AnswerSubmitter for EvaluationClient {
    async fn submit(&self, submission: &AnswerSubmission) -> Result<SubmitOutcome, FetchError> {
        self.submit_answer(submission).await
    }
}

/// Maps a feedback endpoint response onto a poll outcome.
///
/// 202 and `{"status": "pending"}` mean pending, a body with `evaluation`
/// means ready, 404 is final, anything else is a retryable error.
pub fn classify_feedback(status: u16, body: &str) -> Result<FetchOutcome, FetchError> {
    if status == 202 {
        return Ok(FetchOutcome::Pending);
    }
    check_status(status, body)?;

    let json: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Decode(format!("Invalid JSON in feedback response: {}", e)))?;

    if let Some(evaluation) = parse_evaluation(&json)? {
        return Ok(FetchOutcome::Ready(evaluation));
    }
    if is_pending(&json) {
        return Ok(FetchOutcome::Pending);
    }

    Err(FetchError::Decode(format!(
        "Feedback response has neither an evaluation nor a pending status: {}",
        truncate(body)
    )))
}

/// Maps an answer submission response onto a submit outcome.
///
/// Any accepted submission without an inline evaluation is treated as queued.
pub fn classify_submission(status: u16, body: &str) -> Result<SubmitOutcome, FetchError> {
    if status == 202 {
        return Ok(SubmitOutcome::Queued);
    }
    check_status(status, body)?;

    if body.trim().is_empty() {
        return Ok(SubmitOutcome::Queued);
    }
    let json: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Decode(format!("Invalid JSON in submission response: {}", e)))?;

    Ok(match parse_evaluation(&json)? {
        Some(evaluation) => SubmitOutcome::Evaluated(evaluation),
        None => SubmitOutcome::Queued,
    })
}

fn check_status(status: u16, body: &str) -> Result<(), FetchError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(FetchError::NotFound(error_message(body).unwrap_or_else(|| "no such session or question".to_string()))),
        _ => Err(FetchError::Http {
            status,
            body: truncate(body),
        }),
    }
}

fn parse_evaluation(json: &Value) -> Result<Option<Evaluation>, FetchError> {
    match json.get("evaluation") {
        None | Some(Value::Null) => Ok(None),
        Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| FetchError::Decode(format!("Malformed evaluation: {}", e))),
        Some(other) => Err(FetchError::Decode(format!("Evaluation is not an object: {}", other))),
    }
}

fn is_pending(json: &Value) -> bool {
    json.get("status")
        .and_then(|s| s.as_str())
        .map(|s| s.eq_ignore_ascii_case("pending"))
        .unwrap_or(false)
}

fn error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .find_map(|key| json.get(*key).and_then(|v| v.as_str()))
        .map(String::from)
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}
