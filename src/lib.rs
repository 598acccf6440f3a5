//! Client-side tracking of asynchronous answer evaluations for MockMate
//! interview sessions.

use log::info;

pub mod api;
pub mod config;
pub mod feedback;

pub use api::EvaluationClient;
pub use self::config::{AppConfig, PollerConfig};
pub use feedback::{
    FeedbackPoller, FeedbackResult, FeedbackService, PollError, PollHandle, PollRegistry, PollRequest, PollState,
};

/// Loads configuration and builds a service backed by the HTTP evaluation API.
pub fn connect() -> anyhow::Result<FeedbackService<EvaluationClient>> {
    let config = AppConfig::load()?;
    let client = EvaluationClient::from_config(&config)?;
    info!("MockMate feedback client ready ({})", config.api_base_url);
    Ok(FeedbackService::new(client, config.poller))
}
