use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;

use super::error::Result;
use super::poller::{FeedbackPoller, PollHandle};
use super::source::EvaluationSource;
use super::types::{FeedbackResult, PollRequest, PollState};

type PollKey = (String, String);

struct ActivePoll {
    handle: Arc<PollHandle>,
    started_at: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ActivePollInfo {
    pub session_id: String,
    pub question_id: String,
    pub state: PollState,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
}

/// Keeps at most one live poll sequence per (session, question).
///
/// Starting a sequence for a pair that is already being polled cancels the
/// older one first.
pub struct PollRegistry<S> {
    poller: FeedbackPoller<S>,
    active: Arc<Mutex<HashMap<PollKey, ActivePoll>>>,
}

impl<S> Clone for PollRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            poller: self.poller.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

impl<S: EvaluationSource + 'static> PollRegistry<S> {
    pub fn new(poller: FeedbackPoller<S>) -> Self {
        Self {
            poller,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn poller(&self) -> &FeedbackPoller<S> {
        &self.poller
    }

    pub fn start<F>(&self, request: PollRequest, on_update: F) -> Result<Arc<PollHandle>>
    where
        F: FnMut(FeedbackResult) + Send + 'static,
    {
        request.ensure_valid()?;
        self.prune();
        let key = request.key();

        // Locks are never held across cancel(): a callback of the cancelled
        // sequence may be calling back into this registry.
        let previous = self.active.lock().remove(&key);
        if let Some(previous) = previous {
            if previous.handle.cancel() {
                info!("♻️ Replacing running feedback poll for {}", request);
            }
        }

        let handle = Arc::new(self.poller.start(request, on_update)?);
        let entry = ActivePoll {
            handle: Arc::clone(&handle),
            started_at: Utc::now(),
        };

        let displaced = self.active.lock().insert(key, entry);
        if let Some(displaced) = displaced {
            displaced.handle.cancel();
        }

        Ok(handle)
    }

    pub fn get(&self, session_id: &str, question_id: &str) -> Option<Arc<PollHandle>> {
        let key = (session_id.to_string(), question_id.to_string());
        self.active
            .lock()
            .get(&key)
            .filter(|entry| !entry.handle.is_finished())
            .map(|entry| Arc::clone(&entry.handle))
    }

    /// Returns true if a running sequence was cancelled.
    pub fn cancel(&self, session_id: &str, question_id: &str) -> bool {
        let key = (session_id.to_string(), question_id.to_string());
        let removed = self.active.lock().remove(&key);
        removed.map(|entry| entry.handle.cancel()).unwrap_or(false)
    }

    /// Cancels every sequence of one interview session. Returns how many were running.
    pub fn cancel_session(&self, session_id: &str) -> usize {
        let removed: Vec<ActivePoll> = {
            let mut active = self.active.lock();
            let keys: Vec<PollKey> = active.keys().filter(|(s, _)| s == session_id).cloned().collect();
            keys.iter().filter_map(|key| active.remove(key)).collect()
        };

        let cancelled = removed.iter().filter(|entry| entry.handle.cancel()).count();
        info!("🛑 Cancelled {} feedback polls for session {}", cancelled, session_id);
        cancelled
    }

    pub fn cancel_all(&self) -> usize {
        let removed: Vec<ActivePoll> = self.active.lock().drain().map(|(_, entry)| entry).collect();
        removed.iter().filter(|entry| entry.handle.cancel()).count()
    }

    pub fn active_count(&self) -> usize {
        self.prune();
        self.active.lock().len()
    }

    pub fn active(&self) -> Vec<ActivePollInfo> {
        self.prune();
        let active = self.active.lock();
        let mut polls: Vec<ActivePollInfo> = active
            .iter()
            .map(|((session_id, question_id), entry)| ActivePollInfo {
                session_id: session_id.clone(),
                question_id: question_id.clone(),
                state: entry.handle.state(),
                attempts: entry.handle.attempts(),
                started_at: entry.started_at,
            })
            .collect();
        polls.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        polls
    }

    fn prune(&self) {
        let mut active = self.active.lock();
        let before = active.len();
        active.retain(|_, entry| !entry.handle.is_finished());
        if active.len() != before {
            debug!("Pruned {} finished feedback polls", before - active.len());
        }
    }
}
