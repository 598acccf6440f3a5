use std::cell::Cell;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::PollerConfig;
use super::error::{FetchError, PollError, Result};
use super::source::EvaluationSource;
use super::types::{FeedbackResult, FetchOutcome, PollAttempt, PollRequest, PollState};

type UpdateCallback = Box<dyn FnMut(FeedbackResult) + Send + 'static>;

thread_local! {
    // Set while this thread is running a poller callback.
    static DELIVERING: Cell<bool> = Cell::new(false);
}

struct DeliveringGuard(bool);

impl DeliveringGuard {
    fn enter() -> Self {
        Self(DELIVERING.with(|d| d.replace(true)))
    }
}

impl Drop for DeliveringGuard {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(self.0));
    }
}

/// Starts poll sequences against an [`EvaluationSource`].
pub struct FeedbackPoller<S> {
    source: Arc<S>,
    config: PollerConfig,
}

impl<S> Clone for FeedbackPoller<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            config: self.config,
        }
    }
}

impl<S: EvaluationSource + 'static> FeedbackPoller<S> {
    pub fn new(source: S, config: PollerConfig) -> Self {
        Self::from_shared(Arc::new(source), config)
    }

    pub fn from_shared(source: Arc<S>, config: PollerConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Starts a poll sequence and returns immediately.
    ///
    /// Attempt 0 runs on a spawned task, so this must be called from within a
    /// Tokio runtime. `on_update` sees `Pending` at most once and at most one
    /// terminal result; it is never called after [`PollHandle::cancel`] returns.
    ///
    /// The poller does not deduplicate: starting twice for the same question
    /// yields two independent sequences. Use `PollRegistry` for last-writer-wins.
    pub fn start<F>(&self, request: PollRequest, on_update: F) -> Result<PollHandle>
    where
        F: FnMut(FeedbackResult) + Send + 'static,
    {
        request.ensure_valid()?;

        let shared = Arc::new(PollShared::new());
        shared.state.store(PollState::Polling as u8, Ordering::SeqCst);

        let session = PollSession {
            request: request.clone(),
            source: Arc::clone(&self.source),
            config: self.config,
            attempt: 0,
            pending_notified: false,
            shared: Arc::clone(&shared),
            on_update: Box::new(on_update),
        };

        debug!("Spawning poll sequence for {}", request);
        let task = tokio::spawn(session.run());

        Ok(PollHandle {
            request,
            shared,
            task: Mutex::new(Some(task)),
        })
    }
}

struct PollShared {
    state: AtomicU8,
    // Held while the callback runs. Only ever taken on its own, never while
    // another sequence's delivery lock is held.
    delivery: Mutex<()>,
    attempts: AtomicU32,
    wake: Notify,
}

impl PollShared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PollState::Idle as u8),
            delivery: Mutex::new(()),
            attempts: AtomicU32::new(0),
            wake: Notify::new(),
        }
    }

    fn state(&self) -> PollState {
        match self.state.load(Ordering::SeqCst) {
            s if s == PollState::Polling as u8 => PollState::Polling,
            s if s == PollState::Ready as u8 => PollState::Ready,
            s if s == PollState::Failed as u8 => PollState::Failed,
            s if s == PollState::Cancelled as u8 => PollState::Cancelled,
            _ => PollState::Idle,
        }
    }

    fn transition(&self, from: PollState, to: PollState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Caller's view of one running poll sequence.
///
/// Dropping the handle does not stop the sequence; call [`PollHandle::cancel`].
pub struct PollHandle {
    request: PollRequest,
    shared: Arc<PollShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollHandle {
    /// Stops all future attempts and discards any in-flight response.
    ///
    /// Outside a poller callback, this also waits for a callback of this
    /// sequence that is already running on another thread. From inside a
    /// callback it returns without waiting; no later callback will start.
    ///
    /// Returns false if the sequence had already reached a terminal state.
    pub fn cancel(&self) -> bool {
        if !self.shared.transition(PollState::Polling, PollState::Cancelled) {
            return false;
        }
        self.shared.wake.notify_one();

        if !DELIVERING.with(|d| d.get()) {
            drop(self.shared.delivery.lock());
        }
        info!("🛑 Feedback polling cancelled for {} after {} attempts", self.request, self.attempts());
        true
    }

    pub fn state(&self) -> PollState {
        self.shared.state()
    }

    /// Network calls started so far.
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn request(&self) -> &PollRequest {
        &self.request
    }

    /// Waits for the sequence's task to exit.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("❌ Poll task for {} ended abnormally: {}", self.request, e);
            }
        }
    }
}

/// Per-sequence state: one instance per `start()` call.
struct PollSession<S> {
    request: PollRequest,
    source: Arc<S>,
    config: PollerConfig,
    attempt: PollAttempt,
    pending_notified: bool,
    shared: Arc<PollShared>,
    on_update: UpdateCallback,
}

impl<S: EvaluationSource> PollSession<S> {
    async fn run(mut self) {
        info!("🔄 Polling feedback for {} (budget {} attempts)", self.request, self.config.max_attempts);

        loop {
            if self.shared.state() != PollState::Polling {
                break;
            }

            let attempt = self.attempt;
            self.shared.attempts.store(attempt + 1, Ordering::SeqCst);
            debug!("Feedback attempt {} for {}", attempt, self.request);

            let fetched = tokio::select! {
                biased;
                _ = self.shared.wake.notified() => None,
                result = self.source.fetch(&self.request) => Some(result),
            };

            let Some(result) = fetched else {
                debug!("In-flight attempt {} for {} dropped after cancel", attempt, self.request);
                break;
            };
            self.attempt += 1;

            let Some(delay) = self.handle_response(attempt, result) else {
                break;
            };

            tokio::select! {
                biased;
                _ = self.shared.wake.notified() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Poll sequence for {} finished in state {:?}", self.request, self.shared.state());
    }

    /// Returns the delay before the next attempt, or `None` when the sequence is over.
    fn handle_response(
        &mut self,
        attempt: PollAttempt,
        result: std::result::Result<FetchOutcome, FetchError>,
    ) -> Option<Duration> {
        match result {
            Ok(FetchOutcome::Ready(evaluation)) => {
                info!("✅ Feedback ready for {} on attempt {}", self.request, attempt);
                self.deliver(FeedbackResult::Ready(evaluation));
                None
            }
            Ok(FetchOutcome::Pending) => {
                if !self.pending_notified {
                    self.pending_notified = true;
                    if !self.deliver(FeedbackResult::Pending) {
                        return None;
                    }
                }
                self.next_delay(self.config.pending_delay)
            }
            Err(e) if e.is_terminal() => {
                warn!("❌ Giving up on {}: {}", self.request, e);
                let reason = match e {
                    FetchError::NotFound(reason) => reason,
                    other => other.to_string(),
                };
                self.deliver(FeedbackResult::Failed(PollError::NotFound(reason)));
                None
            }
            Err(e) => {
                warn!("⚠️ Feedback attempt {} for {} failed: {}", attempt, self.request, e);
                self.next_delay(self.config.error_delay)
            }
        }
    }

    fn next_delay(&mut self, delay: Duration) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            error!("⏰ No feedback for {} after {} attempts", self.request, self.attempt);
            self.deliver(FeedbackResult::Failed(PollError::Timeout { attempts: self.attempt }));
            return None;
        }
        Some(delay)
    }

    /// Invokes the callback unless the sequence already ended. Terminal results
    /// move the state before the callback runs.
    fn deliver(&mut self, result: FeedbackResult) -> bool {
        let _delivery = self.shared.delivery.lock();

        let accepted = match &result {
            FeedbackResult::Ready(_) => self.shared.transition(PollState::Polling, PollState::Ready),
            FeedbackResult::Failed(_) => self.shared.transition(PollState::Polling, PollState::Failed),
            FeedbackResult::Pending => self.shared.state() == PollState::Polling,
        };
        if !accepted {
            debug!("Discarding {:?} for {}: sequence already {:?}", result, self.request, self.shared.state());
            return false;
        }

        let _delivering = DeliveringGuard::enter();
        (self.on_update)(result);
        true
    }
}
