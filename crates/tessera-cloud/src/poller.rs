//! Bounded-time state polling
//!
//! Every asynchronous remote operation (order fulfilment, routing changes,
//! live configuration pushes) is awaited through [`wait_for_state`]. A flow
//! only supplies a probe and a [`StateWait`] describing which statuses mean
//! "keep going" and which mean "done".

use crate::error::CloudError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Status label reported by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollStatus {
    Pending,
    InProgress,
    Complete,
    Error,
}

impl std::fmt::Display for PollStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollStatus::Pending => write!(f, "pending"),
            PollStatus::InProgress => write!(f, "in-progress"),
            PollStatus::Complete => write!(f, "complete"),
            PollStatus::Error => write!(f, "error"),
        }
    }
}

/// How a probe relates to the remote operation it waits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeMode {
    /// The probe only reads remote status.
    #[default]
    StatusQuery,
    /// The probe re-issues the mutating call itself on every tick, and the
    /// call's success is the completion signal. The remote operation must be
    /// safe to repeat.
    MutatingRetry,
}

/// One probe result: the observed value and its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation<V> {
    pub value: V,
    pub status: PollStatus,
}

impl<V> Observation<V> {
    pub fn new(value: V, status: PollStatus) -> Self {
        Self { value, status }
    }

    pub fn pending(value: V) -> Self {
        Self::new(value, PollStatus::Pending)
    }

    pub fn in_progress(value: V) -> Self {
        Self::new(value, PollStatus::InProgress)
    }

    pub fn complete(value: V) -> Self {
        Self::new(value, PollStatus::Complete)
    }
}

/// Parameters for a single wait
#[derive(Debug, Clone)]
pub struct StateWait {
    /// Human-readable operation name used in logs and errors
    pub operation: String,

    /// Statuses that mean "not yet, retry later"
    pub pending: Vec<PollStatus>,

    /// Statuses that end the wait successfully
    pub target: Vec<PollStatus>,

    /// Total time budget
    pub timeout: Duration,

    /// Delay before the first retry
    pub poll_interval: Duration,

    /// Floor for every delay
    pub min_interval: Duration,

    /// Ceiling for every delay
    pub max_interval: Duration,

    /// Growth factor applied per retry (1.0 keeps a fixed interval)
    pub backoff_multiplier: f64,

    pub mode: ProbeMode,
}

impl StateWait {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            pending: vec![PollStatus::Pending],
            target: vec![PollStatus::Complete],
            timeout: Duration::from_secs(10 * 60),
            poll_interval: Duration::from_secs(10),
            min_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            backoff_multiplier: 1.0,
            mode: ProbeMode::StatusQuery,
        }
    }

    pub fn pending(mut self, statuses: &[PollStatus]) -> Self {
        self.pending = statuses.to_vec();
        self
    }

    pub fn target(mut self, statuses: &[PollStatus]) -> Self {
        self.target = statuses.to_vec();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_backoff(mut self, multiplier: f64, max_interval: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_interval = max_interval;
        self
    }

    pub fn mutating_retry(mut self) -> Self {
        self.mode = ProbeMode::MutatingRetry;
        self
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.poll_interval.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = scaled.min(self.max_interval.as_secs_f64().max(self.min_interval.as_secs_f64()));
        Duration::from_secs_f64(capped).max(self.min_interval)
    }
}

/// Book-keeping for one in-flight wait
struct PollState<V> {
    phase: PollStatus,
    /// Value of the latest non-target observation
    last: Option<V>,
    attempts: u32,
    started: Instant,
    deadline: Instant,
}

impl<V: std::fmt::Debug> PollState<V> {
    fn start(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            phase: PollStatus::Pending,
            last: None,
            attempts: 0,
            started,
            deadline: started + timeout,
        }
    }

    fn observe(&mut self, observation: Observation<V>) {
        self.phase = observation.status;
        self.last = Some(observation.value);
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn timeout_error(&self, operation: &str) -> CloudError {
        tracing::debug!(
            operation = %operation,
            attempts = self.attempts,
            last_value = ?self.last,
            "Wait budget exhausted"
        );
        CloudError::PollTimeout {
            operation: operation.to_string(),
            elapsed: self.elapsed(),
            attempts: self.attempts,
            last_status: self.phase,
        }
    }
}

/// Invoke `probe` until it reports a target status.
///
/// - A target status returns the observed value at once, without sleeping.
/// - A pending status sleeps (clamped to the remaining budget) and retries.
/// - A probe error is returned unchanged; errors are never retried.
/// - A status in neither set fails with [`CloudError::UnexpectedStatus`].
/// - Once the budget is spent the wait fails with [`CloudError::PollTimeout`]
///   and the probe is not called again.
pub async fn wait_for_state<V, E, F, Fut>(wait: &StateWait, mut probe: F) -> Result<V, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<V>, E>>,
    V: std::fmt::Debug,
    E: From<CloudError>,
{
    let mut state = PollState::start(wait.timeout);

    loop {
        state.attempts += 1;
        if wait.mode == ProbeMode::MutatingRetry {
            tracing::debug!(operation = %wait.operation, attempt = state.attempts, "Re-issuing operation");
        } else {
            tracing::debug!(operation = %wait.operation, attempt = state.attempts, "Polling status");
        }

        let observation = match probe().await {
            Ok(observation) => observation,
            Err(e) => {
                state.phase = PollStatus::Error;
                tracing::debug!(
                    operation = %wait.operation,
                    attempt = state.attempts,
                    "Probe failed, aborting wait"
                );
                return Err(e);
            }
        };
        if wait.target.contains(&observation.status) {
            tracing::debug!(
                operation = %wait.operation,
                attempts = state.attempts,
                elapsed = ?state.elapsed(),
                "Reached {}",
                observation.status
            );
            return Ok(observation.value);
        }
        state.observe(observation);

        if !wait.pending.contains(&state.phase) {
            return Err(CloudError::UnexpectedStatus {
                operation: wait.operation.clone(),
                status: state.phase,
            }
            .into());
        }

        if state.expired() {
            return Err(state.timeout_error(&wait.operation).into());
        }

        let delay = wait
            .delay_for_attempt(state.attempts - 1)
            .min(state.remaining());
        sleep(delay).await;

        if state.expired() {
            return Err(state.timeout_error(&wait.operation).into());
        }
    }
}
