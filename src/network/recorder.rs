//! Outcome Recording
//!
//! Persists finished-match results to the profile service.
//!
//! The session machine decides *that* a result must be recorded; the
//! `RecordingCoordinator` makes sure it is attempted exactly once per session,
//! retried a bounded number of times in the background, and reported to a
//! hook if every attempt fails. The terminal state is never rolled back.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::game::events::OutcomeReport;
use crate::game::state::SessionId;

/// Recorder errors.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Request could not be sent.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Profile service rejected the request.
    #[error("profile service returned status {0}")]
    Status(u16),

    /// Base URL could not be parsed.
    #[error("invalid profile url: {0}")]
    InvalidUrl(String),

    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

/// Something that can persist a match result.
#[async_trait]
pub trait OutcomeRecorder: Send + Sync + 'static {
    /// Persist one result.
    async fn record(&self, report: &OutcomeReport) -> Result<(), RecorderError>;
}

// =============================================================================
// HTTP RECORDER
// =============================================================================

/// Request body for the match-history endpoint.
#[derive(Debug, Serialize)]
struct MatchHistoryEntry<'a> {
    opponent: &'a str,
    status: &'static str,
}

/// Records results with `POST {base}/user/{userId}/match-history`.
#[derive(Debug, Clone)]
pub struct HttpOutcomeRecorder {
    base_url: String,
    client: reqwest::Client,
}

impl HttpOutcomeRecorder {
    /// Create a recorder. The auth token, if any, is sent as the `token` cookie.
    pub fn new(base_url: impl Into<String>, auth_token: Option<&str>) -> Result<Self, RecorderError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let url = reqwest::Url::parse(&base_url).map_err(|e| RecorderError::InvalidUrl(e.to_string()))?;

        let jar = Arc::new(reqwest::cookie::Jar::default());
        if let Some(token) = auth_token {
            jar.add_cookie_str(&format!("token={token}"), &url);
        }
        let client = reqwest::Client::builder().cookie_provider(jar).build()?;

        Ok(Self { base_url, client })
    }

    /// Endpoint for a user's match history.
    pub fn endpoint(&self, user_id: &str) -> String {
        format!("{}/user/{}/match-history", self.base_url, user_id)
    }
}

#[async_trait]
impl OutcomeRecorder for HttpOutcomeRecorder {
    async fn record(&self, report: &OutcomeReport) -> Result<(), RecorderError> {
        let body = MatchHistoryEntry {
            opponent: &report.opponent_label,
            status: report.result.as_status(),
        };
        let response = self
            .client
            .post(self.endpoint(&report.user_id))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecorderError::Status(status.as_u16()));
        }
        Ok(())
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Retry parameters for recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            max_attempts: 5,
        }
    }
}

/// How a recording run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// Persisted.
    Recorded {
        /// Attempts used.
        attempts: u32,
    },
    /// Every attempt failed.
    Failed {
        /// Attempts used.
        attempts: u32,
    },
}

/// Called once when a result could not be recorded.
pub type RecordingHook = Arc<dyn Fn(&OutcomeReport, &RecorderError) + Send + Sync>;

fn log_failure() -> RecordingHook {
    Arc::new(|report: &OutcomeReport, err: &RecorderError| {
        error!(
            session = %report.session_id,
            user = %report.user_id,
            result = report.result.as_status(),
            "Match result was not recorded: {}",
            err
        );
    })
}

/// Runs recorder calls in the background, once per session.
pub struct RecordingCoordinator<R: OutcomeRecorder> {
    recorder: Arc<R>,
    policy: RetryPolicy,
    submitted: Arc<RwLock<BTreeSet<SessionId>>>,
    hook: RecordingHook,
}

impl<R: OutcomeRecorder> Clone for RecordingCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            recorder: self.recorder.clone(),
            policy: self.policy,
            submitted: self.submitted.clone(),
            hook: self.hook.clone(),
        }
    }
}

impl<R: OutcomeRecorder> RecordingCoordinator<R> {
    /// Create a coordinator that logs final failures.
    pub fn new(recorder: R, policy: RetryPolicy) -> Self {
        Self {
            recorder: Arc::new(recorder),
            policy,
            submitted: Arc::new(RwLock::new(BTreeSet::new())),
            hook: log_failure(),
        }
    }

    /// Replace the final-failure hook.
    pub fn with_hook(mut self, hook: RecordingHook) -> Self {
        self.hook = hook;
        self
    }

    /// Start recording a result in the background.
    /// Returns `None` if this session was already submitted.
    pub async fn submit(&self, report: OutcomeReport) -> Option<JoinHandle<RecordingOutcome>> {
        {
            let mut submitted = self.submitted.write().await;
            if !submitted.insert(report.session_id) {
                warn!(session = %report.session_id, "Duplicate recording request ignored");
                return None;
            }
        }

        let recorder = self.recorder.clone();
        let policy = self.policy;
        let hook = self.hook.clone();
        Some(tokio::spawn(async move {
            record_with_retries(recorder.as_ref(), policy, &report, &hook).await
        }))
    }
}

/// Try up to `policy.max_attempts` times with a fixed delay between attempts.
#[instrument(skip_all, fields(session = %report.session_id))]
pub async fn record_with_retries<R: OutcomeRecorder + ?Sized>(
    recorder: &R,
    policy: RetryPolicy,
    report: &OutcomeReport,
    hook: &RecordingHook,
) -> RecordingOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match recorder.record(report).await {
            Ok(()) => {
                info!(attempt, result = report.result.as_status(), "Match result recorded");
                return RecordingOutcome::Recorded { attempts: attempt };
            }
            Err(e) if attempt < max_attempts => {
                warn!(attempt, "Recording failed, retrying: {}", e);
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                hook(report, &e);
                return RecordingOutcome::Failed { attempts: attempt };
            }
        }
    }
}
