//! Sync step execution with adaptive backoff.
//!
//! Every remote-fetch sub-step of a sync run goes through
//! [`SyncStepExecutor::run_step`], which consults the per-account, per-step
//! failure history before invoking the step and records the outcome after.
//! Backoff is purely across scheduled invocations: a single call never
//! retries.
//!
//! The skip window grows with the consecutive-failure count `f` as
//! `⌊f/3⌋ × f` backoff-base units, so the first couple of failures cost
//! nothing, mid-range failures push retries hours apart, and once `f`
//! reaches the cap the step is parked until the account's token changes.
//! A token change wipes the slate: failure history older than the token is
//! ignored entirely.

use castio_store::PublisherIdentity;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::events::{EventPublisher, SyncEvent};
use crate::policy::SyncPolicy;

/// Step name: profile sync.
pub const STEP_PROFILE: &str = "profile";
/// Step name: post fetch.
pub const STEP_FETCH_POSTS: &str = "fetch_posts";
/// Step name: story fetch.
pub const STEP_FETCH_STORIES: &str = "fetch_stories";
/// Step name: per-media insight fetch.
pub const STEP_MEDIA_INSIGHTS: &str = "media_insights";
/// Step name: account daily insights.
pub const STEP_DAILY_INSIGHTS: &str = "daily_insights";
/// Step name: account lifetime insights.
pub const STEP_LIFETIME_INSIGHTS: &str = "lifetime_insights";

/// Why a step was not invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Still inside the backoff window from previous failures.
    Backoff {
        /// Consecutive failures recorded for the step.
        fail_count: i32,
        /// Earliest time the step becomes eligible again.
        until: DateTime<Utc>,
    },

    /// The failure cap was reached; parked until the token changes.
    PermanentlyFailed {
        /// Consecutive failures recorded for the step.
        fail_count: i32,
    },
}

/// Whether a step should run right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    /// Invoke the step.
    Run,
    /// Leave the step alone this cycle.
    Skip(SkipReason),
}

/// Outcome of one [`SyncStepExecutor::run_step`] call.
#[derive(Debug)]
pub enum StepOutcome<T> {
    /// The step ran and succeeded; its failure history was cleared.
    Ran(T),

    /// The step was not invoked.
    Skipped(SkipReason),

    /// The step ran and failed permission-class; one more failure was
    /// recorded and siblings may continue.
    Failed {
        /// Error code of the failure.
        code: &'static str,
        /// Human-readable failure message.
        message: String,
    },
}

impl<T> StepOutcome<T> {
    /// The success value, if the step ran.
    pub fn into_ran(self) -> Option<T> {
        match self {
            StepOutcome::Ran(value) => Some(value),
            _ => None,
        }
    }

    /// Whether the step ran and succeeded.
    #[must_use]
    pub fn is_ran(&self) -> bool {
        matches!(self, StepOutcome::Ran(_))
    }

    /// Whether the step ran and failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }
}

/// Backoff window for a step with `fail_count` consecutive failures.
///
/// Zero for the first two failures, then widening quadratically-ish:
/// 3 failures → 6.25 h, 6 → 25 h, 9 → 56 h with the default base.
#[must_use]
pub fn backoff_window(policy: &SyncPolicy, fail_count: i32) -> Duration {
    let f = i64::from(fail_count.max(0));
    Duration::seconds((f / 3) * f * policy.backoff_base_secs)
}

/// Decide whether a step should run at `now`, from its recorded history.
///
/// Pure; the executor calls this with the wall clock, tests with fixed
/// instants.
#[must_use]
pub fn decide(
    identity: &PublisherIdentity,
    step: &str,
    policy: &SyncPolicy,
    now: DateTime<Utc>,
) -> StepDecision {
    let Some(state) = identity.step_state(step) else {
        return StepDecision::Run;
    };

    // A token refresh invalidates all prior failure history.
    if identity
        .token_updated_at
        .is_some_and(|t| t > state.last_failed_at)
    {
        return StepDecision::Run;
    }

    let fail_count = state.consecutive_failures;
    if fail_count >= policy.step_skip_cap {
        return StepDecision::Skip(SkipReason::PermanentlyFailed { fail_count });
    }

    let window = backoff_window(policy, fail_count);
    let try_if_older_than = now - window;
    if state.last_failed_at <= try_if_older_than {
        StepDecision::Run
    } else {
        StepDecision::Skip(SkipReason::Backoff {
            fail_count,
            until: state.last_failed_at + window,
        })
    }
}

/// Runs sync sub-steps under the backoff policy, recording outcomes on the
/// identity. The caller persists the identity afterwards.
pub struct SyncStepExecutor {
    policy: SyncPolicy,
    events: Arc<dyn EventPublisher>,
}

impl SyncStepExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(policy: SyncPolicy, events: Arc<dyn EventPublisher>) -> Self {
        Self { policy, events }
    }

    /// Run one step unless its backoff state says otherwise.
    ///
    /// Success clears the step's failure history. A permission-class failure
    /// is recorded on the identity and returned as
    /// [`StepOutcome::Failed`] so sibling steps still run. Any other error
    /// propagates and aborts the account's run.
    pub async fn run_step<T, F, Fut>(
        &self,
        identity: &mut PublisherIdentity,
        step: &str,
        run: F,
    ) -> SyncResult<StepOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let now = Utc::now();
        match decide(identity, step, &self.policy, now) {
            StepDecision::Skip(reason) => {
                debug!(identity_id = %identity.id, step, ?reason, "Skipping sync step");
                Ok(StepOutcome::Skipped(reason))
            }
            StepDecision::Run => match run().await {
                Ok(value) => {
                    identity.clear_step_failures(step);
                    Ok(StepOutcome::Ran(value))
                }
                Err(e) if e.is_permission_class() => {
                    identity.record_step_failure(step, now);
                    let consecutive_failures = identity
                        .step_state(step)
                        .map_or(0, |s| s.consecutive_failures);
                    warn!(
                        identity_id = %identity.id,
                        step,
                        error = %e,
                        consecutive_failures,
                        "Sync step failed permission-class"
                    );
                    self.events
                        .publish(SyncEvent::StepFailed {
                            identity_id: identity.id,
                            step: step.to_string(),
                            code: e.error_code().to_string(),
                            consecutive_failures,
                        })
                        .await;
                    Ok(StepOutcome::Failed {
                        code: e.error_code(),
                        message: e.to_string(),
                    })
                }
                Err(e) => Err(e),
            },
        }
    }
}
