//! Job lifecycle contract
//!
//! The rules any reconciler must follow when mutating a [`TrainingJobStatus`]:
//!
//! ```text
//! Created ──► Running ──► Succeeded
//!    │          │  ▲
//!    │          ▼  │
//!    │       Restarting
//!    │          │
//!    └──────────┴──────► Failed
//! ```
//!
//! The condition log is append-only, nothing follows a terminal condition and
//! timestamps never go backwards. On top of the explicit transitions the run
//! policy forces `Failed` once the active deadline elapses (measured from
//! `Created`) or a restart would exceed the backoff limit. After a terminal
//! condition, pods are cleaned per `cleanPodPolicy` and the resource itself is
//! deleted once `ttlSecondsAfterFinished` elapses.
//!
//! Everything here is pure: callers pass `now` in, so a simulated clock is
//! enough to drive the whole contract in tests.

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::crd::{CleanPodPolicy, JobCondition, JobConditionType, RunPolicy, TrainingJobStatus};

/// Reason recorded on the initial condition
pub const REASON_CREATED: &str = "JobCreated";

/// Violations of the lifecycle contract
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The job already reached a terminal condition
    #[error("job is already {state}; no further conditions may be recorded")]
    AlreadyTerminal {
        /// The terminal condition
        state: JobConditionType,
    },

    /// The transition is not part of the state machine
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        /// Current condition
        from: JobConditionType,
        /// Requested condition
        to: JobConditionType,
    },

    /// The new condition would be timestamped before the current one
    #[error("condition timestamp {attempted} precedes previous condition at {previous}")]
    TimestampRegression {
        /// Timestamp of the current condition
        previous: DateTime<Utc>,
        /// Timestamp of the rejected condition
        attempted: DateTime<Utc>,
    },

    /// The condition log does not start with `Created`
    #[error("condition history must start with Created")]
    MissingCreated,
}

/// Why the contract forced a job into `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// `activeDeadlineSeconds` elapsed since `Created`
    DeadlineExceeded,
    /// More restarts than `backoffLimit` allows
    BackoffLimitExceeded,
}

impl TerminationReason {
    /// Condition reason string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::BackoffLimitExceeded => "BackoffLimitExceeded",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a reconciler must do with a job right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Job is live; keep reconciling. `deadline` is when it will be forced to fail.
    Continue {
        /// Absolute deadline, if the run policy sets one
        deadline: Option<DateTime<Utc>>,
    },
    /// Job must be moved to `Failed` now
    Terminate {
        /// Why
        reason: TerminationReason,
    },
    /// Job is terminal; remove pods per policy and keep the resource until `delete_at`
    Finished {
        /// Which pods to remove
        clean_pods: CleanPodPolicy,
        /// When the resource may be deleted; `None` keeps it forever
        delete_at: Option<DateTime<Utc>>,
    },
    /// TTL elapsed; delete the resource
    Delete,
}

impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue { deadline: Some(d) } => write!(f, "running until {}", d.to_rfc3339()),
            Self::Continue { deadline: None } => write!(f, "running (no deadline)"),
            Self::Terminate { reason } => write!(f, "terminate ({})", reason),
            Self::Finished {
                clean_pods,
                delete_at: Some(at),
            } => write!(f, "finished, clean pods: {}, delete at {}", clean_pods, at.to_rfc3339()),
            Self::Finished {
                clean_pods,
                delete_at: None,
            } => write!(f, "finished, clean pods: {}, retained", clean_pods),
            Self::Delete => write!(f, "delete"),
        }
    }
}

fn allowed(from: JobConditionType, to: JobConditionType) -> bool {
    use JobConditionType::*;
    matches!(
        (from, to),
        (Created, Running)
            | (Created, Failed)
            | (Running, Succeeded)
            | (Running, Failed)
            | (Running, Restarting)
            | (Restarting, Running)
            | (Restarting, Failed)
    )
}

/// `at + secs`, or `None` when the sum is out of range (treated as never)
fn offset(at: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(secs).ok()?;
    at.checked_add_signed(TimeDelta::try_seconds(secs)?)
}

impl TrainingJobStatus {
    /// Status recorded when the cluster accepts a submission
    pub fn created(at: DateTime<Utc>) -> Self {
        Self {
            conditions: vec![JobCondition::new(
                JobConditionType::Created,
                REASON_CREATED,
                "job accepted by the cluster",
                at,
            )],
            replica_statuses: Default::default(),
            restart_count: 0,
            start_time: None,
            completion_time: None,
        }
    }

    /// The full condition log, oldest first
    pub fn conditions(&self) -> &[JobCondition] {
        &self.conditions
    }

    /// Most recent condition
    pub fn current(&self) -> Option<&JobCondition> {
        self.conditions.last()
    }

    /// Type of the most recent condition
    pub fn state(&self) -> Option<JobConditionType> {
        self.current().map(|c| c.type_)
    }

    /// When the job entered `Created`
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.conditions
            .iter()
            .find(|c| c.type_ == JobConditionType::Created)
            .map(|c| c.last_transition_time)
    }

    /// When the job entered its terminal condition
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.current()
            .filter(|c| c.type_.is_terminal())
            .map(|c| c.last_transition_time)
    }

    /// Whether the job reached `Succeeded` or `Failed`
    pub fn is_finished(&self) -> bool {
        self.finished_at().is_some()
    }

    /// Append a condition, enforcing the state machine and timestamp order
    pub fn transition(
        &mut self,
        to: JobConditionType,
        reason: impl Into<String>,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let current = self.current().ok_or(LifecycleError::MissingCreated)?;
        let from = current.type_;

        if from.is_terminal() {
            return Err(LifecycleError::AlreadyTerminal { state: from });
        }
        if !allowed(from, to) {
            return Err(LifecycleError::InvalidTransition { from, to });
        }
        if at < current.last_transition_time {
            return Err(LifecycleError::TimestampRegression {
                previous: current.last_transition_time,
                attempted: at,
            });
        }

        if to == JobConditionType::Running && self.start_time.is_none() {
            self.start_time = Some(at);
        }
        if to.is_terminal() {
            self.completion_time = Some(at);
        }

        debug!(from = %from, to = %to, "recording job condition");
        self.conditions.push(JobCondition::new(to, reason, message, at));
        Ok(())
    }

    /// Record a replica failure on a running job
    ///
    /// Moves to `Restarting` and bumps the restart count, or to `Failed` when
    /// the restart would exceed `backoffLimit`. Returns the condition entered.
    pub fn record_restart(
        &mut self,
        policy: &RunPolicy,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<JobConditionType, LifecycleError> {
        let exhausted = policy
            .backoff_limit
            .is_some_and(|limit| self.restart_count >= limit);

        if exhausted {
            let reason = TerminationReason::BackoffLimitExceeded;
            self.transition(JobConditionType::Failed, reason.as_str(), message, at)?;
            warn!(restarts = self.restart_count, "backoff limit reached, job failed");
            return Ok(JobConditionType::Failed);
        }

        self.transition(JobConditionType::Restarting, "ReplicaFailed", message, at)?;
        self.restart_count = self.restart_count.saturating_add(1);
        Ok(JobConditionType::Restarting)
    }

    /// Decide what the reconciler must do at `now`
    pub fn evaluate(&self, policy: &RunPolicy, now: DateTime<Utc>) -> Directive {
        if let Some(finished) = self.finished_at() {
            let delete_at = policy
                .ttl_seconds_after_finished
                .and_then(|ttl| offset(finished, u64::from(ttl)));
            return match delete_at {
                Some(at) if at <= now => Directive::Delete,
                _ => Directive::Finished {
                    clean_pods: policy.clean_pod_policy,
                    delete_at,
                },
            };
        }

        let deadline = match (self.created_at(), policy.active_deadline_seconds) {
            (Some(created), Some(secs)) => offset(created, secs),
            _ => None,
        };
        if deadline.is_some_and(|d| d <= now) {
            return Directive::Terminate {
                reason: TerminationReason::DeadlineExceeded,
            };
        }
        if policy
            .backoff_limit
            .is_some_and(|limit| self.restart_count > limit)
        {
            return Directive::Terminate {
                reason: TerminationReason::BackoffLimitExceeded,
            };
        }

        Directive::Continue { deadline }
    }

    /// Evaluate at `now` and apply any forced failure
    ///
    /// Returns the directive that was evaluated; after a `Terminate` the
    /// status is already `Failed`. The failure is stamped no earlier than the
    /// last recorded condition.
    pub fn enforce(
        &mut self,
        policy: &RunPolicy,
        now: DateTime<Utc>,
    ) -> Result<Directive, LifecycleError> {
        let directive = self.evaluate(policy, now);
        if let Directive::Terminate { reason } = &directive {
            let message = match reason {
                TerminationReason::DeadlineExceeded => format!(
                    "job exceeded its active deadline of {}s",
                    policy.active_deadline_seconds.unwrap_or_default()
                ),
                TerminationReason::BackoffLimitExceeded => format!(
                    "job restarted {} times, limit is {}",
                    self.restart_count,
                    policy.backoff_limit.unwrap_or_default()
                ),
            };
            // A skewed clock may run behind the last recorded condition
            let at = self
                .current()
                .map_or(now, |c| now.max(c.last_transition_time));
            warn!(reason = %reason, "forcing job to Failed");
            self.transition(JobConditionType::Failed, reason.as_str(), message, at)?;
        }
        Ok(directive)
    }

    /// Check a persisted condition log against the contract
    pub fn validate_history(&self) -> Result<(), LifecycleError> {
        let mut iter = self.conditions.iter();
        let mut prev = match iter.next() {
            Some(first) if first.type_ == JobConditionType::Created => first,
            _ => return Err(LifecycleError::MissingCreated),
        };

        for next in iter {
            if prev.type_.is_terminal() {
                return Err(LifecycleError::AlreadyTerminal { state: prev.type_ });
            }
            if !allowed(prev.type_, next.type_) {
                return Err(LifecycleError::InvalidTransition {
                    from: prev.type_,
                    to: next.type_,
                });
            }
            if next.last_transition_time < prev.last_transition_time {
                return Err(LifecycleError::TimestampRegression {
                    previous: prev.last_transition_time,
                    attempted: next.last_transition_time,
                });
            }
            prev = next;
        }
        Ok(())
    }
}
