//! Lifecycle scenarios driven by a simulated clock and a stub reconciler
//!
//! The stub plays the part of the cluster controller: on every tick it reads
//! what the pods are doing, records the matching condition, then asks the
//! contract for a directive and applies it.

use chrono::{DateTime, TimeDelta, Utc};

use kiln_common::crd::{CleanPodPolicy, JobConditionType, RunPolicy, TrainingJobStatus};
use kiln_common::lifecycle::{Directive, TerminationReason};

struct SimClock {
    now: DateTime<Utc>,
}

impl SimClock {
    fn new() -> Self {
        Self {
            now: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    fn advance(&mut self, secs: i64) {
        self.now += TimeDelta::seconds(secs);
    }
}

/// What the pods report on a given tick
#[derive(Clone, Copy, Debug)]
enum PodReport {
    Pending,
    Running,
    ReplicaFailed,
    AllSucceeded,
}

struct StubReconciler {
    policy: RunPolicy,
    status: TrainingJobStatus,
    deleted: bool,
    cleaned_pods: Option<CleanPodPolicy>,
}

impl StubReconciler {
    fn submit(policy: RunPolicy, clock: &SimClock) -> Self {
        Self {
            policy,
            status: TrainingJobStatus::created(clock.now),
            deleted: false,
            cleaned_pods: None,
        }
    }

    fn tick(&mut self, report: PodReport, clock: &SimClock) -> Directive {
        let now = clock.now;
        let state = self.status.state();

        if !self.status.is_finished() {
            match (state, report) {
                (Some(JobConditionType::Created), PodReport::Running)
                | (Some(JobConditionType::Restarting), PodReport::Running) => {
                    self.status
                        .transition(JobConditionType::Running, "PodsRunning", "", now)
                        .unwrap();
                }
                (Some(JobConditionType::Running), PodReport::ReplicaFailed) => {
                    self.status
                        .record_restart(&self.policy, "replica exited non-zero", now)
                        .unwrap();
                }
                (Some(JobConditionType::Running), PodReport::AllSucceeded) => {
                    self.status
                        .transition(JobConditionType::Succeeded, "AllReplicasSucceeded", "", now)
                        .unwrap();
                }
                _ => {}
            }
        }

        let directive = self.status.enforce(&self.policy, now).unwrap();
        match &directive {
            Directive::Finished { clean_pods, .. } => self.cleaned_pods = Some(*clean_pods),
            Directive::Delete => self.deleted = true,
            _ => {}
        }
        directive
    }
}

#[test]
fn deadline_forces_failure_when_job_never_finishes() {
    let mut clock = SimClock::new();
    let policy = RunPolicy {
        active_deadline_seconds: Some(60),
        ..Default::default()
    };
    let mut job = StubReconciler::submit(policy, &clock);

    clock.advance(5);
    job.tick(PodReport::Running, &clock);

    // Ticks at 15s, 25s, ..., 55s: still running
    for _ in 0..5 {
        clock.advance(10);
        let directive = job.tick(PodReport::Running, &clock);
        assert!(matches!(directive, Directive::Continue { deadline: Some(_) }));
    }
    assert_eq!(job.status.state(), Some(JobConditionType::Running));

    clock.advance(10);
    let directive = job.tick(PodReport::Running, &clock);
    assert_eq!(
        directive,
        Directive::Terminate {
            reason: TerminationReason::DeadlineExceeded
        }
    );

    let last = job.status.current().unwrap();
    assert_eq!(last.type_, JobConditionType::Failed);
    assert_eq!(last.reason, "DeadlineExceeded");
    assert!(job.status.validate_history().is_ok());

    // The pods keep reporting success, but nothing follows a terminal condition
    clock.advance(10);
    job.tick(PodReport::AllSucceeded, &clock);
    assert_eq!(job.status.state(), Some(JobConditionType::Failed));
}

#[test]
fn deadline_applies_to_jobs_stuck_pending() {
    let mut clock = SimClock::new();
    let policy = RunPolicy {
        active_deadline_seconds: Some(60),
        ..Default::default()
    };
    let mut job = StubReconciler::submit(policy, &clock);

    clock.advance(60);
    job.tick(PodReport::Pending, &clock);
    assert_eq!(job.status.state(), Some(JobConditionType::Failed));
    assert_eq!(job.status.start_time, None);
}

#[test]
fn finishing_before_deadline_is_not_forced() {
    let mut clock = SimClock::new();
    let policy = RunPolicy {
        active_deadline_seconds: Some(60),
        ..Default::default()
    };
    let mut job = StubReconciler::submit(policy, &clock);

    clock.advance(5);
    job.tick(PodReport::Running, &clock);
    clock.advance(30);
    job.tick(PodReport::AllSucceeded, &clock);

    clock.advance(3600);
    job.tick(PodReport::AllSucceeded, &clock);
    assert_eq!(job.status.state(), Some(JobConditionType::Succeeded));
}

#[test]
fn restarts_then_backoff_failure() {
    let mut clock = SimClock::new();
    let policy = RunPolicy {
        backoff_limit: Some(1),
        ..Default::default()
    };
    let mut job = StubReconciler::submit(policy, &clock);

    clock.advance(1);
    job.tick(PodReport::Running, &clock);
    clock.advance(1);
    job.tick(PodReport::ReplicaFailed, &clock);
    assert_eq!(job.status.state(), Some(JobConditionType::Restarting));

    clock.advance(1);
    job.tick(PodReport::Running, &clock);
    clock.advance(1);
    job.tick(PodReport::ReplicaFailed, &clock);

    assert_eq!(job.status.state(), Some(JobConditionType::Failed));
    assert_eq!(job.status.restart_count, 1);
    assert!(job.status.validate_history().is_ok());
}

#[test]
fn cleanup_then_ttl_deletion() {
    let mut clock = SimClock::new();
    let policy = RunPolicy {
        ttl_seconds_after_finished: Some(300),
        clean_pod_policy: CleanPodPolicy::All,
        ..Default::default()
    };
    let mut job = StubReconciler::submit(policy, &clock);

    clock.advance(1);
    job.tick(PodReport::Running, &clock);
    clock.advance(100);
    let directive = job.tick(PodReport::AllSucceeded, &clock);
    assert!(matches!(directive, Directive::Finished { .. }));
    assert_eq!(job.cleaned_pods, Some(CleanPodPolicy::All));
    assert!(!job.deleted);

    clock.advance(299);
    job.tick(PodReport::AllSucceeded, &clock);
    assert!(!job.deleted);

    clock.advance(1);
    job.tick(PodReport::AllSucceeded, &clock);
    assert!(job.deleted);
}

#[test]
fn persisted_status_round_trips_and_still_validates() {
    let mut clock = SimClock::new();
    let mut job = StubReconciler::submit(RunPolicy::default(), &clock);
    clock.advance(2);
    job.tick(PodReport::Running, &clock);

    let json = serde_json::to_string(&job.status).unwrap();
    let restored: TrainingJobStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, job.status);
    assert!(restored.validate_history().is_ok());
    assert_eq!(restored.conditions().len(), 2);
}
