//! Job State Machine Integration Tests
//! Test File: job_state_tests.rs
//!
//! Exhaustive coverage of the evaluation job lifecycle: the transition
//! matrix, progress milestones, and terminal bookkeeping.

use std::collections::HashSet;

use lectio_eval::models::{EvaluationJob, JobState, JobStateError};

mod helpers;
use helpers::{fast_parameters, lesson_context};

fn new_job() -> EvaluationJob {
    EvaluationJob::new(lesson_context(), fast_parameters(), 10)
}

fn drive(job: &mut EvaluationJob, path: &[JobState]) {
    for &state in path {
        job.transition_to(state)
            .unwrap_or_else(|e| panic!("transition failed: {}", e));
    }
}

/// TC-STATE-001: Happy path walks every stage and lands at COMPLETED
/// **Type:** Unit Test | **Priority:** P0
#[test]
fn tc_state_001_happy_path_reaches_completed() {
    // Given: a freshly submitted job
    let mut job = new_job();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.progress_percent, 0);

    // When: the pipeline advances through every stage
    // Then: each entry raises progress to the stage milestone
    job.transition_to(JobState::Classifying).unwrap();
    assert_eq!(job.progress_percent, 10);
    job.transition_to(JobState::Metrics).unwrap();
    assert_eq!(job.progress_percent, 60);
    job.transition_to(JobState::PatternMatching).unwrap();
    assert_eq!(job.progress_percent, 75);
    job.transition_to(JobState::Coaching).unwrap();
    assert_eq!(job.progress_percent, 90);
    job.transition_to(JobState::Completed).unwrap();
    assert_eq!(job.progress_percent, 100);
    assert!(job.is_terminal());
}

/// TC-STATE-002: Transition matrix admits exactly the designed pairs
/// **Type:** Unit Test | **Priority:** P0
#[test]
fn tc_state_002_transition_matrix_is_exact() {
    use JobState::*;

    // Given: the full set of legal transitions
    let allowed: HashSet<(JobState, JobState)> = [
        (Pending, Classifying),
        (Classifying, Metrics),
        (Classifying, Partial),
        (Metrics, PatternMatching),
        (PatternMatching, Coaching),
        (Coaching, Completed),
        (Pending, Cancelled),
        (Classifying, Cancelled),
        (Pending, Failed),
        (Classifying, Failed),
        (Metrics, Failed),
        (PatternMatching, Failed),
        (Coaching, Failed),
    ]
    .into_iter()
    .collect();

    // When: every (from, to) pair is checked
    // Then: only the designed pairs are admitted
    for &from in JobState::ALL.iter() {
        for &to in JobState::ALL.iter() {
            assert_eq!(
                from.can_transition_to(to),
                allowed.contains(&(from, to)),
                "unexpected verdict for {} -> {}",
                from,
                to
            );
        }
    }
}

/// TC-STATE-003: Terminal states admit no further transitions
/// **Type:** Unit Test | **Priority:** P0
#[test]
fn tc_state_003_terminal_states_are_absorbing() {
    let terminals = [
        JobState::Completed,
        JobState::Partial,
        JobState::Failed,
        JobState::Cancelled,
    ];

    for &terminal in terminals.iter() {
        assert!(terminal.is_terminal());
        for &to in JobState::ALL.iter() {
            assert!(
                !terminal.can_transition_to(to),
                "{} must not transition to {}",
                terminal,
                to
            );
        }
    }
}

/// TC-STATE-004: Illegal transition is rejected and leaves state intact
/// **Type:** Unit Test | **Priority:** P0
#[test]
fn tc_state_004_illegal_transition_rejected() {
    // Given: a pending job
    let mut job = new_job();

    // When: the pipeline tries to skip straight to metrics
    let err = job.transition_to(JobState::Metrics).unwrap_err();

    // Then: the error names both states and nothing changed
    assert!(matches!(
        err,
        JobStateError::IllegalTransition {
            from: JobState::Pending,
            to: JobState::Metrics
        }
    ));
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.progress_percent, 0);
    assert!(job.ended_at.is_none());
}

/// TC-STATE-005: ended_at is stamped exactly on terminal entry
/// **Type:** Unit Test | **Priority:** P1
#[test]
fn tc_state_005_ended_at_stamped_on_terminal_entry() {
    // COMPLETED
    let mut job = new_job();
    drive(
        &mut job,
        &[
            JobState::Classifying,
            JobState::Metrics,
            JobState::PatternMatching,
            JobState::Coaching,
        ],
    );
    assert!(job.ended_at.is_none(), "running job must not carry ended_at");
    job.transition_to(JobState::Completed).unwrap();
    assert!(job.ended_at.is_some());

    // PARTIAL straight out of classification
    let mut job = new_job();
    drive(&mut job, &[JobState::Classifying, JobState::Partial]);
    assert!(job.ended_at.is_some());
    assert_eq!(job.progress_percent, 100);

    // CANCELLED during classification
    let mut job = new_job();
    drive(&mut job, &[JobState::Classifying, JobState::Cancelled]);
    assert!(job.ended_at.is_some());

    // FAILED mid-pipeline
    let mut job = new_job();
    drive(
        &mut job,
        &[JobState::Classifying, JobState::Metrics, JobState::Failed],
    );
    assert!(job.ended_at.is_some());
}

/// TC-STATE-006: Progress is monotonic and capped at 100
/// **Type:** Unit Test | **Priority:** P1
#[test]
fn tc_state_006_progress_monotonic() {
    let mut job = new_job();
    job.transition_to(JobState::Classifying).unwrap();

    // Mid-stage updates move forward only
    job.set_progress(42);
    assert_eq!(job.progress_percent, 42);
    job.set_progress(30);
    assert_eq!(job.progress_percent, 42, "progress must not move backward");

    // A milestone below current progress is ignored
    job.set_progress(65);
    job.transition_to(JobState::Metrics).unwrap();
    assert_eq!(job.progress_percent, 65);

    // Values above 100 are capped
    job.set_progress(200);
    assert_eq!(job.progress_percent, 100);
}

/// TC-STATE-007: Failure and cancellation keep the last progress value
/// **Type:** Unit Test | **Priority:** P2
#[test]
fn tc_state_007_failure_keeps_progress() {
    let mut job = new_job();
    job.transition_to(JobState::Classifying).unwrap();
    job.set_progress(35);

    job.transition_to(JobState::Failed).unwrap();
    assert_eq!(job.progress_percent, 35);

    let mut job = new_job();
    job.transition_to(JobState::Classifying).unwrap();
    job.set_progress(25);
    job.transition_to(JobState::Cancelled).unwrap();
    assert_eq!(job.progress_percent, 25);
}

/// TC-STATE-008: Transition record carries both endpoints
/// **Type:** Unit Test | **Priority:** P2
#[test]
fn tc_state_008_transition_record() {
    let mut job = new_job();
    let record = job.transition_to(JobState::Classifying).unwrap();

    assert_eq!(record.job_id, job.job_id);
    assert_eq!(record.old_state, JobState::Pending);
    assert_eq!(record.new_state, JobState::Classifying);
}

/// TC-STATE-009: State serializes as SCREAMING_SNAKE_CASE
/// **Type:** Unit Test | **Priority:** P2
#[test]
fn tc_state_009_state_serialization() {
    let json = serde_json::to_string(&JobState::PatternMatching).unwrap();
    assert_eq!(json, "\"PATTERN_MATCHING\"");

    let parsed: JobState = serde_json::from_str("\"CANCELLED\"").unwrap();
    assert_eq!(parsed, JobState::Cancelled);
}
