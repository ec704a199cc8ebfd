//! Vote tallying and call-retry primitives
//!
//! `majority_vote` is pure and generic so the consensus rule can be tested
//! without any provider plumbing; `retry_with_backoff` wraps one fallible
//! call with a bounded exponential backoff.

use std::future::Future;
use std::time::Duration;

/// Which of two tied candidates to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiePreference {
    First,
    Second,
}

/// Result of tallying one segment's votes
#[derive(Debug, Clone, PartialEq)]
pub struct VoteOutcome<T> {
    pub winner: T,
    /// Votes cast for the winner
    pub agreeing: usize,
    /// Winner was chosen by the tie-break rule rather than a unique plurality
    pub tie_broken: bool,
}

/// Tally votes and pick a winner
///
/// - A unique plurality wins outright.
/// - Exactly two candidates tied for the plurality are resolved by
///   `tie_break`, called with the candidates in first-seen order.
/// - Three or more tied candidates (or an empty vote list) produce no
///   winner; the caller marks the segment unclassified.
pub fn majority_vote<T, F>(votes: &[T], tie_break: F) -> Option<VoteOutcome<T>>
where
    T: Clone + PartialEq,
    F: FnOnce(&T, &T) -> TiePreference,
{
    if votes.is_empty() {
        return None;
    }

    // Tally in first-seen order so tie-break candidate order is deterministic
    let mut tally: Vec<(T, usize)> = Vec::new();
    for vote in votes {
        match tally.iter_mut().find(|(candidate, _)| candidate == vote) {
            Some((_, count)) => *count += 1,
            None => tally.push((vote.clone(), 1)),
        }
    }

    let top = tally.iter().map(|(_, count)| *count).max()?;
    let leaders: Vec<&T> = tally
        .iter()
        .filter(|(_, count)| *count == top)
        .map(|(candidate, _)| candidate)
        .collect();

    match leaders.as_slice() {
        [only] => Some(VoteOutcome {
            winner: (*only).clone(),
            agreeing: top,
            tie_broken: false,
        }),
        [first, second] => {
            let winner = match tie_break(first, second) {
                TiePreference::First => (*first).clone(),
                TiePreference::Second => (*second).clone(),
            };
            Some(VoteOutcome {
                winner,
                agreeing: top,
                tie_broken: true,
            })
        }
        _ => None,
    }
}

/// Run `operation` up to `retries + 1` times with doubling backoff
///
/// Log level escalates from WARN on retried attempts to ERROR when the
/// attempts are exhausted; the final error is returned unchanged.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation_name: &str,
    retries: u32,
    initial_delay: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 0;
    let mut delay = initial_delay;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt > retries {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Operation failed, retries exhausted"
                    );
                    return Err(err);
                }
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Operation failed, will retry after backoff"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }
    }
}
