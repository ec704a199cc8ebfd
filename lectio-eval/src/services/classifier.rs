//! Classification engine: parallel voted classification of segments
//!
//! Each segment receives `vote_count` independent classification calls; the
//! votes are tallied by `resolve_votes` into a firm category or an
//! unclassified marker. Calls are bounded two ways: a per-job limit
//! (`max_concurrent_calls`) and a process-wide admission gate shared across
//! jobs, both acquired before every provider call.
//!
//! Cancellation is cooperative at segment granularity: in-flight calls run
//! to completion but their results are discarded, and segments not yet
//! started abstain immediately.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{
    CategoryTriple, Classification, EvaluationParameters, LessonContext, Segment, SegmentOutcome,
    UnclassifiedReason,
};
use crate::providers::{ProviderError, SegmentClassifier};
use crate::services::voting::{majority_vote, retry_with_backoff, TiePreference};

/// First retry waits this long; subsequent waits double
const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(200);

/// Raw ballot box for one segment
#[derive(Debug, Clone)]
pub struct SegmentVotes {
    pub segment_id: Uuid,
    pub sequence_index: usize,
    /// Successful votes, in ballot order
    pub votes: Vec<CategoryTriple>,
    /// Vote calls that exhausted their retries
    pub abstentions: usize,
}

/// Classification phase was cancelled before every segment finished
#[derive(Debug, thiserror::Error)]
#[error("classification cancelled after {completed} segments")]
pub struct ClassifyAborted {
    pub completed: usize,
}

pub struct ClassificationEngine {
    classifier: Arc<dyn SegmentClassifier>,
    /// Process-wide admission gate, shared with every other job
    admission: Arc<Semaphore>,
}

impl ClassificationEngine {
    pub fn new(classifier: Arc<dyn SegmentClassifier>, admission: Arc<Semaphore>) -> Self {
        Self {
            classifier,
            admission,
        }
    }

    /// Cast votes for every segment, in parallel
    ///
    /// Sends the running count of finished segments on `progress` after each
    /// completion. Returns the gathered ballots, or `ClassifyAborted` if
    /// `cancel` fired first; spawned vote tasks are left to finish detached
    /// and their results are discarded.
    pub async fn classify_segments(
        &self,
        segments: &[Segment],
        context: &LessonContext,
        params: &EvaluationParameters,
        cancel: &CancellationToken,
        progress: mpsc::UnboundedSender<usize>,
    ) -> Result<Vec<SegmentVotes>, ClassifyAborted> {
        let job_limit = Arc::new(Semaphore::new(params.max_concurrent_calls.max(1)));
        let vote_count = params.vote_count;

        let mut handles = Vec::with_capacity(segments.len());
        for segment in segments {
            let classifier = Arc::clone(&self.classifier);
            let admission = Arc::clone(&self.admission);
            let job_limit = Arc::clone(&job_limit);
            let segment = segment.clone();
            let context = context.clone();
            let cancel = cancel.clone();
            let vote_retries = params.vote_retries;
            let call_timeout = Duration::from_secs(params.call_timeout_secs);

            let meta = (segment.id, segment.sequence_index);
            let handle = tokio::spawn(async move {
                if cancel.is_cancelled() {
                    // Votes never started; the record is discarded anyway
                    return SegmentVotes {
                        segment_id: segment.id,
                        sequence_index: segment.sequence_index,
                        votes: Vec::new(),
                        abstentions: vote_count,
                    };
                }
                cast_votes(
                    classifier,
                    admission,
                    job_limit,
                    segment,
                    context,
                    vote_count,
                    vote_retries,
                    call_timeout,
                )
                .await
            });
            handles.push((handle, meta));
        }

        let mut gathered = Vec::with_capacity(handles.len());
        let mut completed = 0usize;
        for (mut handle, (segment_id, sequence_index)) in handles {
            let record = tokio::select! {
                // Cancellation wins over an already-joined task
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(completed, "Classification cancelled; discarding in-flight results");
                    return Err(ClassifyAborted { completed });
                }
                joined = &mut handle => match joined {
                    Ok(record) => record,
                    Err(err) => {
                        tracing::warn!(
                            %segment_id,
                            error = %err,
                            "Segment vote task failed to join; counting full abstention"
                        );
                        SegmentVotes {
                            segment_id,
                            sequence_index,
                            votes: Vec::new(),
                            abstentions: vote_count,
                        }
                    }
                }
            };
            gathered.push(record);
            completed += 1;
            let _ = progress.send(completed);
        }

        Ok(gathered)
    }
}

/// Cast `vote_count` concurrent votes for one segment
#[allow(clippy::too_many_arguments)]
async fn cast_votes(
    classifier: Arc<dyn SegmentClassifier>,
    admission: Arc<Semaphore>,
    job_limit: Arc<Semaphore>,
    segment: Segment,
    context: LessonContext,
    vote_count: usize,
    vote_retries: u32,
    call_timeout: Duration,
) -> SegmentVotes {
    let mut ballots = Vec::with_capacity(vote_count);
    for ballot in 0..vote_count {
        ballots.push(cast_one_vote(
            Arc::clone(&classifier),
            Arc::clone(&admission),
            Arc::clone(&job_limit),
            &segment,
            &context,
            ballot,
            vote_retries,
            call_timeout,
        ));
    }

    let results = join_all(ballots).await;
    let votes: Vec<CategoryTriple> = results.into_iter().flatten().collect();
    let abstentions = vote_count - votes.len();
    if abstentions > 0 {
        tracing::debug!(
            segment_id = %segment.id,
            sequence_index = segment.sequence_index,
            abstentions,
            "Segment ballots include abstentions"
        );
    }

    SegmentVotes {
        segment_id: segment.id,
        sequence_index: segment.sequence_index,
        votes,
        abstentions,
    }
}

/// One vote call with retries; None when the retries are exhausted
#[allow(clippy::too_many_arguments)]
async fn cast_one_vote(
    classifier: Arc<dyn SegmentClassifier>,
    admission: Arc<Semaphore>,
    job_limit: Arc<Semaphore>,
    segment: &Segment,
    context: &LessonContext,
    ballot: usize,
    vote_retries: u32,
    call_timeout: Duration,
) -> Option<CategoryTriple> {
    let operation = format!(
        "classify segment {} ballot {}",
        segment.sequence_index,
        ballot + 1
    );
    let result = retry_with_backoff(&operation, vote_retries, RETRY_INITIAL_DELAY, || {
        let classifier = Arc::clone(&classifier);
        let admission = Arc::clone(&admission);
        let job_limit = Arc::clone(&job_limit);
        let text = segment.text.clone();
        let context = context.clone();
        async move {
            // Job-level bound first, then the shared admission gate; both
            // permits are held for the duration of the call
            let _job_permit = job_limit
                .acquire()
                .await
                .map_err(|_| ProviderError::Request("job concurrency limit closed".to_string()))?;
            let _gate_permit = admission
                .acquire()
                .await
                .map_err(|_| ProviderError::Request("admission gate closed".to_string()))?;
            match tokio::time::timeout(call_timeout, classifier.classify_segment(&text, &context))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout),
            }
        }
    })
    .await;

    match result {
        Ok(triple) => Some(triple),
        Err(err) => {
            tracing::warn!(
                segment_id = %segment.id,
                ballot = ballot + 1,
                error = %err,
                "Vote abstained after exhausting retries"
            );
            None
        }
    }
}

/// Component-wise mode of the triples resolved so far
fn running_mode(resolved: &[CategoryTriple]) -> Option<CategoryTriple> {
    fn mode_of<T: Copy + PartialEq>(items: impl Iterator<Item = T>) -> Option<T> {
        let mut tally: Vec<(T, usize)> = Vec::new();
        for item in items {
            match tally.iter_mut().find(|(value, _)| *value == item) {
                Some((_, count)) => *count += 1,
                None => tally.push((item, 1)),
            }
        }
        // First-seen wins on equal counts
        let mut best: Option<(T, usize)> = None;
        for (value, count) in tally {
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((value, count)),
            }
        }
        best.map(|(value, _)| value)
    }

    Some(CategoryTriple::new(
        mode_of(resolved.iter().map(|t| t.stage))?,
        mode_of(resolved.iter().map(|t| t.context))?,
        mode_of(resolved.iter().map(|t| t.level))?,
    ))
}

/// Prefer the tied candidate nearer the running mode; first-listed otherwise
fn tie_preference(
    first: &CategoryTriple,
    second: &CategoryTriple,
    mode: Option<CategoryTriple>,
) -> TiePreference {
    match mode {
        Some(mode) if second.component_distance(mode) < first.component_distance(mode) => {
            TiePreference::Second
        }
        _ => TiePreference::First,
    }
}

/// Tally gathered ballots into per-segment outcomes, in sequence order
///
/// Pure: no provider access, deterministic for a given ballot set. A
/// segment whose abstentions exceed `vote_count - majority_threshold` can
/// no longer reach a majority and is marked unclassified without tallying.
pub fn resolve_votes(
    mut gathered: Vec<SegmentVotes>,
    params: &EvaluationParameters,
) -> Vec<SegmentOutcome> {
    gathered.sort_by_key(|record| record.sequence_index);
    let allowed_abstentions = params.vote_count.saturating_sub(params.majority_threshold());

    let mut outcomes = Vec::with_capacity(gathered.len());
    let mut resolved: Vec<CategoryTriple> = Vec::new();

    for record in gathered {
        if record.abstentions > allowed_abstentions {
            tracing::warn!(
                segment_id = %record.segment_id,
                abstentions = record.abstentions,
                "Segment unclassified: too many abstentions"
            );
            outcomes.push(SegmentOutcome::Unclassified {
                segment_id: record.segment_id,
                reason: UnclassifiedReason::TooManyAbstentions,
            });
            continue;
        }

        let mode = running_mode(&resolved);
        match majority_vote(&record.votes, |first, second| {
            tie_preference(first, second, mode)
        }) {
            Some(outcome) => {
                if outcome.tie_broken {
                    tracing::warn!(
                        segment_id = %record.segment_id,
                        winner = %outcome.winner,
                        "Vote tie resolved toward the running mode"
                    );
                }
                resolved.push(outcome.winner);
                outcomes.push(SegmentOutcome::Classified(Classification {
                    segment_id: record.segment_id,
                    triple: outcome.winner,
                    confidence: outcome.agreeing as f64 / params.vote_count as f64,
                }));
            }
            None => {
                tracing::warn!(
                    segment_id = %record.segment_id,
                    "Segment unclassified: no vote majority"
                );
                outcomes.push(SegmentOutcome::Unclassified {
                    segment_id: record.segment_id,
                    reason: UnclassifiedReason::NoMajority,
                });
            }
        }
    }

    outcomes
}
