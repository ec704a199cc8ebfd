//! Evaluation pipeline orchestration
//!
//! Drives one job through CLASSIFYING, METRICS, PATTERN_MATCHING and
//! COACHING, holding exclusive ownership of job mutation. Stage components
//! stay stateless; they receive inputs and return outputs, and only the
//! orchestrator touches the job registry or the event bus.
//!
//! Error semantics follow the pipeline taxonomy: malformed input and
//! metrics-fatal conditions fail the job, classification shortfall degrades
//! it to PARTIAL, and coaching trouble is absorbed by the generator's
//! fallback so a running job always terminates with a usable result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lectio_common::events::{EvalEvent, EventBus};

use crate::models::{classified_count, EvaluationJob, JobState, PatternMatch, Segment};
use crate::services::classifier::{resolve_votes, ClassificationEngine};
use crate::services::coaching::CoachingGenerator;
use crate::services::metrics::compute_metrics;
use crate::services::patterns::{match_distribution, PatternLibrary};
use crate::AppState;

pub struct EvaluationOrchestrator {
    jobs: Arc<RwLock<HashMap<Uuid, EvaluationJob>>>,
    cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    event_bus: EventBus,
    engine: ClassificationEngine,
    coaching: CoachingGenerator,
    patterns: Arc<PatternLibrary>,
}

impl EvaluationOrchestrator {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            jobs: Arc::clone(&state.jobs),
            cancellation_tokens: Arc::clone(&state.cancellation_tokens),
            event_bus: state.event_bus.clone(),
            engine: ClassificationEngine::new(
                Arc::clone(&state.classifier),
                Arc::clone(&state.admission),
            ),
            coaching: CoachingGenerator::new(Arc::clone(&state.generator)),
            patterns: Arc::clone(&state.patterns),
        }
    }

    /// Run one submitted job to a terminal state
    ///
    /// Errors are returned only for registry inconsistencies (job missing);
    /// every pipeline-level failure is recorded on the job itself.
    pub async fn run(
        &self,
        job_id: Uuid,
        segments: Vec<Segment>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let result = self.run_pipeline(job_id, segments, cancel).await;
        self.cancellation_tokens.write().await.remove(&job_id);
        result
    }

    async fn run_pipeline(
        &self,
        job_id: Uuid,
        segments: Vec<Segment>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let (context, params) = {
            let jobs = self.jobs.read().await;
            let job = jobs
                .get(&job_id)
                .ok_or_else(|| anyhow::anyhow!("job {} not in registry", job_id))?;
            (job.context.clone(), job.parameters.clone())
        };
        let duration_seconds = context.effective_duration(&segments);
        let total = segments.len();

        if !self.transition(job_id, JobState::Classifying).await {
            return Ok(());
        }

        // Progress consumer: maps finished-segment counts onto the 10..60
        // band and estimates remaining time from the observed rate
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<usize>();
        let progress_task = {
            let jobs = Arc::clone(&self.jobs);
            let event_bus = self.event_bus.clone();
            tokio::spawn(async move {
                let started = std::time::Instant::now();
                while let Some(done) = progress_rx.recv().await {
                    let percentage = if total > 0 {
                        (10 + done * 50 / total).min(60) as u8
                    } else {
                        60
                    };
                    {
                        let mut jobs = jobs.write().await;
                        if let Some(job) = jobs.get_mut(&job_id) {
                            job.set_progress(percentage);
                        }
                    }
                    let elapsed_seconds = started.elapsed().as_secs();
                    let estimated_remaining_seconds = if done > 0 && total > done {
                        let rate = elapsed_seconds as f64 / done as f64;
                        Some(((total - done) as f64 * rate) as u64)
                    } else {
                        None
                    };
                    event_bus.emit_lossy(EvalEvent::ClassificationProgress {
                        job_id,
                        current: done,
                        total,
                        percentage,
                        elapsed_seconds,
                        estimated_remaining_seconds,
                        timestamp: Utc::now(),
                    });
                }
            })
        };

        let classify = self
            .engine
            .classify_segments(&segments, &context, &params, &cancel, progress_tx);
        let gathered = match params.job_timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), classify).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    // Stop detached vote tasks early; their results are moot
                    cancel.cancel();
                    progress_task.abort();
                    self.fail_job(job_id, "classification phase timed out").await;
                    return Ok(());
                }
            },
            None => classify.await,
        };
        let _ = progress_task.await;

        let gathered = match gathered {
            Ok(gathered) => gathered,
            Err(aborted) => {
                self.cancel_job(job_id, aborted.completed).await;
                return Ok(());
            }
        };

        let outcomes = resolve_votes(gathered, &params);
        let classified = classified_count(&outcomes);
        self.with_job(job_id, |job| {
            job.stage_results.classifications = Some(outcomes.clone());
        })
        .await;

        // A cancel request that lands after the last segment finished still
        // wins over advancing to metrics
        if cancel.is_cancelled() {
            self.cancel_job(job_id, classified).await;
            return Ok(());
        }

        if classified == 0 {
            self.fail_job(job_id, "no segment could be classified").await;
            return Ok(());
        }

        let fraction = classified as f64 / total as f64;
        if fraction < params.classified_threshold {
            tracing::warn!(
                %job_id,
                classified,
                total,
                threshold = params.classified_threshold,
                "Classified fraction below threshold; degrading to PARTIAL"
            );
            match compute_metrics(&segments, &outcomes, duration_seconds) {
                Ok(mut report) => {
                    report.incomplete = true;
                    self.with_job(job_id, |job| {
                        job.stage_results.metrics = Some(report.clone());
                    })
                    .await;
                }
                Err(err) => {
                    tracing::warn!(%job_id, error = %err, "No best-effort metrics for PARTIAL job");
                }
            }
            if self.transition(job_id, JobState::Partial).await {
                self.emit_completed(job_id, JobState::Partial, fraction).await;
            }
            return Ok(());
        }

        if !self.transition(job_id, JobState::Metrics).await {
            return Ok(());
        }
        let report = match compute_metrics(&segments, &outcomes, duration_seconds) {
            Ok(report) => report,
            Err(err) => {
                self.fail_job(job_id, &format!("metrics computation failed: {}", err))
                    .await;
                return Ok(());
            }
        };
        self.with_job(job_id, |job| {
            job.stage_results.metrics = Some(report.clone());
        })
        .await;

        if !self.transition(job_id, JobState::PatternMatching).await {
            return Ok(());
        }
        let pattern: PatternMatch =
            match_distribution(&outcomes, &self.patterns, params.min_pattern_segments);
        self.with_job(job_id, |job| {
            job.stage_results.pattern_match = Some(pattern.clone());
        })
        .await;

        if !self.transition(job_id, JobState::Coaching).await {
            return Ok(());
        }
        let feedback = self
            .coaching
            .generate(&outcomes, &report, &pattern, &context)
            .await;
        self.with_job(job_id, |job| {
            job.stage_results.coaching = Some(feedback.clone());
        })
        .await;

        if self.transition(job_id, JobState::Completed).await {
            self.emit_completed(job_id, JobState::Completed, fraction).await;
        }
        Ok(())
    }

    /// Apply a guarded state transition and broadcast it
    ///
    /// An illegal transition is a pipeline bug; the job is force-failed so
    /// it cannot hang in a non-terminal state.
    async fn transition(&self, job_id: Uuid, next: JobState) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&job_id) else {
            tracing::error!(%job_id, "Job missing from registry during transition");
            return false;
        };
        match job.transition_to(next) {
            Ok(transition) => {
                let progress_percent = job.progress_percent;
                drop(jobs);
                tracing::info!(
                    %job_id,
                    old_state = %transition.old_state,
                    new_state = %transition.new_state,
                    "Job state changed"
                );
                self.event_bus.emit_lossy(EvalEvent::JobStateChanged {
                    job_id,
                    old_state: transition.old_state.as_str().to_string(),
                    new_state: transition.new_state.as_str().to_string(),
                    progress_percent,
                    timestamp: transition.transitioned_at,
                });
                true
            }
            Err(err) => {
                tracing::error!(%job_id, error = %err, "Illegal job transition");
                if !job.is_terminal() {
                    job.error = Some(err.to_string());
                    let _ = job.transition_to(JobState::Failed);
                }
                false
            }
        }
    }

    async fn with_job<F: FnOnce(&mut EvaluationJob)>(&self, job_id: Uuid, apply: F) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            apply(job);
        }
    }

    async fn fail_job(&self, job_id: Uuid, message: &str) {
        self.with_job(job_id, |job| {
            job.error = Some(message.to_string());
        })
        .await;
        tracing::error!(%job_id, message, "Evaluation job failed");
        if self.transition(job_id, JobState::Failed).await {
            self.event_bus.emit_lossy(EvalEvent::JobFailed {
                job_id,
                error_message: message.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    async fn cancel_job(&self, job_id: Uuid, segments_classified: usize) {
        tracing::info!(%job_id, segments_classified, "Evaluation job cancelled");
        if self.transition(job_id, JobState::Cancelled).await {
            self.event_bus.emit_lossy(EvalEvent::JobCancelled {
                job_id,
                segments_classified,
                timestamp: Utc::now(),
            });
        }
    }

    async fn emit_completed(&self, job_id: Uuid, state: JobState, classified_fraction: f64) {
        let duration_seconds = {
            let jobs = self.jobs.read().await;
            jobs.get(&job_id).map(|job| job.age_seconds()).unwrap_or(0)
        };
        self.event_bus.emit_lossy(EvalEvent::JobCompleted {
            job_id,
            state: state.as_str().to_string(),
            classified_fraction,
            duration_seconds,
            timestamp: Utc::now(),
        });
    }
}
