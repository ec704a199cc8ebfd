//! Evaluation job API handlers
//!
//! POST /evaluation/start, GET /evaluation/status, GET /evaluation/result,
//! GET /evaluation/summary, POST /evaluation/cancel

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        validate_submission, EvaluationJob, EvaluationParameters, FeedbackProvenance, JobState,
        LessonContext, Metric, MetricStatus, Segment,
    },
    services::orchestrator::EvaluationOrchestrator,
    AppState,
};
use lectio_common::events::EvalEvent;

/// POST /evaluation/start request
#[derive(Debug, Deserialize)]
pub struct StartEvaluationRequest {
    pub segments: Vec<Segment>,
    pub context: LessonContext,
    #[serde(default)]
    pub parameters: EvaluationParameters,
}

/// POST /evaluation/start response
#[derive(Debug, Serialize)]
pub struct StartEvaluationResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// GET /evaluation/status response
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub progress_percent: u8,
    pub segment_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub elapsed_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /evaluation/cancel response
#[derive(Debug, Serialize)]
pub struct CancelEvaluationResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub cancel_requested: bool,
    pub requested_at: chrono::DateTime<chrono::Utc>,
}

/// Condensed metric view for the summary endpoint
#[derive(Debug, Serialize)]
pub struct MetricBrief {
    pub name: String,
    pub raw_value: f64,
    pub normalized_score: f64,
    pub status: MetricStatus,
}

impl From<&Metric> for MetricBrief {
    fn from(metric: &Metric) -> Self {
        Self {
            name: metric.name.clone(),
            raw_value: metric.raw_value,
            normalized_score: metric.normalized_score,
            status: metric.status,
        }
    }
}

/// Condensed pattern view for the summary endpoint
#[derive(Debug, Serialize)]
pub struct PatternBrief {
    pub id: String,
    pub name: String,
    pub similarity: f64,
    pub low_confidence: bool,
}

/// GET /evaluation/summary response
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub overall_score: f64,
    pub incomplete: bool,
    pub classified_count: usize,
    pub total_count: usize,
    pub top_metrics: Vec<MetricBrief>,
    pub bottom_metrics: Vec<MetricBrief>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_pattern: Option<PatternBrief>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strengths: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_actions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_provenance: Option<FeedbackProvenance>,
}

/// POST /evaluation/start
///
/// Accept a transcript for evaluation. Returns the new job ID; the
/// pipeline runs in a background task.
pub async fn start_evaluation(
    State(state): State<AppState>,
    Json(request): Json<StartEvaluationRequest>,
) -> ApiResult<Json<StartEvaluationResponse>> {
    let mut segments = request.segments;
    segments.sort_by_key(|s| s.sequence_index);

    let duration = request.context.effective_duration(&segments);
    validate_submission(&segments, duration)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let segment_count = segments.len();
    let job = EvaluationJob::new(request.context, request.parameters, segment_count);
    let response = StartEvaluationResponse {
        job_id: job.job_id,
        state: job.state,
        created_at: job.created_at,
    };
    let job_id = job.job_id;

    let cancel = CancellationToken::new();
    state.jobs.write().await.insert(job_id, job);
    state
        .cancellation_tokens
        .write()
        .await
        .insert(job_id, cancel.clone());

    state.event_bus.emit_lossy(EvalEvent::JobSubmitted {
        job_id,
        segment_count,
        timestamp: response.created_at,
    });

    tracing::info!(%job_id, segment_count, "Evaluation job accepted");

    let orchestrator = EvaluationOrchestrator::from_state(&state);
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run(job_id, segments, cancel).await {
            tracing::error!(%job_id, error = %e, "Evaluation pipeline task failed");
        }
    });

    Ok(Json(response))
}

/// GET /evaluation/status/{job_id}
///
/// Poll job progress. Returns current state and percentage.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobStatusResponse>> {
    let jobs = state.jobs.read().await;
    let job = jobs
        .get(&job_id)
        .ok_or_else(|| ApiError::NotFound(format!("Evaluation job not found: {}", job_id)))?;

    let elapsed_end = job.ended_at.unwrap_or_else(Utc::now);
    let elapsed_seconds = (elapsed_end - job.created_at).num_seconds().max(0) as u64;

    Ok(Json(JobStatusResponse {
        job_id: job.job_id,
        state: job.state,
        progress_percent: job.progress_percent,
        segment_count: job.segment_count,
        created_at: job.created_at,
        elapsed_seconds,
        ended_at: job.ended_at,
        error: job.error.clone(),
    }))
}

/// GET /evaluation/result/{job_id}
///
/// Full job document including whatever stage results exist so far.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<EvaluationJob>> {
    let jobs = state.jobs.read().await;
    let job = jobs
        .get(&job_id)
        .ok_or_else(|| ApiError::NotFound(format!("Evaluation job not found: {}", job_id)))?;

    Ok(Json(job.clone()))
}

/// GET /evaluation/summary/{job_id}
///
/// Condensed view of a finished evaluation. Returns 409 until metrics
/// exist (the job is still running, or it ended before the metrics stage).
pub async fn get_job_summary(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<SummaryResponse>> {
    let jobs = state.jobs.read().await;
    let job = jobs
        .get(&job_id)
        .ok_or_else(|| ApiError::NotFound(format!("Evaluation job not found: {}", job_id)))?;

    let metrics = job.stage_results.metrics.as_ref().ok_or_else(|| {
        ApiError::Conflict(format!(
            "No metrics available for job in state {}",
            job.state
        ))
    })?;

    // Rank best-first; name breaks score ties so the ordering is stable
    let mut ranked: Vec<&Metric> = metrics.metrics.iter().collect();
    ranked.sort_by(|a, b| {
        b.normalized_score
            .total_cmp(&a.normalized_score)
            .then_with(|| a.name.cmp(&b.name))
    });

    let top_metrics = ranked.iter().take(3).map(|m| MetricBrief::from(*m)).collect();
    let bottom_metrics = ranked
        .iter()
        .rev()
        .take(3)
        .map(|m| MetricBrief::from(*m))
        .collect();

    let best_pattern = job.stage_results.pattern_match.as_ref().map(|pm| PatternBrief {
        id: pm.best_pattern_id.clone(),
        name: pm.best_pattern_name.clone(),
        similarity: pm.best_similarity,
        low_confidence: pm.low_confidence,
    });

    let coaching = job.stage_results.coaching.as_ref();

    Ok(Json(SummaryResponse {
        job_id: job.job_id,
        state: job.state,
        overall_score: metrics.overall.normalized_score,
        incomplete: metrics.incomplete,
        classified_count: metrics.classified_count,
        total_count: metrics.total_count,
        top_metrics,
        bottom_metrics,
        best_pattern,
        strengths: coaching.map(|c| c.strengths.clone()),
        priority_actions: coaching.map(|c| c.priority_actions.clone()),
        feedback_provenance: coaching.map(|c| c.provenance),
    }))
}

/// POST /evaluation/cancel/{job_id}
///
/// Request job cancellation. Only honored while the job is pending or
/// classifying; the actual CANCELLED transition happens asynchronously
/// when the pipeline observes the token.
pub async fn cancel_evaluation(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<CancelEvaluationResponse>> {
    let current_state = {
        let jobs = state.jobs.read().await;
        let job = jobs
            .get(&job_id)
            .ok_or_else(|| ApiError::NotFound(format!("Evaluation job not found: {}", job_id)))?;

        if job.state.is_terminal() {
            return Err(ApiError::BadRequest(format!(
                "Cannot cancel job in terminal state {}",
                job.state
            )));
        }
        if !job.state.can_transition_to(JobState::Cancelled) {
            return Err(ApiError::BadRequest(format!(
                "Job is past the point of cancellation (state {})",
                job.state
            )));
        }
        job.state
    };

    let tokens = state.cancellation_tokens.read().await;
    let token = tokens.get(&job_id).ok_or_else(|| {
        ApiError::BadRequest(format!("Job {} is no longer cancellable", job_id))
    })?;
    token.cancel();

    tracing::info!(%job_id, state = %current_state, "Cancellation requested");

    Ok(Json(CancelEvaluationResponse {
        job_id,
        state: current_state,
        cancel_requested: true,
        requested_at: Utc::now(),
    }))
}

/// Build evaluation workflow routes
pub fn evaluation_routes() -> Router<AppState> {
    Router::new()
        .route("/evaluation/start", post(start_evaluation))
        .route("/evaluation/status/:job_id", get(get_job_status))
        .route("/evaluation/result/:job_id", get(get_job_result))
        .route("/evaluation/summary/:job_id", get(get_job_summary))
        .route("/evaluation/cancel/:job_id", post(cancel_evaluation))
}
