//! Deterministic lesson metrics
//!
//! Pure computation over the classified segment stream: no provider calls,
//! no clock reads, identical input always produces bit-identical output.
//! 15 fixed metrics in four groups (time distribution, context distribution,
//! cognitive complexity, interaction quality) plus a composite overall score.
//!
//! Each metric carries a fixed optimal range and outer bounds. Raw values
//! inside the optimal range score 100; outside, the score falls linearly to
//! 0 at the bound. Status (`low`/`optimal`/`high`) is judged on the raw
//! value against the optimal range so it stays readable regardless of the
//! scaling.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{
    classified_count, CategoryTriple, ContextType, Metric, MetricCategory, MetricStatus,
    MetricsReport, Segment, SegmentOutcome, Stage,
};

/// Shannon entropy ceiling for five context categories, log2(5)
const MAX_CONTEXT_ENTROPY: f64 = 2.321928094887362;

/// Inputs that make every metric undefined
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics require at least one segment")]
    EmptySegmentList,

    #[error("metrics require a positive lesson duration, got {0}")]
    NonPositiveDuration(f64),

    #[error("metrics require at least one classified segment")]
    EmptyClassifiedSet,
}

struct MetricSpec {
    name: &'static str,
    category: MetricCategory,
    optimal: (f64, f64),
    bounds: (f64, f64),
}

const METRIC_SPECS: [MetricSpec; 15] = [
    MetricSpec {
        name: "intro_time_ratio",
        category: MetricCategory::TimeDistribution,
        optimal: (0.10, 0.20),
        bounds: (0.0, 1.0),
    },
    MetricSpec {
        name: "dev_time_ratio",
        category: MetricCategory::TimeDistribution,
        optimal: (0.60, 0.80),
        bounds: (0.0, 1.0),
    },
    MetricSpec {
        name: "closing_time_ratio",
        category: MetricCategory::TimeDistribution,
        optimal: (0.10, 0.20),
        bounds: (0.0, 1.0),
    },
    MetricSpec {
        name: "utterance_density",
        category: MetricCategory::TimeDistribution,
        optimal: (2.0, 4.0),
        bounds: (0.0, 8.0),
    },
    MetricSpec {
        name: "question_ratio",
        category: MetricCategory::ContextDistribution,
        optimal: (0.15, 0.30),
        bounds: (0.0, 1.0),
    },
    MetricSpec {
        name: "explanation_ratio",
        category: MetricCategory::ContextDistribution,
        optimal: (0.30, 0.50),
        bounds: (0.0, 1.0),
    },
    MetricSpec {
        name: "feedback_ratio",
        category: MetricCategory::ContextDistribution,
        optimal: (0.10, 0.25),
        bounds: (0.0, 1.0),
    },
    MetricSpec {
        name: "context_diversity",
        category: MetricCategory::ContextDistribution,
        optimal: (1.2, 2.0),
        bounds: (0.0, MAX_CONTEXT_ENTROPY),
    },
    MetricSpec {
        name: "avg_cognitive_level",
        category: MetricCategory::CognitiveComplexity,
        optimal: (1.8, 2.5),
        bounds: (1.0, 5.0),
    },
    MetricSpec {
        name: "higher_order_ratio",
        category: MetricCategory::CognitiveComplexity,
        optimal: (0.40, 0.70),
        bounds: (0.0, 1.0),
    },
    MetricSpec {
        name: "cognitive_progression",
        category: MetricCategory::CognitiveComplexity,
        optimal: (0.3, 0.8),
        bounds: (0.0, 2.0),
    },
    MetricSpec {
        name: "extended_dialogue_ratio",
        category: MetricCategory::InteractionQuality,
        optimal: (0.20, 0.40),
        bounds: (0.0, 1.0),
    },
    MetricSpec {
        name: "avg_wait_time",
        category: MetricCategory::InteractionQuality,
        optimal: (3.0, 8.0),
        bounds: (0.0, 20.0),
    },
    MetricSpec {
        name: "irf_pattern_ratio",
        category: MetricCategory::InteractionQuality,
        optimal: (0.15, 0.35),
        bounds: (0.0, 1.0),
    },
    MetricSpec {
        name: "dev_question_depth",
        category: MetricCategory::CognitiveComplexity,
        optimal: (0.50, 0.80),
        bounds: (0.0, 1.0),
    },
];

const OVERALL_OPTIMAL: (f64, f64) = (70.0, 100.0);

/// One classified segment with its timestamp, in sequence order
struct Classified {
    timestamp: f64,
    triple: CategoryTriple,
}

fn classified_view(segments: &[Segment], outcomes: &[SegmentOutcome]) -> Vec<Classified> {
    let by_id: HashMap<Uuid, &Segment> = segments.iter().map(|s| (s.id, s)).collect();
    let mut view: Vec<(usize, Classified)> = outcomes
        .iter()
        .filter_map(|outcome| outcome.classification())
        .filter_map(|c| {
            by_id.get(&c.segment_id).map(|segment| {
                (
                    segment.sequence_index,
                    Classified {
                        timestamp: segment.timestamp,
                        triple: c.triple,
                    },
                )
            })
        })
        .collect();
    view.sort_by_key(|(sequence_index, _)| *sequence_index);
    view.into_iter().map(|(_, classified)| classified).collect()
}

/// Compute all 15 metrics plus the composite score
///
/// `outcomes` is the full classification result; unclassified segments are
/// excluded from category-dependent metrics but still count where only the
/// segment count matters (utterance density). The report's `incomplete`
/// flag is left false; the orchestrator sets it for below-threshold jobs.
pub fn compute_metrics(
    segments: &[Segment],
    outcomes: &[SegmentOutcome],
    duration_seconds: f64,
) -> Result<MetricsReport, MetricsError> {
    if segments.is_empty() {
        return Err(MetricsError::EmptySegmentList);
    }
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(MetricsError::NonPositiveDuration(duration_seconds));
    }
    let classified = classified_view(segments, outcomes);
    if classified.is_empty() {
        return Err(MetricsError::EmptyClassifiedSet);
    }

    let raw_values = [
        stage_time_ratio(&classified, Stage::Intro, duration_seconds),
        stage_time_ratio(&classified, Stage::Development, duration_seconds),
        stage_time_ratio(&classified, Stage::Closing, duration_seconds),
        segments.len() as f64 / (duration_seconds / 60.0),
        context_ratio(&classified, ContextType::Question),
        context_ratio(&classified, ContextType::Explanation),
        context_ratio(&classified, ContextType::Feedback),
        context_entropy(&classified),
        avg_cognitive_level(&classified),
        higher_order_ratio(&classified),
        cognitive_progression(&classified),
        extended_dialogue_ratio(&classified),
        avg_wait_time(&classified),
        irf_pattern_ratio(&classified),
        dev_question_depth(&classified),
    ];

    let metrics: Vec<Metric> = METRIC_SPECS
        .iter()
        .zip(raw_values)
        .map(|(spec, raw_value)| {
            let (normalized_score, status) = normalize(spec, raw_value);
            Metric {
                name: spec.name.to_string(),
                category: spec.category,
                raw_value,
                normalized_score,
                status,
            }
        })
        .collect();

    let mean_score =
        metrics.iter().map(|m| m.normalized_score).sum::<f64>() / metrics.len() as f64;
    let overall_status = if mean_score < OVERALL_OPTIMAL.0 {
        MetricStatus::Low
    } else {
        MetricStatus::Optimal
    };
    let overall = Metric {
        name: "overall_score".to_string(),
        category: MetricCategory::Composite,
        raw_value: mean_score,
        normalized_score: mean_score,
        status: overall_status,
    };

    Ok(MetricsReport {
        metrics,
        overall,
        classified_count: classified_count(outcomes),
        total_count: segments.len(),
        incomplete: false,
    })
}

/// Score a raw value against its spec
///
/// Inside the optimal range scores 100; outside, the score drops linearly
/// and reaches 0 at the outer bound. Status always follows the raw value.
fn normalize(spec: &MetricSpec, raw: f64) -> (f64, MetricStatus) {
    let (optimal_lo, optimal_hi) = spec.optimal;
    let (min, max) = spec.bounds;
    if raw < optimal_lo {
        let span = optimal_lo - min;
        let score = if span > 0.0 {
            100.0 * ((raw - min) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (score, MetricStatus::Low)
    } else if raw > optimal_hi {
        let span = max - optimal_hi;
        let score = if span > 0.0 {
            100.0 * ((max - raw) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (score, MetricStatus::High)
    } else {
        (100.0, MetricStatus::Optimal)
    }
}

/// Time share of one stage: span from first to last classified timestamp
/// carrying that stage, divided by the lesson duration
fn stage_time_ratio(classified: &[Classified], stage: Stage, duration_seconds: f64) -> f64 {
    let mut first: Option<f64> = None;
    let mut last: Option<f64> = None;
    for item in classified {
        if item.triple.stage == stage {
            first = Some(first.map_or(item.timestamp, |f: f64| f.min(item.timestamp)));
            last = Some(last.map_or(item.timestamp, |l: f64| l.max(item.timestamp)));
        }
    }
    match (first, last) {
        (Some(first), Some(last)) => (last - first) / duration_seconds,
        _ => 0.0,
    }
}

fn context_ratio(classified: &[Classified], context: ContextType) -> f64 {
    let hits = classified
        .iter()
        .filter(|c| c.triple.context == context)
        .count();
    hits as f64 / classified.len() as f64
}

/// Shannon entropy (bits) over the five context categories
fn context_entropy(classified: &[Classified]) -> f64 {
    let total = classified.len() as f64;
    ContextType::ALL
        .iter()
        .map(|context| {
            let count = classified
                .iter()
                .filter(|c| c.triple.context == *context)
                .count();
            if count == 0 {
                0.0
            } else {
                let p = count as f64 / total;
                -p * p.log2()
            }
        })
        .sum()
}

fn avg_cognitive_level(classified: &[Classified]) -> f64 {
    let sum: f64 = classified
        .iter()
        .map(|c| c.triple.level.value() as f64)
        .sum();
    sum / classified.len() as f64
}

/// Share of segments at L2 or above
fn higher_order_ratio(classified: &[Classified]) -> f64 {
    let hits = classified
        .iter()
        .filter(|c| c.triple.level.value() >= 2)
        .count();
    hits as f64 / classified.len() as f64
}

/// (L3+ share in closing) / (L3+ share in intro), capped at 2.0
///
/// Both stages empty of deep segments scores 0.0; deep closing work over an
/// intro with none scores the cap.
fn cognitive_progression(classified: &[Classified]) -> f64 {
    let deep_share = |stage: Stage| -> f64 {
        let in_stage: Vec<&Classified> = classified
            .iter()
            .filter(|c| c.triple.stage == stage)
            .collect();
        if in_stage.is_empty() {
            return 0.0;
        }
        let deep = in_stage
            .iter()
            .filter(|c| c.triple.level.value() >= 3)
            .count();
        deep as f64 / in_stage.len() as f64
    };

    let intro = deep_share(Stage::Intro);
    let closing = deep_share(Stage::Closing);
    if intro > 0.0 {
        (closing / intro).min(2.0)
    } else if closing > 0.0 {
        2.0
    } else {
        0.0
    }
}

/// Share of classified segments inside question/feedback runs of length >= 3
fn extended_dialogue_ratio(classified: &[Classified]) -> f64 {
    let mut members = 0usize;
    let mut run = 0usize;
    for item in classified {
        let dialogic = matches!(
            item.triple.context,
            ContextType::Question | ContextType::Feedback
        );
        if dialogic {
            run += 1;
        } else {
            if run >= 3 {
                members += run;
            }
            run = 0;
        }
    }
    if run >= 3 {
        members += run;
    }
    members as f64 / classified.len() as f64
}

/// Median gap from a question to the next feedback, seconds
///
/// A question with no feedback before the next question is abandoned; the
/// newer question becomes the pending one. No completed pairs scores 0.0.
fn avg_wait_time(classified: &[Classified]) -> f64 {
    let mut pending: Option<f64> = None;
    let mut gaps: Vec<f64> = Vec::new();
    for item in classified {
        match item.triple.context {
            ContextType::Question => pending = Some(item.timestamp),
            ContextType::Feedback => {
                if let Some(asked_at) = pending.take() {
                    gaps.push((item.timestamp - asked_at).max(0.0));
                }
            }
            _ => {}
        }
    }
    if gaps.is_empty() {
        return 0.0;
    }
    gaps.sort_by(|a, b| a.total_cmp(b));
    let mid = gaps.len() / 2;
    if gaps.len() % 2 == 1 {
        gaps[mid]
    } else {
        (gaps[mid - 1] + gaps[mid]) / 2.0
    }
}

/// Share of 3-windows forming an Initiation-Response-Feedback shape:
/// question, then a non-question non-feedback turn, then feedback
fn irf_pattern_ratio(classified: &[Classified]) -> f64 {
    if classified.len() < 3 {
        return 0.0;
    }
    let windows = classified.len() - 2;
    let hits = classified
        .windows(3)
        .filter(|w| {
            w[0].triple.context == ContextType::Question
                && !matches!(
                    w[1].triple.context,
                    ContextType::Question | ContextType::Feedback
                )
                && w[2].triple.context == ContextType::Feedback
        })
        .count();
    hits as f64 / windows as f64
}

/// L2+ share of development-stage questions; 0.0 when there are none
fn dev_question_depth(classified: &[Classified]) -> f64 {
    let dev_questions: Vec<&Classified> = classified
        .iter()
        .filter(|c| {
            c.triple.stage == Stage::Development && c.triple.context == ContextType::Question
        })
        .collect();
    if dev_questions.is_empty() {
        return 0.0;
    }
    let deep = dev_questions
        .iter()
        .filter(|c| c.triple.level.value() >= 2)
        .count();
    deep as f64 / dev_questions.len() as f64
}
