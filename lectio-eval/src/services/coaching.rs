//! Coaching feedback generation
//!
//! Builds a structured prompt from the pipeline outputs, asks the text
//! generator for a JSON document, and accepts it only if it passes schema
//! validation. One retry is made with a violation-annotated prompt; after
//! a second failure the generator synthesizes a deterministic document from
//! the metric statuses instead. Generation therefore never fails a job, and
//! the provenance field records which path produced the result.

use std::sync::Arc;

use crate::models::{
    classified_count, CoachingFeedback, FeedbackProvenance, LessonContext, Metric, MetricStatus,
    MetricsReport, PatternMatch, SegmentOutcome,
};
use crate::providers::{extract_json_object, TextGenerator};
use crate::services::schema::{SchemaViolation, V1};

pub struct CoachingGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl CoachingGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Produce coaching feedback; infallible by design
    pub async fn generate(
        &self,
        outcomes: &[SegmentOutcome],
        metrics: &MetricsReport,
        pattern: &PatternMatch,
        context: &LessonContext,
    ) -> CoachingFeedback {
        let system = system_prompt(context);
        let user = build_prompt(outcomes, metrics, pattern, context);

        let first_failure = match self.attempt(&system, &user).await {
            Ok(feedback) => return feedback,
            Err(reason) => reason,
        };
        tracing::warn!(reason = %first_failure, "Feedback generation rejected; retrying with annotated prompt");

        let retry_user = annotated_prompt(&user, &first_failure);
        match self.attempt(&system, &retry_user).await {
            Ok(feedback) => feedback,
            Err(reason) => {
                tracing::warn!(
                    reason = %reason,
                    "Feedback generation rejected twice; synthesizing from metrics"
                );
                fallback_from_metrics(metrics, pattern)
            }
        }
    }

    /// One generation call, accepted only on a clean schema pass
    async fn attempt(&self, system: &str, user: &str) -> Result<CoachingFeedback, String> {
        let reply = self
            .generator
            .generate_json(system, user)
            .await
            .map_err(|e| format!("generation call failed: {}", e))?;
        let value = extract_json_object(&reply)
            .ok_or_else(|| "reply contained no JSON object".to_string())?;
        let violations = V1.validate(&value);
        if !violations.is_empty() {
            return Err(describe_violations(&violations));
        }
        CoachingFeedback::from_validated(&value, FeedbackProvenance::Generated)
            .map_err(|e| format!("validated document failed to deserialize: {}", e))
    }
}

fn system_prompt(context: &LessonContext) -> String {
    format!(
        "You are an experienced instructional coach writing feedback for a teacher.\n\
         Write in language \"{}\". Ground every statement in the evaluation data you are given.\n\
         Reply with ONLY one JSON object, no prose around it.",
        context.language
    )
}

/// Pure prompt assembly from the pipeline outputs
fn build_prompt(
    outcomes: &[SegmentOutcome],
    metrics: &MetricsReport,
    pattern: &PatternMatch,
    context: &LessonContext,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Lesson: subject \"{}\", grade \"{}\".\n",
        context.subject, context.grade
    ));
    prompt.push_str(&format!(
        "Segments: {} classified of {} total.\n\n",
        classified_count(outcomes),
        outcomes.len()
    ));

    prompt.push_str("Metrics (value, status):\n");
    for metric in &metrics.metrics {
        prompt.push_str(&format!(
            "- {}: {:.2} ({})\n",
            metric.name,
            metric.raw_value,
            status_word(metric.status)
        ));
    }
    prompt.push_str(&format!(
        "- overall_score: {:.1}\n\n",
        metrics.overall.raw_value
    ));

    prompt.push_str(&format!(
        "Closest teaching pattern: \"{}\" (cosine similarity {:.2}{}).\n\n",
        pattern.best_pattern_name,
        pattern.best_similarity,
        if pattern.low_confidence {
            ", low confidence"
        } else {
            ""
        }
    ));

    prompt.push_str(
        "Produce a JSON object with exactly these keys:\n\
         - \"overall_assessment\": string\n\
         - \"strengths\": array of 2 to 4 strings\n\
         - \"growth_areas\": array of 2 to 4 strings\n\
         - \"priority_actions\": array of 3 to 5 strings\n\
         - \"pedagogical_recommendations\": object mapping dimension names to advice strings\n\
         - \"resources\": array of strings (optional)\n\
         - \"next_session_goals\": array of strings (optional)\n\
         No other top-level keys are allowed.",
    );
    prompt
}

fn annotated_prompt(original: &str, failure: &str) -> String {
    format!(
        "{}\n\nYour previous reply was rejected: {}.\n\
         Respond again with ONLY the JSON object. Use exactly the keys listed above, \
         respect every array length bound, and add nothing else.",
        original, failure
    )
}

fn describe_violations(violations: &[SchemaViolation]) -> String {
    let parts: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
    parts.join("; ")
}

fn status_word(status: MetricStatus) -> &'static str {
    match status {
        MetricStatus::Low => "low",
        MetricStatus::Optimal => "optimal",
        MetricStatus::High => "high",
    }
}

/// Human label for a metric name, used by the fallback text
fn describe(name: &str) -> &'static str {
    match name {
        "intro_time_ratio" => "opening phase share",
        "dev_time_ratio" => "main activity share",
        "closing_time_ratio" => "closing phase share",
        "utterance_density" => "utterance pace",
        "question_ratio" => "question share",
        "explanation_ratio" => "explanation share",
        "feedback_ratio" => "feedback share",
        "context_diversity" => "discourse variety",
        "avg_cognitive_level" => "average cognitive demand",
        "higher_order_ratio" => "higher-order thinking share",
        "cognitive_progression" => "start-to-end deepening",
        "extended_dialogue_ratio" => "extended dialogue share",
        "avg_wait_time" => "wait time after questions",
        "irf_pattern_ratio" => "initiation-response-feedback cycling",
        "dev_question_depth" => "question depth in the main activity",
        _ => "this indicator",
    }
}

/// Concrete suggestion for an out-of-range metric
fn action_for(metric: &Metric) -> String {
    match (metric.name.as_str(), metric.status) {
        ("avg_wait_time", MetricStatus::Low) => {
            "Pause at least three seconds after each question before taking answers".to_string()
        }
        ("question_ratio", MetricStatus::Low) => {
            "Plan additional checking questions for each activity block".to_string()
        }
        ("question_ratio", MetricStatus::High) => {
            "Replace part of the question stream with short worked explanations".to_string()
        }
        ("higher_order_ratio", MetricStatus::Low) => {
            "Rework several recall questions into analyze or evaluate prompts".to_string()
        }
        ("feedback_ratio", MetricStatus::Low) => {
            "Respond to more student answers with specific, descriptive feedback".to_string()
        }
        ("extended_dialogue_ratio", MetricStatus::Low) => {
            "Follow student answers with a second prompt to extend the exchange".to_string()
        }
        ("closing_time_ratio", MetricStatus::Low) => {
            "Reserve the final minutes for a structured wrap-up and student summary".to_string()
        }
        ("intro_time_ratio", MetricStatus::High) => {
            "Tighten the opening so the main activity starts sooner".to_string()
        }
        ("utterance_density", MetricStatus::High) => {
            "Slow the exchange pace to leave room for student thinking".to_string()
        }
        _ => format!(
            "Adjust {} toward its optimal range when planning the next lesson",
            describe(&metric.name)
        ),
    }
}

fn pad_to(mut items: Vec<String>, min: usize, fillers: &[&str]) -> Vec<String> {
    for filler in fillers {
        if items.len() >= min {
            break;
        }
        let filler = filler.to_string();
        if !items.contains(&filler) {
            items.push(filler);
        }
    }
    items
}

/// Deterministic feedback synthesized from metric statuses; no model call
///
/// Shaped to satisfy the same schema the generated path is validated
/// against, so downstream consumers handle both uniformly.
pub fn fallback_from_metrics(metrics: &MetricsReport, pattern: &PatternMatch) -> CoachingFeedback {
    let mut sorted: Vec<&Metric> = metrics.metrics.iter().collect();
    sorted.sort_by(|a, b| {
        a.normalized_score
            .total_cmp(&b.normalized_score)
            .then_with(|| a.name.cmp(&b.name))
    });

    let strengths: Vec<String> = sorted
        .iter()
        .rev()
        .filter(|m| m.status == MetricStatus::Optimal)
        .take(4)
        .map(|m| format!("{} is in the optimal range", capitalize(describe(&m.name))))
        .collect();
    let strengths = pad_to(
        strengths,
        2,
        &[
            "The lesson maintains a recognizable overall structure",
            "Teacher talk stays on the planned topic",
        ],
    );

    let growth_areas: Vec<String> = sorted
        .iter()
        .filter(|m| m.status != MetricStatus::Optimal)
        .take(4)
        .map(|m| {
            format!(
                "{} is {} relative to its optimal range",
                capitalize(describe(&m.name)),
                status_word(m.status)
            )
        })
        .collect();
    let growth_areas = pad_to(
        growth_areas,
        2,
        &[
            "Broaden the variety of discourse moves across the lesson",
            "Give students more chances to articulate their reasoning",
        ],
    );

    let priority_actions: Vec<String> = sorted
        .iter()
        .filter(|m| m.status != MetricStatus::Optimal)
        .take(5)
        .map(|m| action_for(m))
        .collect();
    let priority_actions = pad_to(
        priority_actions,
        3,
        &[
            "Keep the current balance of discourse moves",
            "Review one recorded exchange and note one improvement",
            "Set a single measurable goal for the next lesson",
        ],
    );

    let mut recommendations = std::collections::BTreeMap::new();
    recommendations.insert(
        "time_management".to_string(),
        "Hold the opening and closing phases to their planned share of the lesson".to_string(),
    );
    recommendations.insert(
        "questioning".to_string(),
        "Mix recall checks with analyze and evaluate prompts in each activity".to_string(),
    );
    recommendations.insert(
        "feedback".to_string(),
        "Acknowledge student answers with specific, descriptive responses".to_string(),
    );
    recommendations.insert(
        "cognitive_demand".to_string(),
        "Raise the thinking level step by step as the lesson progresses".to_string(),
    );

    let next_session_goals: Vec<String> = sorted
        .iter()
        .filter(|m| m.status != MetricStatus::Optimal)
        .take(2)
        .map(|m| format!("Move {} into its optimal range", describe(&m.name)))
        .collect();
    let next_session_goals = pad_to(
        next_session_goals,
        1,
        &["Hold every indicator inside its optimal range"],
    );

    CoachingFeedback {
        overall_assessment: format!(
            "Automated summary: the lesson scored {:.0} of 100 overall and most closely \
             resembles the \"{}\" pattern (similarity {:.2}). {} of {} metrics are in \
             their optimal range.",
            metrics.overall.raw_value,
            pattern.best_pattern_name,
            pattern.best_similarity,
            metrics
                .metrics
                .iter()
                .filter(|m| m.status == MetricStatus::Optimal)
                .count(),
            metrics.metrics.len()
        ),
        strengths,
        growth_areas,
        priority_actions,
        pedagogical_recommendations: recommendations,
        resources: vec![
            "Questioning techniques reference card".to_string(),
            "Peer observation checklist for discourse balance".to_string(),
        ],
        next_session_goals,
        provenance: FeedbackProvenance::Fallback,
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricCategory;
    use crate::providers::ProviderError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        /// None entries simulate a failed call
        replies: Mutex<VecDeque<Option<String>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Option<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate_json(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            match self.replies.lock().unwrap().pop_front() {
                Some(Some(reply)) => Ok(reply),
                Some(None) => Err(ProviderError::Timeout),
                None => Err(ProviderError::Request("script exhausted".to_string())),
            }
        }
    }

    fn metric(name: &str, status: MetricStatus, score: f64) -> Metric {
        Metric {
            name: name.to_string(),
            category: MetricCategory::InteractionQuality,
            raw_value: score / 100.0,
            normalized_score: score,
            status,
        }
    }

    fn report(metrics: Vec<Metric>) -> MetricsReport {
        let mean = metrics.iter().map(|m| m.normalized_score).sum::<f64>()
            / metrics.len().max(1) as f64;
        MetricsReport {
            metrics,
            overall: Metric {
                name: "overall_score".to_string(),
                category: MetricCategory::Composite,
                raw_value: mean,
                normalized_score: mean,
                status: MetricStatus::Optimal,
            },
            classified_count: 7,
            total_count: 10,
            incomplete: false,
        }
    }

    fn mixed_report() -> MetricsReport {
        report(vec![
            metric("question_ratio", MetricStatus::Optimal, 100.0),
            metric("avg_wait_time", MetricStatus::Low, 20.0),
            metric("feedback_ratio", MetricStatus::Low, 40.0),
            metric("higher_order_ratio", MetricStatus::High, 60.0),
        ])
    }

    fn all_optimal_report() -> MetricsReport {
        report(vec![
            metric("question_ratio", MetricStatus::Optimal, 100.0),
            metric("avg_wait_time", MetricStatus::Optimal, 100.0),
        ])
    }

    fn pattern() -> PatternMatch {
        PatternMatch {
            best_pattern_id: "inquiry-based-learning".to_string(),
            best_pattern_name: "Inquiry-Based Learning".to_string(),
            best_similarity: 0.71,
            all_similarities: Default::default(),
            low_confidence: false,
            classified_count: 7,
        }
    }

    fn context() -> LessonContext {
        LessonContext {
            subject: "history".to_string(),
            grade: "10".to_string(),
            language: "en".to_string(),
            duration_seconds: Some(2700.0),
        }
    }

    fn valid_reply() -> String {
        json!({
            "overall_assessment": "Strong inquiry rhythm with shallow wait times.",
            "strengths": ["Question share is well balanced", "Clear lesson arc"],
            "growth_areas": ["Wait time is short", "Feedback share is thin"],
            "priority_actions": ["Pause after questions", "Feed back on every answer", "Close with a recap"],
            "pedagogical_recommendations": {"questioning": "Chain follow-ups on student ideas"}
        })
        .to_string()
    }

    /// Serialize feedback and check the content fields against the schema
    fn assert_schema_clean(feedback: &CoachingFeedback) {
        let mut value = serde_json::to_value(feedback).unwrap();
        value.as_object_mut().unwrap().remove("provenance");
        let violations = V1.validate(&value);
        assert!(violations.is_empty(), "violations: {:?}", violations);
    }

    #[tokio::test]
    async fn test_valid_reply_is_accepted_first_try() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Some(valid_reply())]));
        let coaching = CoachingGenerator::new(Arc::clone(&generator) as Arc<dyn TextGenerator>);
        let feedback = coaching
            .generate(&[], &mixed_report(), &pattern(), &context())
            .await;
        assert_eq!(feedback.provenance, FeedbackProvenance::Generated);
        assert_eq!(generator.call_count(), 1);
        assert_schema_clean(&feedback);
    }

    #[tokio::test]
    async fn test_invalid_then_valid_uses_two_calls() {
        let invalid = json!({"overall_assessment": "too bare"}).to_string();
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Some(invalid),
            Some(valid_reply()),
        ]));
        let coaching = CoachingGenerator::new(Arc::clone(&generator) as Arc<dyn TextGenerator>);
        let feedback = coaching
            .generate(&[], &mixed_report(), &pattern(), &context())
            .await;
        assert_eq!(feedback.provenance, FeedbackProvenance::Generated);
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_two_rejections_fall_back() {
        let invalid = json!({"overall_assessment": "still bare"}).to_string();
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Some(invalid.clone()),
            Some(invalid),
        ]));
        let coaching = CoachingGenerator::new(Arc::clone(&generator) as Arc<dyn TextGenerator>);
        let feedback = coaching
            .generate(&[], &mixed_report(), &pattern(), &context())
            .await;
        assert_eq!(feedback.provenance, FeedbackProvenance::Fallback);
        assert_eq!(generator.call_count(), 2);
        assert_schema_clean(&feedback);
    }

    #[tokio::test]
    async fn test_call_errors_also_fall_back() {
        let generator = Arc::new(ScriptedGenerator::new(vec![None, None]));
        let coaching = CoachingGenerator::new(Arc::clone(&generator) as Arc<dyn TextGenerator>);
        let feedback = coaching
            .generate(&[], &mixed_report(), &pattern(), &context())
            .await;
        assert_eq!(feedback.provenance, FeedbackProvenance::Fallback);
        assert_eq!(generator.call_count(), 2);
    }

    #[test]
    fn test_fallback_satisfies_schema_for_mixed_statuses() {
        let feedback = fallback_from_metrics(&mixed_report(), &pattern());
        assert_eq!(feedback.provenance, FeedbackProvenance::Fallback);
        assert_schema_clean(&feedback);
        // Worst metric surfaces in the growth areas
        assert!(feedback
            .growth_areas
            .iter()
            .any(|g| g.contains("ait time")));
    }

    #[test]
    fn test_fallback_pads_when_everything_is_optimal() {
        let feedback = fallback_from_metrics(&all_optimal_report(), &pattern());
        assert!(feedback.strengths.len() >= 2);
        assert!(feedback.growth_areas.len() >= 2);
        assert!(feedback.priority_actions.len() >= 3);
        assert_schema_clean(&feedback);
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let a = fallback_from_metrics(&mixed_report(), &pattern());
        let b = fallback_from_metrics(&mixed_report(), &pattern());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_prompt_carries_pipeline_outputs() {
        let prompt = build_prompt(&[], &mixed_report(), &pattern(), &context());
        assert!(prompt.contains("question_ratio"));
        assert!(prompt.contains("Inquiry-Based Learning"));
        assert!(prompt.contains("history"));
        assert!(prompt.contains("priority_actions"));
    }

    #[test]
    fn test_annotated_prompt_names_the_failure() {
        let annotated = annotated_prompt("BASE", "missing required field \"strengths\"");
        assert!(annotated.starts_with("BASE"));
        assert!(annotated.contains("missing required field"));
    }
}
