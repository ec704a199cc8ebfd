//! Test Helper Utilities
//!
//! Shared utilities for testing lectio-eval: scripted provider
//! implementations and transcript fixtures.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use lectio_common::events::EventBus;
use lectio_eval::models::{
    CategoryTriple, CognitiveLevel, ContextType, EvaluationParameters, LessonContext, Segment,
    Stage,
};
use lectio_eval::providers::{ProviderError, SegmentClassifier, TextGenerator};
use lectio_eval::services::patterns::PatternLibrary;
use lectio_eval::AppState;

/// Shorthand for building a category triple
pub fn triple(stage: Stage, context: ContextType, level: CognitiveLevel) -> CategoryTriple {
    CategoryTriple {
        stage,
        context,
        level,
    }
}

/// Build a transcript segment with a fresh ID
pub fn segment(sequence_index: usize, timestamp: f64, text: &str) -> Segment {
    Segment {
        id: Uuid::new_v4(),
        text: text.to_string(),
        timestamp,
        sequence_index,
    }
}

/// Standard lesson context used across integration tests
pub fn lesson_context() -> LessonContext {
    LessonContext {
        subject: "mathematics".to_string(),
        grade: "7th grade".to_string(),
        language: "en".to_string(),
        duration_seconds: Some(600.0),
    }
}

/// Ten-segment lesson transcript with distinct utterance texts
///
/// Texts double as script keys for [`ScriptedClassifier`], so every
/// segment must stay unique.
pub fn lesson_segments() -> Vec<Segment> {
    vec![
        segment(0, 30.0, "Good morning everyone, today we are going to look at how linear equations describe real situations."),
        segment(1, 90.0, "Take out your notebooks while I hand these back."),
        segment(2, 150.0, "Why does the graph get steeper when we double the coefficient?"),
        segment(3, 210.0, "What is the slope in this equation?"),
        segment(4, 270.0, "Hold on, the projector is acting up again."),
        segment(5, 330.0, "The slope tells us how much y changes for each unit of x."),
        segment(6, 390.0, "How would you compare these two lines if the intercepts were swapped?"),
        segment(7, 450.0, "Good reasoning, Maya, you connected the slope to the rate of change."),
        segment(8, 510.0, "Let's pause there for a second."),
        segment(9, 560.0, "For tomorrow, how might you design your own experiment to test this relationship?"),
    ]
}

/// Three distinct votes, which no tie-break can resolve
pub fn three_way_tie() -> Vec<Option<CategoryTriple>> {
    vec![
        Some(triple(Stage::Intro, ContextType::Management, CognitiveLevel::L1)),
        Some(triple(
            Stage::Development,
            ContextType::Management,
            CognitiveLevel::L1,
        )),
        Some(triple(Stage::Closing, ContextType::Management, CognitiveLevel::L1)),
    ]
}

/// Scripted votes for the standard lesson transcript
///
/// Seven segments classify unanimously into an inquiry-leaning
/// distribution; segments 1, 4 and 8 draw three-way-tied votes and stay
/// unclassified. With `vote_count = 3` the classified fraction is
/// exactly 0.7.
pub fn inquiry_classifier() -> ScriptedClassifier {
    use CognitiveLevel::*;
    use ContextType::*;
    use Stage::*;

    let segs = lesson_segments();
    let unanimous = |t: CategoryTriple| vec![Some(t)];

    ScriptedClassifier::new()
        .script(&segs[0].text, unanimous(triple(Intro, Explanation, L1)))
        .script(&segs[1].text, three_way_tie())
        .script(&segs[2].text, unanimous(triple(Development, Question, L3)))
        .script(&segs[3].text, unanimous(triple(Development, Question, L1)))
        .script(&segs[4].text, three_way_tie())
        .script(&segs[5].text, unanimous(triple(Development, Explanation, L1)))
        .script(&segs[6].text, unanimous(triple(Development, Question, L3)))
        .script(&segs[7].text, unanimous(triple(Development, Feedback, L2)))
        .script(&segs[8].text, three_way_tie())
        .script(&segs[9].text, unanimous(triple(Closing, Question, L4)))
}

/// A coaching reply that parses as JSON but violates the feedback schema
pub fn invalid_feedback_json() -> String {
    serde_json::json!({
        "overall_assessment": "Looked fine overall.",
        "strengths": ["Clear explanations", "Good pacing"],
        "growth_areas": ["More wait time", "Deeper questions"]
    })
    .to_string()
}

/// Parameters tuned for fast deterministic tests
pub fn fast_parameters() -> EvaluationParameters {
    EvaluationParameters {
        vote_count: 3,
        vote_retries: 0,
        call_timeout_secs: 5,
        ..EvaluationParameters::default()
    }
}

struct ClassifierPlan {
    responses: Vec<Option<CategoryTriple>>,
    calls: usize,
}

/// Classifier that replays a scripted vote sequence per segment text
///
/// Each call pops the next planned response for that text; once the
/// plan is exhausted the final entry repeats. `Some` yields a vote,
/// `None` yields a provider error.
pub struct ScriptedClassifier {
    plans: Mutex<HashMap<String, ClassifierPlan>>,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self {
            plans: Mutex::new(HashMap::new()),
        }
    }

    /// Add a vote plan for one segment text
    pub fn script(self, text: &str, responses: Vec<Option<CategoryTriple>>) -> Self {
        assert!(!responses.is_empty(), "script needs at least one response");
        self.plans.lock().unwrap().insert(
            text.to_string(),
            ClassifierPlan {
                responses,
                calls: 0,
            },
        );
        self
    }

    /// Every listed segment always classifies as the same triple
    pub fn uniform(segments: &[Segment], answer: CategoryTriple) -> Self {
        let mut scripted = Self::new();
        for seg in segments {
            scripted = scripted.script(&seg.text, vec![Some(answer)]);
        }
        scripted
    }

    /// Number of classify calls made for one segment text
    pub fn calls_for(&self, text: &str) -> usize {
        self.plans
            .lock()
            .unwrap()
            .get(text)
            .map(|plan| plan.calls)
            .unwrap_or(0)
    }
}

#[async_trait]
impl SegmentClassifier for ScriptedClassifier {
    async fn classify_segment(
        &self,
        text: &str,
        _context: &LessonContext,
    ) -> Result<CategoryTriple, ProviderError> {
        let mut plans = self.plans.lock().unwrap();
        let plan = plans
            .get_mut(text)
            .ok_or_else(|| ProviderError::Request(format!("no script for segment: {}", text)))?;
        let index = plan.calls.min(plan.responses.len() - 1);
        plan.calls += 1;
        match plan.responses[index] {
            Some(answer) => Ok(answer),
            None => Err(ProviderError::Request("scripted failure".to_string())),
        }
    }
}

/// Classifier that never answers within test time
///
/// Used to keep classification in flight while a cancel or timeout
/// lands.
pub struct SlowClassifier;

#[async_trait]
impl SegmentClassifier for SlowClassifier {
    async fn classify_segment(
        &self,
        _text: &str,
        _context: &LessonContext,
    ) -> Result<CategoryTriple, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(triple(
            Stage::Development,
            ContextType::Other,
            CognitiveLevel::L1,
        ))
    }
}

/// Generator that replays a queue of scripted replies
///
/// `Some` yields that string as the model reply, `None` yields a
/// provider error. An exhausted queue also errors.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Option<String>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Option<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Generator that always produces a schema-valid reply
    pub fn always_valid() -> Self {
        Self::new(vec![Some(valid_feedback_json()), Some(valid_feedback_json())])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_json(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(ProviderError::Request("scripted failure".to_string())),
            None => Err(ProviderError::Request("script exhausted".to_string())),
        }
    }
}

/// A coaching reply that satisfies the feedback schema
pub fn valid_feedback_json() -> String {
    serde_json::json!({
        "overall_assessment": "A well-paced lesson with strong questioning in the development stage.",
        "strengths": [
            "Questions pushed students toward analysis",
            "Feedback was specific and named the reasoning"
        ],
        "growth_areas": [
            "Closing stage was brief",
            "Wait time after questions was short"
        ],
        "priority_actions": [
            "Plan a three-minute synthesis at the end of the lesson",
            "Pause at least three seconds after each question",
            "Ask a follow-up after each student answer"
        ],
        "pedagogical_recommendations": {
            "questioning": "Sequence questions from recall toward comparison",
            "time_management": "Protect the closing stage on the lesson plan"
        },
        "next_session_goals": [
            "Increase higher-order question share"
        ]
    })
    .to_string()
}

/// Create test app state with scripted providers and built-in patterns
pub fn test_app_state(
    classifier: Arc<dyn SegmentClassifier>,
    generator: Arc<dyn TextGenerator>,
) -> AppState {
    let event_bus = EventBus::new(100);
    AppState::new(
        classifier,
        generator,
        Arc::new(PatternLibrary::builtin()),
        event_bus,
        4,
    )
}

/// App state whose classifier answers every lesson segment the same way
pub fn uniform_app_state(answer: CategoryTriple) -> AppState {
    let classifier = Arc::new(ScriptedClassifier::uniform(&lesson_segments(), answer));
    let generator = Arc::new(ScriptedGenerator::always_valid());
    test_app_state(classifier, generator)
}

/// Timestamp helper for event assertions
pub fn now() -> chrono::DateTime<chrono::Utc> {
    Utc::now()
}
