//! Pedagogical category taxonomy and per-segment classification results
//!
//! A classification assigns each segment a (stage, context, level) triple.
//! The three enums are fixed taxonomy; the full cross-product spans
//! 3 × 5 × 5 = 75 cells, indexed contiguously for distribution vectors.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse lesson phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Intro,
    Development,
    Closing,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Intro, Stage::Development, Stage::Closing];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Intro => "intro",
            Stage::Development => "development",
            Stage::Closing => "closing",
        }
    }

    /// Parse a provider-reply label, case-insensitive
    pub fn from_label(s: &str) -> Option<Stage> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intro" | "introduction" => Some(Stage::Intro),
            "development" => Some(Stage::Development),
            "closing" | "closure" => Some(Stage::Closing),
            _ => None,
        }
    }
}

/// Discourse-act category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Question,
    Explanation,
    Feedback,
    Management,
    Other,
}

impl ContextType {
    pub const ALL: [ContextType; 5] = [
        ContextType::Question,
        ContextType::Explanation,
        ContextType::Feedback,
        ContextType::Management,
        ContextType::Other,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            ContextType::Question => "question",
            ContextType::Explanation => "explanation",
            ContextType::Feedback => "feedback",
            ContextType::Management => "management",
            ContextType::Other => "other",
        }
    }

    /// Parse a provider-reply label, case-insensitive
    pub fn from_label(s: &str) -> Option<ContextType> {
        match s.trim().to_ascii_lowercase().as_str() {
            "question" => Some(ContextType::Question),
            "explanation" => Some(ContextType::Explanation),
            "feedback" => Some(ContextType::Feedback),
            "management" => Some(ContextType::Management),
            "other" => Some(ContextType::Other),
            _ => None,
        }
    }
}

/// Ordinal depth of thinking demanded, L1 (recall) through L5 (create)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CognitiveLevel {
    L1,
    L2,
    L3,
    L4,
    L5,
}

impl CognitiveLevel {
    pub const ALL: [CognitiveLevel; 5] = [
        CognitiveLevel::L1,
        CognitiveLevel::L2,
        CognitiveLevel::L3,
        CognitiveLevel::L4,
        CognitiveLevel::L5,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Numeric value 1..=5 for averaging
    pub fn value(self) -> u8 {
        self as u8 + 1
    }

    pub fn label(self) -> &'static str {
        match self {
            CognitiveLevel::L1 => "L1",
            CognitiveLevel::L2 => "L2",
            CognitiveLevel::L3 => "L3",
            CognitiveLevel::L4 => "L4",
            CognitiveLevel::L5 => "L5",
        }
    }

    /// Parse a provider-reply label: accepts "L3", "l3" or a bare "3"
    pub fn from_label(s: &str) -> Option<CognitiveLevel> {
        let trimmed = s.trim();
        let digit = trimmed
            .strip_prefix('L')
            .or_else(|| trimmed.strip_prefix('l'))
            .unwrap_or(trimmed);
        match digit {
            "1" => Some(CognitiveLevel::L1),
            "2" => Some(CognitiveLevel::L2),
            "3" => Some(CognitiveLevel::L3),
            "4" => Some(CognitiveLevel::L4),
            "5" => Some(CognitiveLevel::L5),
            _ => None,
        }
    }
}

/// Number of cells in the (stage × context × level) cross-product
pub const CELL_COUNT: usize = 75;

/// One cell of the category cross-product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryTriple {
    pub stage: Stage,
    pub context: ContextType,
    pub level: CognitiveLevel,
}

impl CategoryTriple {
    pub fn new(stage: Stage, context: ContextType, level: CognitiveLevel) -> Self {
        Self {
            stage,
            context,
            level,
        }
    }

    /// Contiguous index into a 75-dimension distribution vector
    pub fn cell_index(self) -> usize {
        self.stage.index() * 25 + self.context.index() * 5 + self.level.index()
    }

    /// Component-wise Hamming distance to another triple (0..=3)
    pub fn component_distance(self, other: CategoryTriple) -> usize {
        usize::from(self.stage != other.stage)
            + usize::from(self.context != other.context)
            + usize::from(self.level != other.level)
    }
}

impl std::fmt::Display for CategoryTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.stage.label(),
            self.context.label(),
            self.level.label()
        )
    }
}

/// Majority-vote classification of one segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub segment_id: Uuid,
    #[serde(flatten)]
    pub triple: CategoryTriple,
    /// agreeing_votes / vote_count
    pub confidence: f64,
}

/// Why a segment could not be classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnclassifiedReason {
    /// Three or more categories tied for the plurality
    NoMajority,
    /// Too many vote calls exhausted their retries
    TooManyAbstentions,
}

impl std::fmt::Display for UnclassifiedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnclassifiedReason::NoMajority => write!(f, "no vote majority"),
            UnclassifiedReason::TooManyAbstentions => write!(f, "too many abstentions"),
        }
    }
}

/// Final per-segment outcome of the classification phase
///
/// Unclassified segments are excluded from category-dependent metrics but
/// still count wherever only the segment count matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SegmentOutcome {
    Classified(Classification),
    Unclassified {
        segment_id: Uuid,
        reason: UnclassifiedReason,
    },
}

impl SegmentOutcome {
    pub fn segment_id(&self) -> Uuid {
        match self {
            SegmentOutcome::Classified(c) => c.segment_id,
            SegmentOutcome::Unclassified { segment_id, .. } => *segment_id,
        }
    }

    pub fn classification(&self) -> Option<&Classification> {
        match self {
            SegmentOutcome::Classified(c) => Some(c),
            SegmentOutcome::Unclassified { .. } => None,
        }
    }

    pub fn is_classified(&self) -> bool {
        matches!(self, SegmentOutcome::Classified(_))
    }
}

/// Count of classified (non-abstained) outcomes
pub fn classified_count(outcomes: &[SegmentOutcome]) -> usize {
    outcomes.iter().filter(|o| o.is_classified()).count()
}
