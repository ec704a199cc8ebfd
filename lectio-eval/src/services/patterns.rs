//! Ideal-pattern library and cosine matching
//!
//! Each pattern is a 75-dimension distribution over the
//! (stage × context × level) cross-product describing how segments of an
//! exemplary lesson of that style are expected to fall. The observed
//! distribution is built from classified segments only and compared by
//! cosine similarity.
//!
//! The builtin library ships five canonical teaching styles; a TOML file can
//! replace it wholesale at startup. Patterns are loaded once and never
//! mutated afterwards.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use lectio_common::error::{Error, Result};

use crate::models::{
    classified_count, CategoryTriple, CognitiveLevel, ContextType, PatternMatch, SegmentOutcome,
    Stage, CELL_COUNT,
};

type Cell = (Stage, ContextType, CognitiveLevel, f64);

use CognitiveLevel::{L1, L2, L3, L4, L5};
use ContextType::{Explanation, Feedback, Management, Other, Question};
use Stage::{Closing, Development, Intro};

const DIRECT_INSTRUCTION: &[Cell] = &[
    (Intro, Explanation, L1, 0.06),
    (Intro, Management, L1, 0.05),
    (Intro, Question, L1, 0.04),
    (Development, Explanation, L1, 0.18),
    (Development, Explanation, L2, 0.22),
    (Development, Explanation, L3, 0.08),
    (Development, Question, L1, 0.06),
    (Development, Question, L2, 0.06),
    (Development, Feedback, L1, 0.06),
    (Development, Management, L1, 0.04),
    (Closing, Explanation, L2, 0.06),
    (Closing, Feedback, L1, 0.04),
    (Closing, Management, L1, 0.05),
];

const INQUIRY_BASED_LEARNING: &[Cell] = &[
    (Intro, Explanation, L1, 0.04),
    (Intro, Question, L2, 0.04),
    (Intro, Management, L1, 0.02),
    (Development, Question, L2, 0.08),
    (Development, Question, L3, 0.22),
    (Development, Question, L4, 0.10),
    (Development, Explanation, L2, 0.08),
    (Development, Explanation, L1, 0.04),
    (Development, Feedback, L2, 0.08),
    (Development, Feedback, L3, 0.06),
    (Development, Other, L2, 0.04),
    (Closing, Question, L4, 0.06),
    (Closing, Explanation, L3, 0.06),
    (Closing, Feedback, L2, 0.04),
    (Closing, Management, L1, 0.04),
];

const DISCUSSION_SEMINAR: &[Cell] = &[
    (Intro, Question, L2, 0.04),
    (Intro, Management, L1, 0.03),
    (Intro, Explanation, L2, 0.03),
    (Development, Question, L3, 0.14),
    (Development, Question, L4, 0.12),
    (Development, Feedback, L3, 0.12),
    (Development, Feedback, L4, 0.10),
    (Development, Other, L3, 0.08),
    (Development, Explanation, L3, 0.06),
    (Development, Question, L5, 0.08),
    (Closing, Feedback, L3, 0.06),
    (Closing, Explanation, L4, 0.05),
    (Closing, Question, L4, 0.04),
    (Closing, Management, L1, 0.05),
];

const INTERACTIVE_LECTURE: &[Cell] = &[
    (Intro, Explanation, L1, 0.05),
    (Intro, Question, L1, 0.04),
    (Intro, Management, L1, 0.03),
    (Development, Explanation, L2, 0.20),
    (Development, Explanation, L3, 0.10),
    (Development, Question, L2, 0.12),
    (Development, Question, L3, 0.08),
    (Development, Feedback, L2, 0.10),
    (Development, Other, L1, 0.04),
    (Development, Management, L1, 0.04),
    (Closing, Explanation, L2, 0.06),
    (Closing, Question, L3, 0.05),
    (Closing, Feedback, L2, 0.05),
    (Closing, Management, L1, 0.04),
];

const GUIDED_PRACTICE: &[Cell] = &[
    (Intro, Explanation, L1, 0.05),
    (Intro, Management, L1, 0.05),
    (Development, Explanation, L2, 0.12),
    (Development, Question, L2, 0.10),
    (Development, Feedback, L2, 0.20),
    (Development, Feedback, L3, 0.10),
    (Development, Management, L2, 0.06),
    (Development, Other, L1, 0.06),
    (Development, Question, L3, 0.06),
    (Closing, Feedback, L2, 0.04),
    (Closing, Explanation, L2, 0.06),
    (Closing, Question, L2, 0.05),
    (Closing, Management, L1, 0.05),
];

const BUILTIN: &[(&str, &str, &[Cell])] = &[
    ("direct-instruction", "Direct Instruction", DIRECT_INSTRUCTION),
    (
        "inquiry-based-learning",
        "Inquiry-Based Learning",
        INQUIRY_BASED_LEARNING,
    ),
    (
        "discussion-seminar",
        "Discussion-Oriented Seminar",
        DISCUSSION_SEMINAR,
    ),
    (
        "interactive-lecture",
        "Interactive Lecture",
        INTERACTIVE_LECTURE,
    ),
    ("guided-practice", "Guided Practice", GUIDED_PRACTICE),
];

/// One canonical teaching style as a normalized 75-cell distribution
#[derive(Debug, Clone)]
pub struct IdealPattern {
    pub id: String,
    pub name: String,
    pub vector: [f64; CELL_COUNT],
}

/// Ordered, immutable set of ideal patterns
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    patterns: Vec<IdealPattern>,
}

#[derive(Debug, Deserialize)]
struct PatternFile {
    #[serde(default)]
    pattern: Vec<PatternEntry>,
}

#[derive(Debug, Deserialize)]
struct PatternEntry {
    id: String,
    name: String,
    cells: Vec<CellEntry>,
}

#[derive(Debug, Deserialize)]
struct CellEntry {
    stage: String,
    context: String,
    level: String,
    weight: f64,
}

impl PatternLibrary {
    /// The five built-in canonical teaching styles
    pub fn builtin() -> Self {
        let patterns = BUILTIN
            .iter()
            .map(|(id, name, cells)| IdealPattern {
                id: (*id).to_string(),
                name: (*name).to_string(),
                vector: normalized_vector(cells.iter().copied()),
            })
            .collect();
        Self { patterns }
    }

    /// Load a replacement library from a `[[pattern]]` TOML file
    ///
    /// The file replaces the builtin set wholesale. Any malformed entry
    /// (unknown category label, non-positive weight, duplicate id, empty
    /// list) fails the whole load so a broken file is caught at startup.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let file: PatternFile = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid pattern file {}: {}", path.display(), e)))?;

        if file.pattern.is_empty() {
            return Err(Error::Config(format!(
                "pattern file {} defines no patterns",
                path.display()
            )));
        }

        let mut patterns: Vec<IdealPattern> = Vec::with_capacity(file.pattern.len());
        for entry in file.pattern {
            if patterns.iter().any(|p| p.id == entry.id) {
                return Err(Error::Config(format!(
                    "duplicate pattern id \"{}\"",
                    entry.id
                )));
            }
            let mut cells: Vec<Cell> = Vec::with_capacity(entry.cells.len());
            for cell in &entry.cells {
                let stage = Stage::from_label(&cell.stage).ok_or_else(|| {
                    Error::Config(format!(
                        "pattern \"{}\": unknown stage \"{}\"",
                        entry.id, cell.stage
                    ))
                })?;
                let context = ContextType::from_label(&cell.context).ok_or_else(|| {
                    Error::Config(format!(
                        "pattern \"{}\": unknown context \"{}\"",
                        entry.id, cell.context
                    ))
                })?;
                let level = CognitiveLevel::from_label(&cell.level).ok_or_else(|| {
                    Error::Config(format!(
                        "pattern \"{}\": unknown level \"{}\"",
                        entry.id, cell.level
                    ))
                })?;
                if !cell.weight.is_finite() || cell.weight <= 0.0 {
                    return Err(Error::Config(format!(
                        "pattern \"{}\": weight {} must be positive",
                        entry.id, cell.weight
                    )));
                }
                cells.push((stage, context, level, cell.weight));
            }
            if cells.is_empty() {
                return Err(Error::Config(format!(
                    "pattern \"{}\" has no cells",
                    entry.id
                )));
            }
            patterns.push(IdealPattern {
                id: entry.id,
                name: entry.name,
                vector: normalized_vector(cells.into_iter()),
            });
        }

        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> &[IdealPattern] {
        &self.patterns
    }

    pub fn get(&self, id: &str) -> Option<&IdealPattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Accumulate cells into a 75-vector and normalize it to sum 1
fn normalized_vector(cells: impl Iterator<Item = Cell>) -> [f64; CELL_COUNT] {
    let mut vector = [0.0; CELL_COUNT];
    for (stage, context, level, weight) in cells {
        vector[CategoryTriple::new(stage, context, level).cell_index()] += weight;
    }
    let sum: f64 = vector.iter().sum();
    if sum > 0.0 {
        for value in &mut vector {
            *value /= sum;
        }
    }
    vector
}

/// Observed cell proportions over classified segments; all-zero when none
pub fn observed_distribution(outcomes: &[SegmentOutcome]) -> [f64; CELL_COUNT] {
    let mut vector = [0.0; CELL_COUNT];
    let mut total = 0usize;
    for outcome in outcomes {
        if let Some(classification) = outcome.classification() {
            vector[classification.triple.cell_index()] += 1.0;
            total += 1;
        }
    }
    if total > 0 {
        for value in &mut vector {
            *value /= total as f64;
        }
    }
    vector
}

/// Cosine similarity, 0.0 whenever either vector has zero norm
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Compare the observed distribution against every library pattern
///
/// Best match is the maximum similarity; on an exact tie the pattern listed
/// first wins. Fewer classified segments than `min_segments` flags the
/// result low-confidence without suppressing it.
pub fn match_distribution(
    outcomes: &[SegmentOutcome],
    library: &PatternLibrary,
    min_segments: usize,
) -> PatternMatch {
    let observed = observed_distribution(outcomes);
    let classified = classified_count(outcomes);

    let mut all_similarities = BTreeMap::new();
    let mut best: Option<(&IdealPattern, f64)> = None;
    for pattern in library.patterns() {
        let similarity = cosine_similarity(&observed, &pattern.vector);
        all_similarities.insert(pattern.id.clone(), similarity);
        // Strictly greater keeps the first-listed pattern on ties
        match best {
            Some((_, best_similarity)) if similarity <= best_similarity => {}
            _ => best = Some((pattern, similarity)),
        }
    }

    let low_confidence = classified < min_segments;
    match best {
        Some((pattern, similarity)) => {
            if low_confidence {
                tracing::warn!(
                    classified,
                    min_segments,
                    "Pattern match computed from too few classified segments"
                );
            }
            PatternMatch {
                best_pattern_id: pattern.id.clone(),
                best_pattern_name: pattern.name.clone(),
                best_similarity: similarity,
                all_similarities,
                low_confidence,
                classified_count: classified,
            }
        }
        None => {
            tracing::warn!("Pattern library is empty; reporting a null match");
            PatternMatch {
                best_pattern_id: String::new(),
                best_pattern_name: String::new(),
                best_similarity: 0.0,
                all_similarities,
                low_confidence: true,
                classified_count: classified,
            }
        }
    }
}
