//! Discourse segments and lesson context
//!
//! Segments are the immutable input of the evaluation pipeline. Ordering by
//! `sequence_index` is authoritative for all temporal analysis; timestamps
//! must be non-decreasing along that order.

use lectio_common::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One timestamped unit of classroom speech
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Segment identifier assigned by the transcription collaborator
    pub id: Uuid,

    /// Transcribed speech text
    pub text: String,

    /// Seconds from lesson start
    pub timestamp: f64,

    /// Authoritative ordering for temporal analysis
    pub sequence_index: usize,
}

/// Job-level lesson context, passed through to provider prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonContext {
    /// Subject being taught (e.g. "mathematics")
    pub subject: String,

    /// Grade or level descriptor (e.g. "7th grade")
    pub grade: String,

    /// BCP-47-ish language tag forwarded to prompts (default "en")
    #[serde(default = "default_language")]
    pub language: String,

    /// Total lesson duration in seconds; when absent the last segment
    /// timestamp is used instead
    pub duration_seconds: Option<f64>,
}

fn default_language() -> String {
    "en".to_string()
}

impl LessonContext {
    /// Lesson duration used for time-based metrics
    pub fn effective_duration(&self, segments: &[Segment]) -> f64 {
        match self.duration_seconds {
            Some(d) => d,
            None => segments.iter().map(|s| s.timestamp).fold(0.0, f64::max),
        }
    }
}

/// Validate a submitted segment list against the fatal input error taxonomy
///
/// Fatal conditions: empty list, empty segment text, duplicate sequence
/// indexes, timestamps decreasing along `sequence_index` order, non-positive
/// duration. The slice must already be sorted by `sequence_index`.
pub fn validate_submission(segments: &[Segment], duration_seconds: f64) -> Result<()> {
    if segments.is_empty() {
        return Err(Error::InvalidInput("segment list is empty".to_string()));
    }

    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(Error::InvalidInput(format!(
            "lesson duration must be positive, got {}",
            duration_seconds
        )));
    }

    let mut prev: Option<&Segment> = None;
    for segment in segments {
        if segment.text.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "segment {} has empty text",
                segment.id
            )));
        }
        if !segment.timestamp.is_finite() || segment.timestamp < 0.0 {
            return Err(Error::InvalidInput(format!(
                "segment {} has invalid timestamp {}",
                segment.id, segment.timestamp
            )));
        }
        if let Some(p) = prev {
            if segment.sequence_index == p.sequence_index {
                return Err(Error::InvalidInput(format!(
                    "duplicate sequence_index {}",
                    segment.sequence_index
                )));
            }
            if segment.timestamp < p.timestamp {
                return Err(Error::InvalidInput(format!(
                    "timestamps are not monotonically non-decreasing at sequence_index {}",
                    segment.sequence_index
                )));
            }
        }
        prev = Some(segment);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(idx: usize, ts: f64, text: &str) -> Segment {
        Segment {
            id: Uuid::new_v4(),
            text: text.to_string(),
            timestamp: ts,
            sequence_index: idx,
        }
    }

    fn context(duration: Option<f64>) -> LessonContext {
        LessonContext {
            subject: "science".to_string(),
            grade: "8th grade".to_string(),
            language: "en".to_string(),
            duration_seconds: duration,
        }
    }

    #[test]
    fn test_valid_submission_passes() {
        let segments = vec![
            segment(0, 0.0, "Good morning everyone"),
            segment(1, 12.5, "Open your books"),
            segment(2, 30.0, "What is photosynthesis?"),
        ];
        assert!(validate_submission(&segments, 600.0).is_ok());
    }

    #[test]
    fn test_empty_list_rejected() {
        let result = validate_submission(&[], 600.0);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_empty_text_rejected() {
        let segments = vec![segment(0, 0.0, "hello"), segment(1, 5.0, "   ")];
        assert!(validate_submission(&segments, 600.0).is_err());
    }

    #[test]
    fn test_decreasing_timestamps_rejected() {
        let segments = vec![segment(0, 10.0, "first"), segment(1, 5.0, "second")];
        assert!(validate_submission(&segments, 600.0).is_err());
    }

    #[test]
    fn test_equal_timestamps_allowed() {
        // Non-decreasing, not strictly increasing
        let segments = vec![segment(0, 10.0, "first"), segment(1, 10.0, "second")];
        assert!(validate_submission(&segments, 600.0).is_ok());
    }

    #[test]
    fn test_duplicate_sequence_index_rejected() {
        let segments = vec![segment(3, 1.0, "first"), segment(3, 2.0, "second")];
        assert!(validate_submission(&segments, 600.0).is_err());
    }

    #[test]
    fn test_zero_duration_rejected() {
        let segments = vec![segment(0, 0.0, "hello")];
        assert!(validate_submission(&segments, 0.0).is_err());
        assert!(validate_submission(&segments, -5.0).is_err());
        assert!(validate_submission(&segments, f64::NAN).is_err());
    }

    #[test]
    fn test_effective_duration_prefers_context() {
        let segments = vec![segment(0, 0.0, "a"), segment(1, 300.0, "b")];
        assert_eq!(context(Some(2400.0)).effective_duration(&segments), 2400.0);
        assert_eq!(context(None).effective_duration(&segments), 300.0);
    }

    #[test]
    fn test_language_defaults_to_en() {
        let json = r#"{"subject":"math","grade":"5th","duration_seconds":null}"#;
        let ctx: LessonContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.language, "en");
    }
}
