//! Scoring Engine — pure functions over the rubric numbers of an analysis.

use serde::Serialize;

use crate::models::analysis::{AnalysisRecord, ScoreBreakdown};

pub const SKILLS_MAX: f64 = 40.0;
pub const EXPERIENCE_MAX: f64 = 35.0;
pub const ACHIEVEMENTS_MAX: f64 = 20.0;
pub const PRESENTATION_MAX: f64 = 5.0;

pub const STRONG_RESUME: &str = "Strong Resume";
pub const NEEDS_IMPROVEMENT: &str = "Needs Improvement";
pub const NEEDS_MAJOR_WORK: &str = "Needs Major Work";

/// Percentage of `raw` over `max`, after clamping `raw` into `[0, max]`.
/// Model output occasionally lands outside the rubric range.
pub fn breakdown_percentage(raw: f64, max: f64) -> u32 {
    if max <= 0.0 || raw.is_nan() {
        return 0;
    }
    let clamped = raw.clamp(0.0, max);
    (clamped / max * 100.0).round() as u32
}

/// Band label for an overall score. Lower thresholds are inclusive.
pub fn overall_label(score: u32) -> &'static str {
    match score {
        s if s >= 80 => STRONG_RESUME,
        s if s >= 60 => NEEDS_IMPROVEMENT,
        _ => NEEDS_MAJOR_WORK,
    }
}

/// Share of JD keywords found in the résumé. `None` when there were no keywords.
pub fn keyword_match_percentage(matched: usize, missing: usize) -> Option<u32> {
    let total = matched + missing;
    if total == 0 {
        return None;
    }
    Some((matched as f64 / total as f64 * 100.0).round() as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownPercentages {
    pub skills: u32,
    pub experience: u32,
    pub achievements: u32,
    pub presentation: u32,
}

impl BreakdownPercentages {
    pub fn from_breakdown(b: &ScoreBreakdown) -> Self {
        Self {
            skills: breakdown_percentage(b.skills, SKILLS_MAX),
            experience: breakdown_percentage(b.experience, EXPERIENCE_MAX),
            achievements: breakdown_percentage(b.achievements, ACHIEVEMENTS_MAX),
            presentation: breakdown_percentage(b.presentation, PRESENTATION_MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    pub overall_score: u32,
    pub label: &'static str,
    pub breakdown: BreakdownPercentages,
    pub keyword_match_percentage: Option<u32>,
    pub matched_keywords: usize,
    pub missing_keywords: usize,
}

/// Everything the results page shows about an analysis, computed in one place.
pub fn score_report(analysis: &AnalysisRecord) -> ScoreReport {
    let km = &analysis.keyword_match;
    let overall = analysis.overall_score.min(100);
    ScoreReport {
        overall_score: overall,
        label: overall_label(overall),
        breakdown: BreakdownPercentages::from_breakdown(&analysis.score_breakdown),
        keyword_match_percentage: km
            .match_percentage
            .map(|p| p.min(100))
            .or_else(|| keyword_match_percentage(km.matched.len(), km.missing.len())),
        matched_keywords: km.matched.len(),
        missing_keywords: km.missing.len(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::analysis::KeywordMatch;

    #[test]
    fn test_breakdown_clamps_above_max() {
        assert_eq!(breakdown_percentage(45.0, 40.0), 100);
    }

    #[test]
    fn test_breakdown_clamps_below_zero() {
        assert_eq!(breakdown_percentage(-5.0, 40.0), 0);
    }

    #[test]
    fn test_breakdown_degenerate_inputs() {
        assert_eq!(breakdown_percentage(3.0, 0.0), 0);
        assert_eq!(breakdown_percentage(f64::NAN, 40.0), 0);
    }

    #[test]
    fn test_overall_label_boundaries() {
        assert_eq!(overall_label(100), STRONG_RESUME);
        assert_eq!(overall_label(80), STRONG_RESUME);
        assert_eq!(overall_label(79), NEEDS_IMPROVEMENT);
        assert_eq!(overall_label(60), NEEDS_IMPROVEMENT);
        assert_eq!(overall_label(59), NEEDS_MAJOR_WORK);
        assert_eq!(overall_label(0), NEEDS_MAJOR_WORK);
    }

    #[test]
    fn test_keyword_match_percentage() {
        assert_eq!(keyword_match_percentage(5, 5), Some(50));
        assert_eq!(keyword_match_percentage(2, 1), Some(67));
        assert_eq!(keyword_match_percentage(0, 4), Some(0));
        assert_eq!(keyword_match_percentage(0, 0), None);
    }

    fn analysis(breakdown: ScoreBreakdown, overall: u32, keywords: KeywordMatch) -> AnalysisRecord {
        AnalysisRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            resume_text: "resume".to_string(),
            job_description: Some("jd".to_string()),
            score_breakdown: breakdown,
            overall_score: overall,
            keyword_match: keywords,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_end_to_end_breakdown_and_label() {
        let record = analysis(
            ScoreBreakdown {
                skills: 30.0,
                experience: 22.0,
                achievements: 9.0,
                presentation: 4.0,
            },
            67,
            KeywordMatch::default(),
        );
        let report = score_report(&record);
        assert_eq!(
            report.breakdown,
            BreakdownPercentages {
                skills: 75,
                experience: 63,
                achievements: 45,
                presentation: 80,
            }
        );
        assert_eq!(report.label, NEEDS_IMPROVEMENT);
        assert_eq!(report.keyword_match_percentage, None);
    }

    #[test]
    fn test_report_recomputes_missing_keyword_percentage() {
        let keywords = KeywordMatch {
            matched: vec!["rust".into(), "tokio".into(), "sql".into()],
            missing: vec!["kafka".into()],
            match_percentage: None,
        };
        let breakdown = ScoreBreakdown {
            skills: 40.0,
            experience: 35.0,
            achievements: 20.0,
            presentation: 5.0,
        };
        let report = score_report(&analysis(breakdown, 91, keywords));
        assert_eq!(report.keyword_match_percentage, Some(75));
        assert_eq!(report.label, STRONG_RESUME);
    }

    #[test]
    fn test_report_prefers_stored_keyword_percentage() {
        let keywords = KeywordMatch {
            matched: vec!["rust".into()],
            missing: vec!["go".into()],
            match_percentage: Some(62),
        };
        let breakdown = ScoreBreakdown {
            skills: 0.0,
            experience: 0.0,
            achievements: 0.0,
            presentation: 0.0,
        };
        let report = score_report(&analysis(breakdown, 10, keywords));
        assert_eq!(report.keyword_match_percentage, Some(62));
    }
}
