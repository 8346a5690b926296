//! Generator seam — one implementation per artifact type.
//!
//! A generator turns an analysis (plus per-request options) into a typed,
//! validated payload. It never touches credits or the cache; the cache
//! manager owns both. Generators may read previously stored artifacts
//! (interview prep, answer evaluations) through the context's store handle.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::billing::registry::ModelDescriptor;
use crate::errors::GenerationError;
use crate::generation::store::ArtifactStore;
use crate::llm_client::{LlmError, LlmProvider};
use crate::models::analysis::AnalysisRecord;
use crate::models::artifact::{
    ArtifactPayload, ArtifactType, CacheKey, CoverLetterTone, InterviewPrep,
};

use super::{
    answer_evaluator::AnswerEvaluator, cover_letter::CoverLetterGenerator,
    interview_prep::InterviewPrepGenerator, resume_optimizer::ResumeOptimizer,
    session_aggregator::SessionAggregator,
};

/// Résumé text beyond this many characters is cut before prompting.
pub const MAX_RESUME_CHARS: usize = 8000;
/// Job description text beyond this many characters is cut before prompting.
pub const MAX_JOB_DESCRIPTION_CHARS: usize = 4000;

const TRUNCATION_MARKER: &str = "\n[...truncated]";

// ────────────────────────────────────────────────────────────────────────────
// Context
// ────────────────────────────────────────────────────────────────────────────

/// Per-request knobs that do not participate in the cache key.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// The candidate's answer. Required for answer evaluation.
    pub answer: Option<String>,
    pub tone: Option<CoverLetterTone>,
}

/// Everything a generator may read while producing one artifact.
#[derive(Clone, Copy)]
pub struct GenerationContext<'a> {
    pub analysis: &'a AnalysisRecord,
    pub key: &'a CacheKey,
    pub model: &'a ModelDescriptor,
    pub options: &'a GenerationOptions,
    pub artifacts: &'a dyn ArtifactStore,
}

impl GenerationContext<'_> {
    pub fn question_id(&self) -> Option<&str> {
        self.key.question_id.as_deref()
    }

    /// The stored interview prep for this analysis. Absent prep is a `NotFound`.
    pub async fn interview_prep(&self) -> Result<InterviewPrep, GenerationError> {
        let key = CacheKey::new(self.analysis.id, ArtifactType::InterviewPrep, None)?;
        match self.artifacts.get(&key).await? {
            Some(artifact) => match artifact.payload {
                ArtifactPayload::InterviewPrep(prep) => Ok(prep),
                other => Err(GenerationError::Storage(format!(
                    "Artifact {} holds a {} payload",
                    artifact.id,
                    other.artifact_type()
                ))),
            },
            None => Err(GenerationError::NotFound(format!(
                "No interview prep exists for analysis {}",
                self.analysis.id
            ))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Generator: Send + Sync {
    fn artifact_type(&self) -> ArtifactType;

    /// Checks that must pass before any credit is reserved.
    async fn preflight(&self, _ctx: &GenerationContext<'_>) -> Result<(), GenerationError> {
        Ok(())
    }

    async fn generate(&self, ctx: &GenerationContext<'_>)
        -> Result<ArtifactPayload, GenerationError>;
}

/// Lookup table from artifact type to its generator.
#[derive(Clone)]
pub struct GeneratorSet {
    generators: HashMap<ArtifactType, Arc<dyn Generator>>,
}

impl GeneratorSet {
    /// All five production generators sharing one LLM provider.
    pub fn standard(llm: Arc<dyn LlmProvider>) -> Self {
        Self::from_generators(vec![
            Arc::new(ResumeOptimizer::new(llm.clone())),
            Arc::new(CoverLetterGenerator::new(llm.clone())),
            Arc::new(InterviewPrepGenerator::new(llm.clone())),
            Arc::new(AnswerEvaluator::new(llm.clone())),
            Arc::new(SessionAggregator::new(llm)),
        ])
    }

    pub fn from_generators(generators: Vec<Arc<dyn Generator>>) -> Self {
        Self {
            generators: generators
                .into_iter()
                .map(|g| (g.artifact_type(), g))
                .collect(),
        }
    }

    pub fn get(&self, artifact_type: ArtifactType) -> Result<Arc<dyn Generator>, GenerationError> {
        self.generators.get(&artifact_type).cloned().ok_or_else(|| {
            GenerationError::Validation(format!("No generator registered for {artifact_type}"))
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared helpers
// ────────────────────────────────────────────────────────────────────────────

/// Cuts `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(format!("{}{TRUNCATION_MARKER}", &text[..byte_idx])),
        None => Cow::Borrowed(text),
    }
}

pub fn resume_excerpt(analysis: &AnalysisRecord) -> Cow<'_, str> {
    truncate_chars(&analysis.resume_text, MAX_RESUME_CHARS)
}

pub fn job_description_excerpt(analysis: &AnalysisRecord) -> Option<Cow<'_, str>> {
    analysis
        .job_description
        .as_deref()
        .filter(|jd| !jd.trim().is_empty())
        .map(|jd| truncate_chars(jd, MAX_JOB_DESCRIPTION_CHARS))
}

/// Short digest of the analysis fed to generators as prior insight.
pub fn analysis_summary(analysis: &AnalysisRecord) -> String {
    let b = &analysis.score_breakdown;
    let km = &analysis.keyword_match;
    let mut summary = format!(
        "Overall score: {}/100\nSkills: {}/40, Experience: {}/35, Achievements: {}/20, Presentation: {}/5",
        analysis.overall_score, b.skills, b.experience, b.achievements, b.presentation
    );
    if !km.matched.is_empty() {
        summary.push_str(&format!("\nMatched keywords: {}", km.matched.join(", ")));
    }
    if !km.missing.is_empty() {
        summary.push_str(&format!("\nMissing keywords: {}", km.missing.join(", ")));
    }
    summary
}

/// Maps a provider failure onto the generation taxonomy.
/// Unparseable output is a validation failure; everything else is the provider's fault.
pub fn llm_failure(err: LlmError, artifact_type: ArtifactType) -> GenerationError {
    match err {
        LlmError::Parse(e) => GenerationError::Validation(format!(
            "Model returned malformed {artifact_type} output: {e}"
        )),
        LlmError::EmptyContent => {
            GenerationError::Validation(format!("Model returned empty {artifact_type} output"))
        }
        other => GenerationError::Generator(other.to_string()),
    }
}

/// Validates a model-reported score and converts it to an integer percentage.
pub fn check_score(field: &str, raw: f64) -> Result<u32, GenerationError> {
    if !raw.is_finite() || !(0.0..=100.0).contains(&raw) {
        return Err(GenerationError::Validation(format!(
            "{field} must be within 0..=100, got {raw}"
        )));
    }
    Ok(raw.round() as u32)
}

pub fn require_text(field: &str, value: String) -> Result<String, GenerationError> {
    if value.trim().is_empty() {
        return Err(GenerationError::Validation(format!("{field} is empty")));
    }
    Ok(value)
}

/// Drops blank entries from a model-produced list.
pub fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_leaves_short_text() {
        assert!(matches!(truncate_chars("short", 10), Cow::Borrowed("short")));
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        let text = "é".repeat(10);
        let cut = truncate_chars(&text, 4);
        assert!(cut.starts_with("éééé"));
        assert!(cut.ends_with("[...truncated]"));
        assert!(!cut.contains("ééééé"));
    }

    #[test]
    fn test_resume_excerpt_caps_length() {
        let mut analysis = testing::sample_analysis();
        analysis.resume_text = "x".repeat(MAX_RESUME_CHARS + 500);
        let excerpt = resume_excerpt(&analysis);
        assert_eq!(excerpt.chars().count(), MAX_RESUME_CHARS + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_blank_job_description_is_absent() {
        let mut analysis = testing::sample_analysis();
        analysis.job_description = Some("   ".into());
        assert!(job_description_excerpt(&analysis).is_none());
    }

    #[test]
    fn test_check_score_bounds() {
        assert_eq!(check_score("score", 0.0), Ok(0));
        assert_eq!(check_score("score", 99.6), Ok(100));
        assert!(check_score("score", 100.5).is_err());
        assert!(check_score("score", -1.0).is_err());
        assert!(check_score("score", f64::NAN).is_err());
    }

    #[test]
    fn test_llm_failure_mapping() {
        let parse = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(
            llm_failure(LlmError::Parse(parse), ArtifactType::CoverLetter),
            GenerationError::Validation(_)
        ));
        assert!(matches!(
            llm_failure(
                LlmError::Api { status: 500, message: "boom".into() },
                ArtifactType::CoverLetter
            ),
            GenerationError::Generator(_)
        ));
    }

    #[test]
    fn test_analysis_summary_mentions_missing_keywords() {
        let summary = analysis_summary(&testing::sample_analysis());
        assert!(summary.contains("Overall score: 65/100"));
        assert!(summary.contains("Missing keywords: Kubernetes"));
    }
}
