use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::billing::registry::ModelId;
use crate::errors::GenerationError;

// ────────────────────────────────────────────────────────────────────────────
// Artifact type + cache key
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    OptimizedResume,
    CoverLetter,
    InterviewPrep,
    AnswerEvaluation,
    SessionEvaluation,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 5] = [
        ArtifactType::OptimizedResume,
        ArtifactType::CoverLetter,
        ArtifactType::InterviewPrep,
        ArtifactType::AnswerEvaluation,
        ArtifactType::SessionEvaluation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::OptimizedResume => "optimized-resume",
            ArtifactType::CoverLetter => "cover-letter",
            ArtifactType::InterviewPrep => "interview-prep",
            ArtifactType::AnswerEvaluation => "answer-evaluation",
            ArtifactType::SessionEvaluation => "session-evaluation",
        }
    }

    /// Artifacts built on top of an analysis's interview prep. They are only
    /// meaningful for the prep they were generated against.
    pub fn depends_on_interview_prep(&self) -> bool {
        matches!(
            self,
            ArtifactType::AnswerEvaluation | ArtifactType::SessionEvaluation
        )
    }

    /// AnswerEvaluation is the only type keyed per question.
    pub fn is_per_question(&self) -> bool {
        matches!(self, ArtifactType::AnswerEvaluation)
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| GenerationError::Validation(format!("Unknown artifact type '{s}'")))
    }
}

/// Identity of a cached artifact. The model is deliberately not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub analysis_id: Uuid,
    pub artifact_type: ArtifactType,
    pub question_id: Option<String>,
}

impl CacheKey {
    /// Builds a key, requiring `question_id` for per-question types and
    /// dropping it for singleton types.
    pub fn new(
        analysis_id: Uuid,
        artifact_type: ArtifactType,
        question_id: Option<&str>,
    ) -> Result<Self, GenerationError> {
        let question_id = if artifact_type.is_per_question() {
            match question_id.map(str::trim) {
                Some(q) if !q.is_empty() => Some(q.to_string()),
                _ => {
                    return Err(GenerationError::Validation(format!(
                        "questionId is required for {artifact_type}"
                    )))
                }
            }
        } else {
            None
        };

        Ok(CacheKey {
            analysis_id,
            artifact_type,
            question_id,
        })
    }

    /// Column value used in the unique index; empty for singleton types.
    pub fn question_key(&self) -> &str {
        self.question_id.as_deref().unwrap_or("")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.question_id {
            Some(q) => write!(f, "{}/{}/{}", self.analysis_id, self.artifact_type, q),
            None => write!(f, "{}/{}", self.analysis_id, self.artifact_type),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Payloads
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedResume {
    pub content: String,
    pub ats_score: u32,
    #[serde(default)]
    pub keywords_matched: Vec<String>,
    #[serde(default)]
    pub optimization_suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverLetterTone {
    #[default]
    Professional,
    Enthusiastic,
    Conversational,
}

impl CoverLetterTone {
    pub fn describe(&self) -> &'static str {
        match self {
            CoverLetterTone::Professional => "Professional and confident",
            CoverLetterTone::Enthusiastic => "Enthusiastic and energetic",
            CoverLetterTone::Conversational => "Conversational but professional",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverLetter {
    pub content: String,
    pub tone: CoverLetterTone,
    pub word_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionCategory {
    Behavioral,
    Technical,
    Situational,
    General,
}

impl QuestionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionCategory::Behavioral => "behavioral",
            QuestionCategory::Technical => "technical",
            QuestionCategory::Situational => "situational",
            QuestionCategory::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewQuestion {
    pub id: String,
    pub question: String,
    pub category: QuestionCategory,
    pub difficulty: Difficulty,
    pub suggested_answer: String,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewPrep {
    pub questions: Vec<InterviewQuestion>,
    #[serde(default)]
    pub overall_tips: Vec<String>,
    #[serde(default)]
    pub company_research: Vec<String>,
    #[serde(default)]
    pub salary_negotiation: Vec<String>,
}

impl InterviewPrep {
    pub fn question(&self, question_id: &str) -> Option<&InterviewQuestion> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEvaluation {
    pub question_id: String,
    pub user_answer: String,
    pub score: u32,
    pub overall_feedback: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub missing_elements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEvaluation {
    pub question_id: String,
    pub score: u32,
    pub feedback: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(default)]
    pub strongest_areas: Vec<String>,
    #[serde(default)]
    pub improvement_areas: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    pub overall_feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvaluation {
    pub overall_score: u32,
    pub question_evaluations: Vec<QuestionEvaluation>,
    pub session_summary: SessionSummary,
}

/// Type-specific artifact content. Serializes as the bare inner object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArtifactPayload {
    OptimizedResume(OptimizedResume),
    CoverLetter(CoverLetter),
    InterviewPrep(InterviewPrep),
    AnswerEvaluation(AnswerEvaluation),
    SessionEvaluation(SessionEvaluation),
}

impl ArtifactPayload {
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            ArtifactPayload::OptimizedResume(_) => ArtifactType::OptimizedResume,
            ArtifactPayload::CoverLetter(_) => ArtifactType::CoverLetter,
            ArtifactPayload::InterviewPrep(_) => ArtifactType::InterviewPrep,
            ArtifactPayload::AnswerEvaluation(_) => ArtifactType::AnswerEvaluation,
            ArtifactPayload::SessionEvaluation(_) => ArtifactType::SessionEvaluation,
        }
    }

    /// Decodes stored JSON using the type column to pick the shape.
    pub fn from_json(
        artifact_type: ArtifactType,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match artifact_type {
            ArtifactType::OptimizedResume => {
                ArtifactPayload::OptimizedResume(serde_json::from_value(value)?)
            }
            ArtifactType::CoverLetter => ArtifactPayload::CoverLetter(serde_json::from_value(value)?),
            ArtifactType::InterviewPrep => {
                ArtifactPayload::InterviewPrep(serde_json::from_value(value)?)
            }
            ArtifactType::AnswerEvaluation => {
                ArtifactPayload::AnswerEvaluation(serde_json::from_value(value)?)
            }
            ArtifactType::SessionEvaluation => {
                ArtifactPayload::SessionEvaluation(serde_json::from_value(value)?)
            }
        })
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Persisted artifact
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub id: Uuid,
    pub analysis_id: Uuid,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub question_id: Option<String>,
    pub model_id: ModelId,
    pub payload: ArtifactPayload,
    pub usage_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GeneratedArtifact {
    pub fn key(&self) -> CacheKey {
        CacheKey {
            analysis_id: self.analysis_id,
            artifact_type: self.artifact_type,
            question_id: self.question_id.clone(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRow {
    pub id: Uuid,
    pub analysis_id: Uuid,
    pub artifact_type: String,
    pub question_key: String,
    pub model_id: String,
    pub payload: serde_json::Value,
    pub usage_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ArtifactRow> for GeneratedArtifact {
    type Error = GenerationError;

    fn try_from(row: ArtifactRow) -> Result<Self, Self::Error> {
        let artifact_type: ArtifactType = row
            .artifact_type
            .parse()
            .map_err(|_| GenerationError::Storage(format!("Bad artifact type '{}'", row.artifact_type)))?;
        let model_id: ModelId = row
            .model_id
            .parse()
            .map_err(|_| GenerationError::Storage(format!("Bad model id '{}'", row.model_id)))?;
        let payload = ArtifactPayload::from_json(artifact_type, row.payload).map_err(|e| {
            GenerationError::Storage(format!("Corrupt payload for artifact {}: {e}", row.id))
        })?;

        Ok(GeneratedArtifact {
            id: row.id,
            analysis_id: row.analysis_id,
            artifact_type,
            question_id: (!row.question_key.is_empty()).then_some(row.question_key),
            model_id,
            payload,
            usage_count: row.usage_count.max(1) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
