//! Session Aggregator — whole-session interview evaluation.
//!
//! Gated on every interview question having a stored answer evaluation.
//! A partial session is never sent to the model.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::GenerationError;
use crate::generation::generator::{
    check_score, clean_list, llm_failure, require_text, GenerationContext, Generator,
};
use crate::generation::prompts::{SESSION_EVALUATION_TEMPLATE, SESSION_EVALUATOR_PERSONA};
use crate::llm_client::prompts::{json_system, SCORE_RANGE_INSTRUCTION};
use crate::llm_client::{call_json, LlmProvider, LlmRequest};
use crate::models::artifact::{
    AnswerEvaluation, ArtifactPayload, ArtifactType, InterviewPrep, QuestionEvaluation,
    SessionEvaluation, SessionSummary,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestionEvaluation {
    question_id: String,
    score: f64,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSessionEvaluation {
    overall_score: f64,
    #[serde(default)]
    question_evaluations: Vec<RawQuestionEvaluation>,
    session_summary: SessionSummary,
}

/// The interview prep plus one stored evaluation per question, in question order.
struct AnsweredSession {
    prep: InterviewPrep,
    answers: Vec<AnswerEvaluation>,
}

pub struct SessionAggregator {
    llm: Arc<dyn LlmProvider>,
}

impl SessionAggregator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    async fn answered_session(
        ctx: &GenerationContext<'_>,
    ) -> Result<AnsweredSession, GenerationError> {
        let prep = ctx.interview_prep().await?;

        let mut by_question: HashMap<String, AnswerEvaluation> = ctx
            .artifacts
            .answer_evaluations(ctx.analysis.id)
            .await?
            .into_iter()
            .filter_map(|artifact| match artifact.payload {
                ArtifactPayload::AnswerEvaluation(eval) => Some((eval.question_id.clone(), eval)),
                _ => None,
            })
            .collect();

        let missing: Vec<String> = prep
            .questions
            .iter()
            .filter(|q| !by_question.contains_key(&q.id))
            .map(|q| q.id.clone())
            .collect();
        if !missing.is_empty() {
            return Err(GenerationError::Precondition {
                missing_question_ids: missing,
            });
        }

        let answers = prep
            .questions
            .iter()
            .filter_map(|q| by_question.remove(&q.id))
            .collect();
        Ok(AnsweredSession { prep, answers })
    }
}

#[async_trait]
impl Generator for SessionAggregator {
    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::SessionEvaluation
    }

    async fn preflight(&self, ctx: &GenerationContext<'_>) -> Result<(), GenerationError> {
        Self::answered_session(ctx).await.map(|_| ())
    }

    async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
    ) -> Result<ArtifactPayload, GenerationError> {
        let session = Self::answered_session(ctx).await?;

        let categories: BTreeSet<&str> = session
            .prep
            .questions
            .iter()
            .map(|q| q.category.as_str())
            .collect();
        let transcript = session
            .prep
            .questions
            .iter()
            .zip(&session.answers)
            .enumerate()
            .map(|(i, (q, a))| {
                format!(
                    "Question {n} [id: {id}] ({category}, {difficulty})\nQ: {question}\nA: {answer}\nPer-answer score: {score}/100",
                    n = i + 1,
                    id = q.id,
                    category = q.category.as_str(),
                    difficulty = q.difficulty.as_str(),
                    question = q.question,
                    answer = a.user_answer,
                    score = a.score,
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = SESSION_EVALUATION_TEMPLATE
            .replace("{question_count}", &session.prep.questions.len().to_string())
            .replace("{categories}", &categories.into_iter().collect::<Vec<_>>().join(", "))
            .replace("{transcript}", &transcript)
            .replace("{score_instruction}", SCORE_RANGE_INSTRUCTION);
        let system = json_system(SESSION_EVALUATOR_PERSONA);

        let raw: RawSessionEvaluation = call_json(
            self.llm.as_ref(),
            LlmRequest {
                model: ctx.model,
                system: &system,
                prompt: &prompt,
                max_tokens: 3000,
                temperature: 0.3,
            },
        )
        .await
        .map_err(|e| llm_failure(e, ArtifactType::SessionEvaluation))?;

        let evaluation = assemble(raw, &session)?;
        info!(
            "Session evaluation for analysis {}: {}/100 over {} questions",
            ctx.analysis.id,
            evaluation.overall_score,
            evaluation.question_evaluations.len()
        );

        Ok(ArtifactPayload::SessionEvaluation(evaluation))
    }
}

/// Validates the model's reply and lines it up with the session's questions.
/// Questions the model skipped fall back to their stored per-answer evaluation.
fn assemble(
    raw: RawSessionEvaluation,
    session: &AnsweredSession,
) -> Result<SessionEvaluation, GenerationError> {
    let overall_score = check_score("overallScore", raw.overall_score)?;

    let known: HashSet<&str> = session.prep.questions.iter().map(|q| q.id.as_str()).collect();
    let mut from_model: HashMap<String, QuestionEvaluation> = HashMap::new();
    for q in raw.question_evaluations {
        if !known.contains(q.question_id.as_str()) {
            return Err(GenerationError::Validation(format!(
                "Session evaluation refers to unknown question '{}'",
                q.question_id
            )));
        }
        let evaluation = QuestionEvaluation {
            score: check_score("questionEvaluations.score", q.score)?,
            feedback: q.feedback,
            strengths: clean_list(q.strengths),
            improvements: clean_list(q.improvements),
            question_id: q.question_id,
        };
        from_model.entry(evaluation.question_id.clone()).or_insert(evaluation);
    }

    let question_evaluations = session
        .answers
        .iter()
        .map(|answer| {
            from_model.remove(&answer.question_id).unwrap_or_else(|| {
                warn!(
                    "Model skipped question {}; using stored evaluation",
                    answer.question_id
                );
                QuestionEvaluation {
                    question_id: answer.question_id.clone(),
                    score: answer.score,
                    feedback: answer.overall_feedback.clone(),
                    strengths: answer.strengths.clone(),
                    improvements: answer.improvements.clone(),
                }
            })
        })
        .collect();

    let summary = raw.session_summary;
    Ok(SessionEvaluation {
        overall_score,
        question_evaluations,
        session_summary: SessionSummary {
            strongest_areas: clean_list(summary.strongest_areas),
            improvement_areas: clean_list(summary.improvement_areas),
            next_steps: clean_list(summary.next_steps),
            overall_feedback: require_text("sessionSummary.overallFeedback", summary.overall_feedback)?,
        },
    })
}
