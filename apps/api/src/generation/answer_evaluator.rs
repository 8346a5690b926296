use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::GenerationError;
use crate::generation::generator::{
    check_score, clean_list, llm_failure, require_text, GenerationContext, Generator,
};
use crate::generation::prompts::{ANSWER_EVALUATION_TEMPLATE, ANSWER_EVALUATOR_PERSONA};
use crate::llm_client::prompts::{json_system, SCORE_RANGE_INSTRUCTION};
use crate::llm_client::{call_json, LlmProvider, LlmRequest};
use crate::models::artifact::{AnswerEvaluation, ArtifactPayload, ArtifactType, InterviewQuestion};

const MAX_ANSWER_CHARS: usize = 5000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnswerEvaluation {
    score: f64,
    overall_feedback: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
    #[serde(default)]
    missing_elements: Vec<String>,
}

pub struct AnswerEvaluator {
    llm: Arc<dyn LlmProvider>,
}

impl AnswerEvaluator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    fn answer<'a>(ctx: &'a GenerationContext<'_>) -> Result<&'a str, GenerationError> {
        let answer = ctx.options.answer.as_deref().map(str::trim).unwrap_or_default();
        if answer.is_empty() {
            return Err(GenerationError::Validation(
                "An answer is required for evaluation".to_string(),
            ));
        }
        if answer.chars().count() > MAX_ANSWER_CHARS {
            return Err(GenerationError::Validation(format!(
                "Answer exceeds {MAX_ANSWER_CHARS} characters"
            )));
        }
        Ok(answer)
    }

    async fn question(ctx: &GenerationContext<'_>) -> Result<InterviewQuestion, GenerationError> {
        let question_id = ctx.question_id().ok_or_else(|| {
            GenerationError::Validation("Answer evaluation requires a question id".to_string())
        })?;
        let prep = ctx.interview_prep().await?;
        prep.question(question_id).cloned().ok_or_else(|| {
            GenerationError::NotFound(format!(
                "Question '{question_id}' is not part of the interview prep for analysis {}",
                ctx.analysis.id
            ))
        })
    }
}

#[async_trait]
impl Generator for AnswerEvaluator {
    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::AnswerEvaluation
    }

    async fn preflight(&self, ctx: &GenerationContext<'_>) -> Result<(), GenerationError> {
        Self::answer(ctx)?;
        Self::question(ctx).await?;
        Ok(())
    }

    async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
    ) -> Result<ArtifactPayload, GenerationError> {
        let answer = Self::answer(ctx)?;
        let question = Self::question(ctx).await?;

        let tips = if question.tips.is_empty() {
            "None".to_string()
        } else {
            question.tips.join("\n")
        };
        let prompt = ANSWER_EVALUATION_TEMPLATE
            .replace("{question}", &question.question)
            .replace("{category}", question.category.as_str())
            .replace("{difficulty}", question.difficulty.as_str())
            .replace("{user_answer}", answer)
            .replace("{suggested_answer}", &question.suggested_answer)
            .replace("{tips}", &tips)
            .replace("{score_instruction}", SCORE_RANGE_INSTRUCTION);
        let system = json_system(ANSWER_EVALUATOR_PERSONA);

        let raw: RawAnswerEvaluation = call_json(
            self.llm.as_ref(),
            LlmRequest {
                model: ctx.model,
                system: &system,
                prompt: &prompt,
                max_tokens: 800,
                temperature: 0.3,
            },
        )
        .await
        .map_err(|e| llm_failure(e, ArtifactType::AnswerEvaluation))?;

        Ok(ArtifactPayload::AnswerEvaluation(AnswerEvaluation {
            question_id: question.id,
            user_answer: answer.to_string(),
            score: check_score("score", raw.score)?,
            overall_feedback: require_text("overallFeedback", raw.overall_feedback)?,
            strengths: clean_list(raw.strengths),
            improvements: clean_list(raw.improvements),
            missing_elements: clean_list(raw.missing_elements),
        }))
    }
}
