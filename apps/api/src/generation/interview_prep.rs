use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::GenerationError;
use crate::generation::generator::{
    analysis_summary, clean_list, job_description_excerpt, llm_failure, require_text,
    resume_excerpt, GenerationContext, Generator,
};
use crate::generation::prompts::{
    INTERVIEW_PREP_PERSONA, INTERVIEW_PREP_TEMPLATE, JOB_CONTEXT_WITHOUT_JD, JOB_CONTEXT_WITH_JD,
};
use crate::llm_client::prompts::json_system;
use crate::llm_client::{call_json, LlmProvider, LlmRequest};
use crate::models::artifact::{
    ArtifactPayload, ArtifactType, Difficulty, InterviewPrep, InterviewQuestion, QuestionCategory,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    #[serde(default)]
    id: Option<String>,
    question: String,
    category: QuestionCategory,
    difficulty: Difficulty,
    suggested_answer: String,
    #[serde(default)]
    tips: Vec<String>,
    #[serde(default)]
    follow_up_questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInterviewPrep {
    questions: Vec<RawQuestion>,
    #[serde(default)]
    overall_tips: Vec<String>,
    #[serde(default)]
    company_research: Vec<String>,
    #[serde(default)]
    salary_negotiation: Vec<String>,
}

pub struct InterviewPrepGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl InterviewPrepGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Generator for InterviewPrepGenerator {
    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::InterviewPrep
    }

    async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
    ) -> Result<ArtifactPayload, GenerationError> {
        let job_context = match job_description_excerpt(ctx.analysis) {
            Some(jd) => JOB_CONTEXT_WITH_JD.replace("{job_description}", &jd),
            None => JOB_CONTEXT_WITHOUT_JD.to_string(),
        };

        let prompt = INTERVIEW_PREP_TEMPLATE
            .replace("{resume_text}", &resume_excerpt(ctx.analysis))
            .replace("{job_context}", &job_context)
            .replace("{analysis_summary}", &analysis_summary(ctx.analysis));
        let system = json_system(INTERVIEW_PREP_PERSONA);

        let raw: RawInterviewPrep = call_json(
            self.llm.as_ref(),
            LlmRequest {
                model: ctx.model,
                system: &system,
                prompt: &prompt,
                max_tokens: 6000,
                temperature: 0.7,
            },
        )
        .await
        .map_err(|e| llm_failure(e, ArtifactType::InterviewPrep))?;

        let prep = normalize(raw)?;
        info!(
            "Generated {} interview questions for analysis {}",
            prep.questions.len(),
            ctx.analysis.id
        );

        Ok(ArtifactPayload::InterviewPrep(prep))
    }
}

/// Assigns `question_<n>` ids where the model omitted them and rejects
/// sets that are empty or reuse an id.
fn normalize(raw: RawInterviewPrep) -> Result<InterviewPrep, GenerationError> {
    if raw.questions.is_empty() {
        return Err(GenerationError::Validation(
            "Interview prep contains no questions".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut questions = Vec::with_capacity(raw.questions.len());
    for (index, q) in raw.questions.into_iter().enumerate() {
        let id = match q.id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => {
                debug!("Question {} had no id; assigning one", index + 1);
                format!("question_{}", index + 1)
            }
        };
        if !seen.insert(id.clone()) {
            return Err(GenerationError::Validation(format!(
                "Duplicate interview question id '{id}'"
            )));
        }

        questions.push(InterviewQuestion {
            id,
            question: require_text("question", q.question)?,
            category: q.category,
            difficulty: q.difficulty,
            suggested_answer: q.suggested_answer,
            tips: clean_list(q.tips),
            follow_up_questions: clean_list(q.follow_up_questions),
        });
    }

    Ok(InterviewPrep {
        questions,
        overall_tips: clean_list(raw.overall_tips),
        company_research: clean_list(raw.company_research),
        salary_negotiation: clean_list(raw.salary_negotiation),
    })
}
