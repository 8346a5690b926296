use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::GenerationError;
use crate::generation::generator::{
    analysis_summary, job_description_excerpt, llm_failure, require_text, resume_excerpt,
    GenerationContext, Generator,
};
use crate::generation::prompts::{COVER_LETTER_PERSONA, COVER_LETTER_TEMPLATE};
use crate::llm_client::prompts::json_system;
use crate::llm_client::{call_json, LlmProvider, LlmRequest};
use crate::models::artifact::{ArtifactPayload, ArtifactType, CoverLetter};

#[derive(Debug, Deserialize)]
struct RawCoverLetter {
    content: String,
}

pub struct CoverLetterGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl CoverLetterGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Generator for CoverLetterGenerator {
    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::CoverLetter
    }

    async fn preflight(&self, ctx: &GenerationContext<'_>) -> Result<(), GenerationError> {
        if job_description_excerpt(ctx.analysis).is_none() {
            return Err(GenerationError::Validation(
                "A cover letter needs a job description on the analysis".to_string(),
            ));
        }
        Ok(())
    }

    async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
    ) -> Result<ArtifactPayload, GenerationError> {
        let job_description = job_description_excerpt(ctx.analysis).ok_or_else(|| {
            GenerationError::Validation("Analysis has no job description".to_string())
        })?;
        let tone = ctx.options.tone.unwrap_or_default();

        let prompt = COVER_LETTER_TEMPLATE
            .replace("{resume_text}", &resume_excerpt(ctx.analysis))
            .replace("{job_description}", &job_description)
            .replace("{analysis_insights}", &analysis_summary(ctx.analysis))
            .replace("{tone}", tone.describe());
        let system = json_system(COVER_LETTER_PERSONA);

        let raw: RawCoverLetter = call_json(
            self.llm.as_ref(),
            LlmRequest {
                model: ctx.model,
                system: &system,
                prompt: &prompt,
                max_tokens: 1500,
                temperature: 0.7,
            },
        )
        .await
        .map_err(|e| llm_failure(e, ArtifactType::CoverLetter))?;

        let content = require_text("content", raw.content.trim().to_string())?;
        let word_count = content.split_whitespace().count() as u32;

        Ok(ArtifactPayload::CoverLetter(CoverLetter {
            content,
            tone,
            word_count,
        }))
    }
}
