use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::errors::GenerationError;
use crate::generation::generator::{
    analysis_summary, check_score, clean_list, job_description_excerpt, llm_failure,
    require_text, resume_excerpt, GenerationContext, Generator,
};
use crate::generation::prompts::{RESUME_OPTIMIZER_PERSONA, RESUME_OPTIMIZER_TEMPLATE};
use crate::llm_client::prompts::{json_system, SCORE_RANGE_INSTRUCTION};
use crate::llm_client::{call_json, LlmProvider, LlmRequest};
use crate::models::artifact::{ArtifactPayload, ArtifactType, OptimizedResume};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOptimizedResume {
    content: String,
    ats_score: f64,
    #[serde(default)]
    keywords_matched: Vec<String>,
    #[serde(default)]
    optimization_suggestions: Vec<String>,
}

pub struct ResumeOptimizer {
    llm: Arc<dyn LlmProvider>,
}

impl ResumeOptimizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Generator for ResumeOptimizer {
    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::OptimizedResume
    }

    async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
    ) -> Result<ArtifactPayload, GenerationError> {
        let job_description = job_description_excerpt(ctx.analysis)
            .map(|jd| jd.into_owned())
            .unwrap_or_else(|| "Not provided. Optimize for general ATS readability.".to_string());

        let prompt = RESUME_OPTIMIZER_TEMPLATE
            .replace("{resume_text}", &resume_excerpt(ctx.analysis))
            .replace("{job_description}", &job_description)
            .replace("{analysis_summary}", &analysis_summary(ctx.analysis))
            .replace("{score_instruction}", SCORE_RANGE_INSTRUCTION);
        let system = json_system(RESUME_OPTIMIZER_PERSONA);

        let raw: RawOptimizedResume = call_json(
            self.llm.as_ref(),
            LlmRequest {
                model: ctx.model,
                system: &system,
                prompt: &prompt,
                max_tokens: 4000,
                temperature: 0.4,
            },
        )
        .await
        .map_err(|e| llm_failure(e, ArtifactType::OptimizedResume))?;

        let resume = OptimizedResume {
            content: require_text("content", raw.content)?,
            ats_score: check_score("atsScore", raw.ats_score)?,
            keywords_matched: clean_list(raw.keywords_matched),
            optimization_suggestions: clean_list(raw.optimization_suggestions),
        };
        info!(
            "Optimized resume for analysis {}: ATS score {}",
            ctx.analysis.id, resume.ats_score
        );

        Ok(ArtifactPayload::OptimizedResume(resume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::registry::{ModelId, ModelRegistry};
    use crate::generation::generator::{testing::sample_analysis, GenerationOptions};
    use crate::generation::store::InMemoryArtifactStore;
    use crate::llm_client::testing::ScriptedLlm;
    use crate::models::artifact::CacheKey;

    async fn run(llm: Arc<ScriptedLlm>) -> Result<ArtifactPayload, GenerationError> {
        let analysis = sample_analysis();
        let key = CacheKey::new(analysis.id, ArtifactType::OptimizedResume, None).unwrap();
        let registry = ModelRegistry::standard();
        let store = InMemoryArtifactStore::new();
        let options = GenerationOptions::default();
        let ctx = GenerationContext {
            analysis: &analysis,
            key: &key,
            model: registry.get(ModelId::Gpt41Mini).unwrap(),
            options: &options,
            artifacts: &store,
        };
        ResumeOptimizer::new(llm).generate(&ctx).await
    }

    #[tokio::test]
    async fn test_valid_reply_becomes_payload() {
        let llm = Arc::new(ScriptedLlm::replying(&[
            r##"{"content":"# Jane Doe","atsScore":81.6,"keywordsMatched":["Rust",""],"optimizationSuggestions":["Added metrics"]}"##,
        ]));
        let payload = run(llm.clone()).await.unwrap();
        match payload {
            ArtifactPayload::OptimizedResume(r) => {
                assert_eq!(r.ats_score, 82);
                assert_eq!(r.keywords_matched, vec!["Rust".to_string()]);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(llm.last_prompt().contains("Missing keywords: Kubernetes"));
    }

    #[tokio::test]
    async fn test_out_of_range_ats_score_is_rejected() {
        let llm = Arc::new(ScriptedLlm::replying(&[r#"{"content":"x","atsScore":140}"#]));
        assert!(matches!(run(llm).await, Err(GenerationError::Validation(_))));
    }

    #[tokio::test]
    async fn test_provider_failure_is_generator_error() {
        let llm = Arc::new(ScriptedLlm::failing(400));
        assert!(matches!(run(llm).await, Err(GenerationError::Generator(_))));
    }
}
