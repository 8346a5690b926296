//! Artifact Store — persisted generation results, one row per cache key.
//!
//! Writes are whole-row: a reader never sees a payload from one generation
//! paired with metadata from another.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::billing::registry::ModelId;
use crate::errors::GenerationError;
use crate::models::artifact::{
    ArtifactPayload, ArtifactRow, ArtifactType, CacheKey, GeneratedArtifact,
};

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<GeneratedArtifact>, GenerationError>;

    /// Bumps `usage_count` and returns the updated artifact, or `None` if absent.
    async fn record_hit(&self, key: &CacheKey)
        -> Result<Option<GeneratedArtifact>, GenerationError>;

    /// Inserts a fresh artifact or replaces the payload of the existing one.
    /// Either way `usage_count` is 1 afterwards; `id` and `created_at` survive replacement.
    ///
    /// Storing an interview prep deletes the analysis's answer and session
    /// evaluations in the same write, since their question ids refer to the old prep.
    async fn upsert(
        &self,
        key: &CacheKey,
        model_id: ModelId,
        payload: ArtifactPayload,
        now: DateTime<Utc>,
    ) -> Result<GeneratedArtifact, GenerationError>;

    /// Every persisted answer evaluation for an analysis.
    async fn answer_evaluations(
        &self,
        analysis_id: Uuid,
    ) -> Result<Vec<GeneratedArtifact>, GenerationError>;

    async fn exists(&self, key: &CacheKey) -> Result<bool, GenerationError> {
        Ok(self.get(key).await?.is_some())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<CacheKey, GeneratedArtifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<GeneratedArtifact>, GenerationError> {
        let artifacts = self.artifacts.read().unwrap_or_else(|e| e.into_inner());
        Ok(artifacts.get(key).cloned())
    }

    async fn record_hit(
        &self,
        key: &CacheKey,
    ) -> Result<Option<GeneratedArtifact>, GenerationError> {
        let mut artifacts = self.artifacts.write().unwrap_or_else(|e| e.into_inner());
        Ok(artifacts.get_mut(key).map(|artifact| {
            artifact.usage_count += 1;
            artifact.clone()
        }))
    }

    async fn upsert(
        &self,
        key: &CacheKey,
        model_id: ModelId,
        payload: ArtifactPayload,
        now: DateTime<Utc>,
    ) -> Result<GeneratedArtifact, GenerationError> {
        if payload.artifact_type() != key.artifact_type {
            return Err(GenerationError::Validation(format!(
                "Payload of type {} cannot be stored under {key}",
                payload.artifact_type()
            )));
        }

        let mut artifacts = self.artifacts.write().unwrap_or_else(|e| e.into_inner());
        if key.artifact_type == ArtifactType::InterviewPrep {
            let before = artifacts.len();
            artifacts.retain(|k, _| {
                k.analysis_id != key.analysis_id || !k.artifact_type.depends_on_interview_prep()
            });
            let cleared = before - artifacts.len();
            if cleared > 0 {
                info!(
                    "Cleared {cleared} evaluations superseded by new interview prep for {}",
                    key.analysis_id
                );
            }
        }
        let (id, created_at) = artifacts
            .get(key)
            .map(|a| (a.id, a.created_at))
            .unwrap_or_else(|| (Uuid::new_v4(), now));

        let artifact = GeneratedArtifact {
            id,
            analysis_id: key.analysis_id,
            artifact_type: key.artifact_type,
            question_id: key.question_id.clone(),
            model_id,
            payload,
            usage_count: 1,
            created_at,
            updated_at: now,
        };
        artifacts.insert(key.clone(), artifact.clone());
        Ok(artifact)
    }

    async fn answer_evaluations(
        &self,
        analysis_id: Uuid,
    ) -> Result<Vec<GeneratedArtifact>, GenerationError> {
        let artifacts = self.artifacts.read().unwrap_or_else(|e| e.into_inner());
        Ok(artifacts
            .values()
            .filter(|a| {
                a.analysis_id == analysis_id && a.artifact_type == ArtifactType::AnswerEvaluation
            })
            .cloned()
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL store
// ────────────────────────────────────────────────────────────────────────────

pub struct PgArtifactStore {
    pool: PgPool,
}

impl PgArtifactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<GeneratedArtifact>, GenerationError> {
        sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT * FROM generated_artifacts
            WHERE analysis_id = $1 AND artifact_type = $2 AND question_key = $3
            "#,
        )
        .bind(key.analysis_id)
        .bind(key.artifact_type.as_str())
        .bind(key.question_key())
        .fetch_optional(&self.pool)
        .await?
        .map(GeneratedArtifact::try_from)
        .transpose()
    }

    async fn record_hit(
        &self,
        key: &CacheKey,
    ) -> Result<Option<GeneratedArtifact>, GenerationError> {
        sqlx::query_as::<_, ArtifactRow>(
            r#"
            UPDATE generated_artifacts
            SET usage_count = usage_count + 1
            WHERE analysis_id = $1 AND artifact_type = $2 AND question_key = $3
            RETURNING *
            "#,
        )
        .bind(key.analysis_id)
        .bind(key.artifact_type.as_str())
        .bind(key.question_key())
        .fetch_optional(&self.pool)
        .await?
        .map(GeneratedArtifact::try_from)
        .transpose()
    }

    async fn upsert(
        &self,
        key: &CacheKey,
        model_id: ModelId,
        payload: ArtifactPayload,
        now: DateTime<Utc>,
    ) -> Result<GeneratedArtifact, GenerationError> {
        if payload.artifact_type() != key.artifact_type {
            return Err(GenerationError::Validation(format!(
                "Payload of type {} cannot be stored under {key}",
                payload.artifact_type()
            )));
        }
        let payload_json = payload
            .to_json()
            .map_err(|e| GenerationError::Storage(format!("Failed to serialize payload: {e}")))?;

        let mut tx = self.pool.begin().await?;
        if key.artifact_type == ArtifactType::InterviewPrep {
            let cleared = sqlx::query(
                r#"
                DELETE FROM generated_artifacts
                WHERE analysis_id = $1 AND artifact_type IN ($2, $3)
                "#,
            )
            .bind(key.analysis_id)
            .bind(ArtifactType::AnswerEvaluation.as_str())
            .bind(ArtifactType::SessionEvaluation.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if cleared > 0 {
                info!(
                    "Cleared {cleared} evaluations superseded by new interview prep for {}",
                    key.analysis_id
                );
            }
        }

        let row = sqlx::query_as::<_, ArtifactRow>(
            r#"
            INSERT INTO generated_artifacts
                (id, analysis_id, artifact_type, question_key, model_id, payload,
                 usage_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 1, $7, $7)
            ON CONFLICT (analysis_id, artifact_type, question_key) DO UPDATE
            SET model_id = EXCLUDED.model_id,
                payload = EXCLUDED.payload,
                usage_count = 1,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key.analysis_id)
        .bind(key.artifact_type.as_str())
        .bind(key.question_key())
        .bind(model_id.as_str())
        .bind(&payload_json)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        GeneratedArtifact::try_from(row)
    }

    async fn answer_evaluations(
        &self,
        analysis_id: Uuid,
    ) -> Result<Vec<GeneratedArtifact>, GenerationError> {
        sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT * FROM generated_artifacts
            WHERE analysis_id = $1 AND artifact_type = $2
            ORDER BY question_key
            "#,
        )
        .bind(analysis_id)
        .bind(ArtifactType::AnswerEvaluation.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(GeneratedArtifact::try_from)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::artifact::{
        AnswerEvaluation, CoverLetter, CoverLetterTone, InterviewPrep, SessionEvaluation,
        SessionSummary,
    };

    fn letter(text: &str) -> ArtifactPayload {
        ArtifactPayload::CoverLetter(CoverLetter {
            content: text.to_string(),
            tone: CoverLetterTone::Professional,
            word_count: text.split_whitespace().count() as u32,
        })
    }

    #[tokio::test]
    async fn test_upsert_then_hit_increments_usage() {
        let store = InMemoryArtifactStore::new();
        let key = CacheKey::new(Uuid::new_v4(), ArtifactType::CoverLetter, None).unwrap();

        assert!(!store.exists(&key).await.unwrap());
        assert!(store.record_hit(&key).await.unwrap().is_none());

        let first = store
            .upsert(&key, ModelId::Gpt41Mini, letter("v1"), Utc::now())
            .await
            .unwrap();
        assert_eq!(first.usage_count, 1);

        let hit = store.record_hit(&key).await.unwrap().unwrap();
        assert_eq!(hit.usage_count, 2);
        assert_eq!(hit.id, first.id);
    }

    #[tokio::test]
    async fn test_replace_keeps_identity_and_resets_usage() {
        let store = InMemoryArtifactStore::new();
        let key = CacheKey::new(Uuid::new_v4(), ArtifactType::CoverLetter, None).unwrap();
        let t0 = Utc::now();

        let first = store.upsert(&key, ModelId::Gpt41Mini, letter("v1"), t0).await.unwrap();
        store.record_hit(&key).await.unwrap();

        let t1 = t0 + chrono::Duration::seconds(30);
        let second = store
            .upsert(&key, ModelId::ClaudeSonnet4, letter("v2"), t1)
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, t0);
        assert_eq!(second.updated_at, t1);
        assert_eq!(second.usage_count, 1);
        assert_eq!(second.model_id, ModelId::ClaudeSonnet4);
        assert_eq!(second.payload, letter("v2"));
    }

    #[tokio::test]
    async fn test_mismatched_payload_rejected() {
        let store = InMemoryArtifactStore::new();
        let key = CacheKey::new(Uuid::new_v4(), ArtifactType::OptimizedResume, None).unwrap();
        let err = store
            .upsert(&key, ModelId::Gpt41Mini, letter("oops"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
        assert!(!store.exists(&key).await.unwrap());
    }

    fn prep() -> ArtifactPayload {
        ArtifactPayload::InterviewPrep(InterviewPrep {
            questions: vec![],
            overall_tips: vec![],
            company_research: vec![],
            salary_negotiation: vec![],
        })
    }

    fn evaluation(question_id: &str) -> ArtifactPayload {
        ArtifactPayload::AnswerEvaluation(AnswerEvaluation {
            question_id: question_id.into(),
            user_answer: "We sharded the queue".into(),
            score: 70,
            overall_feedback: "Fine".into(),
            strengths: vec![],
            improvements: vec![],
            missing_elements: vec![],
        })
    }

    #[tokio::test]
    async fn test_new_interview_prep_clears_dependent_evaluations() {
        let store = InMemoryArtifactStore::new();
        let now = Utc::now();
        let (mine, other) = (Uuid::new_v4(), Uuid::new_v4());
        let model = ModelId::Gpt41Mini;

        let prep_key = CacheKey::new(mine, ArtifactType::InterviewPrep, None).unwrap();
        let eval_key = CacheKey::new(mine, ArtifactType::AnswerEvaluation, Some("q1")).unwrap();
        let session_key = CacheKey::new(mine, ArtifactType::SessionEvaluation, None).unwrap();
        let letter_key = CacheKey::new(mine, ArtifactType::CoverLetter, None).unwrap();
        let other_eval = CacheKey::new(other, ArtifactType::AnswerEvaluation, Some("q1")).unwrap();

        store.upsert(&prep_key, model, prep(), now).await.unwrap();
        store.upsert(&eval_key, model, evaluation("q1"), now).await.unwrap();
        store.upsert(&other_eval, model, evaluation("q1"), now).await.unwrap();
        store.upsert(&letter_key, model, letter("hi"), now).await.unwrap();
        let session = SessionEvaluation {
            overall_score: 70,
            question_evaluations: vec![],
            session_summary: SessionSummary {
                strongest_areas: vec![],
                improvement_areas: vec![],
                next_steps: vec![],
                overall_feedback: "Ok".into(),
            },
        };
        store
            .upsert(&session_key, model, ArtifactPayload::SessionEvaluation(session), now)
            .await
            .unwrap();

        store.upsert(&prep_key, model, prep(), now).await.unwrap();

        assert!(!store.exists(&eval_key).await.unwrap());
        assert!(!store.exists(&session_key).await.unwrap());
        assert!(store.answer_evaluations(mine).await.unwrap().is_empty());
        assert!(store.exists(&prep_key).await.unwrap());
        assert!(store.exists(&letter_key).await.unwrap());
        assert!(store.exists(&other_eval).await.unwrap());
    }
}
