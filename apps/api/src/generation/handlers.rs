//! Axum route handlers for the Artifact API.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::billing::registry::ModelId;
use crate::errors::AppError;
use crate::generation::cache_manager::GenerateRequest;
use crate::generation::generator::GenerationOptions;
use crate::models::artifact::{ArtifactPayload, ArtifactType, CoverLetterTone, SessionEvaluation};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// Identifiers arrive as strings so unknown values surface as our own
/// validation errors rather than extractor rejections.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    pub analysis_id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub model_id: String,
    #[serde(default)]
    pub bypass_cache: bool,
    pub question_id: Option<String>,
    pub answer: Option<String>,
    pub tone: Option<CoverLetterTone>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub content: ArtifactPayload,
    pub cached: bool,
    pub usage_count: u32,
    pub credits_used: u32,
    pub shared: bool,
    pub artifact_id: Uuid,
    pub model_id: ModelId,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistsQuery {
    pub analysis_id: Uuid,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub question_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvaluationBody {
    pub user_id: Uuid,
    pub model_id: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/artifacts/generate
///
/// Serves the cached artifact for the key, or generates (and bills) a new one.
/// `bypassCache` forces regeneration; concurrent duplicates share one generation.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<GenerateResponse>, AppError> {
    let artifact_type: ArtifactType = body.artifact_type.parse()?;
    let model = state.registry.resolve(&body.model_id)?;

    // Cancels our attachment if the client goes away mid-request.
    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    let outcome = state
        .cache
        .generate(
            GenerateRequest {
                analysis_id: body.analysis_id,
                user_id: body.user_id,
                artifact_type,
                model_id: model.id,
                bypass_cache: body.bypass_cache,
                question_id: body.question_id,
                options: GenerationOptions {
                    answer: body.answer,
                    tone: body.tone,
                },
            },
            &cancel,
        )
        .await?;

    let artifact = outcome.artifact;
    Ok(Json(GenerateResponse {
        content: artifact.payload,
        cached: outcome.cached,
        usage_count: artifact.usage_count,
        credits_used: outcome.credits_used,
        shared: outcome.shared,
        artifact_id: artifact.id,
        model_id: artifact.model_id,
        updated_at: artifact.updated_at,
    }))
}

/// GET /api/v1/artifacts/exists?analysisId=&type=&questionId=
///
/// Read-only lookup against the same store the generator writes to.
pub async fn handle_check_exists(
    State(state): State<AppState>,
    Query(query): Query<ExistsQuery>,
) -> Result<Json<ExistsResponse>, AppError> {
    let artifact_type: ArtifactType = query.artifact_type.parse()?;
    let exists = state
        .cache
        .check_exists(query.analysis_id, artifact_type, query.question_id.as_deref())
        .await?;
    Ok(Json(ExistsResponse { exists }))
}

/// POST /api/v1/analyses/:id/session-evaluation
///
/// Fails with 409 and the unanswered question ids until every interview
/// question has an answer evaluation.
pub async fn handle_evaluate_session(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
    Json(body): Json<SessionEvaluationBody>,
) -> Result<Json<SessionEvaluation>, AppError> {
    let model_id = body
        .model_id
        .as_deref()
        .map(|raw| state.registry.resolve(raw).map(|m| m.id))
        .transpose()?;

    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    let evaluation = state
        .cache
        .evaluate_session(analysis_id, body.user_id, model_id, &cancel)
        .await?;
    Ok(Json(evaluation))
}
