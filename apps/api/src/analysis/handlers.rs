//! Axum route handlers for the Analysis API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::analysis::scoring::{keyword_match_percentage, score_report, ScoreReport};
use crate::errors::AppError;
use crate::models::analysis::{AnalysisRecord, KeywordMatch, ResumeInput, ScoreBreakdown};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordLists {
    #[serde(default)]
    pub matched: Vec<String>,
    #[serde(default)]
    pub missing: Vec<String>,
}

/// A finished analysis handed over by the scoring step.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnalysisRequest {
    pub user_id: Uuid,
    pub resume: ResumeInput,
    pub job_description: Option<String>,
    pub score_breakdown: ScoreBreakdown,
    pub overall_score: u32,
    #[serde(default)]
    pub keywords: Option<KeywordLists>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnalysisResponse {
    pub analysis: AnalysisRecord,
    pub score_report: ScoreReport,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/analyses
///
/// Records an analysis. The résumé is normalised to text here, once; every
/// generator downstream reads `resumeText`.
pub async fn handle_create_analysis(
    State(state): State<AppState>,
    Json(request): Json<CreateAnalysisRequest>,
) -> Result<(StatusCode, Json<CreateAnalysisResponse>), AppError> {
    let record = build_record(request, chrono::Utc::now())?;
    state.analyses.insert(&record).await?;
    info!(
        "Stored analysis {} for user {} (score {})",
        record.id, record.user_id, record.overall_score
    );

    let score_report = score_report(&record);
    Ok((
        StatusCode::CREATED,
        Json(CreateAnalysisResponse {
            analysis: record,
            score_report,
        }),
    ))
}

/// GET /api/v1/analyses/:id/score-report
pub async fn handle_score_report(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
) -> Result<Json<ScoreReport>, AppError> {
    let analysis = state
        .analyses
        .get(analysis_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Analysis {analysis_id} not found")))?;
    Ok(Json(score_report(&analysis)))
}

fn build_record(
    request: CreateAnalysisRequest,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<AnalysisRecord, AppError> {
    let resume_text = request.resume.into_text();
    if resume_text.trim().is_empty() {
        return Err(AppError::Validation("resume cannot be empty".to_string()));
    }
    if request.overall_score > 100 {
        return Err(AppError::Validation(
            "overallScore must be within 0..=100".to_string(),
        ));
    }
    let b = &request.score_breakdown;
    if [b.skills, b.experience, b.achievements, b.presentation]
        .iter()
        .any(|v| !v.is_finite())
    {
        return Err(AppError::Validation(
            "scoreBreakdown values must be finite numbers".to_string(),
        ));
    }

    let job_description = request
        .job_description
        .filter(|jd| !jd.trim().is_empty());
    let keywords = request.keywords.unwrap_or(KeywordLists {
        matched: Vec::new(),
        missing: Vec::new(),
    });
    // Without a job description there is nothing to match against.
    let match_percentage = job_description
        .as_ref()
        .and_then(|_| keyword_match_percentage(keywords.matched.len(), keywords.missing.len()));

    Ok(AnalysisRecord {
        id: Uuid::new_v4(),
        user_id: request.user_id,
        resume_text,
        job_description,
        score_breakdown: request.score_breakdown,
        overall_score: request.overall_score,
        keyword_match: KeywordMatch {
            matched: keywords.matched,
            missing: keywords.missing,
            match_percentage,
        },
        created_at: now,
    })
}
