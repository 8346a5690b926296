pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::analysis::handlers as analysis;
use crate::billing::handlers as billing;
use crate::generation::handlers as generation;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Catalogue & credits
        .route("/api/v1/models", get(billing::handle_list_models))
        .route("/api/v1/credits/:user_id", get(billing::handle_get_balance))
        .route(
            "/api/v1/credits/:user_id/bonus",
            post(billing::handle_add_bonus_credits),
        )
        // Analyses
        .route("/api/v1/analyses", post(analysis::handle_create_analysis))
        .route(
            "/api/v1/analyses/:id/score-report",
            get(analysis::handle_score_report),
        )
        .route(
            "/api/v1/analyses/:id/session-evaluation",
            post(generation::handle_evaluate_session),
        )
        // Artifacts
        .route(
            "/api/v1/artifacts/generate",
            post(generation::handle_generate),
        )
        .route(
            "/api/v1/artifacts/exists",
            get(generation::handle_check_exists),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::analysis::store::InMemoryAnalysisStore;
    use crate::billing::ledger::InMemoryCreditLedger;
    use crate::billing::registry::ModelRegistry;
    use crate::clock::SystemClock;
    use crate::generation::cache_manager::{CacheSettings, ContentCacheManager};
    use crate::generation::generator::GeneratorSet;
    use crate::generation::store::InMemoryArtifactStore;
    use crate::llm_client::testing::ScriptedLlm;

    fn app(llm_replies: &[&str]) -> Router {
        let clock = Arc::new(SystemClock);
        let analyses = Arc::new(InMemoryAnalysisStore::new());
        let artifacts = Arc::new(InMemoryArtifactStore::new());
        let ledger = Arc::new(InMemoryCreditLedger::new(clock.clone(), 0));
        let registry = Arc::new(ModelRegistry::standard());
        let llm = Arc::new(ScriptedLlm::replying(llm_replies));

        let cache = ContentCacheManager::new(
            analyses.clone(),
            artifacts,
            ledger.clone(),
            registry.clone(),
            GeneratorSet::standard(llm),
            clock,
            CacheSettings::default(),
        );
        build_router(AppState {
            cache,
            analyses,
            ledger,
            registry,
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create_analysis(app: &Router, user_id: Uuid) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/analyses",
            Some(json!({
                "userId": user_id,
                "resume": { "kind": "raw_text", "value": "Jane Doe, Rust engineer" },
                "jobDescription": "Staff Rust engineer",
                "scoreBreakdown": { "skills": 30, "experience": 22, "achievements": 9, "presentation": 4 },
                "overallScore": 67,
                "keywords": { "matched": ["Rust"], "missing": ["Kafka"] }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["scoreReport"]["label"], "Needs Improvement");
        assert_eq!(body["scoreReport"]["breakdown"]["experience"], 63);
        body["analysis"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(&[]), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_models_lists_catalogue() {
        let (status, body) = send(&app(&[]), "GET", "/api/v1/models", None).await;
        assert_eq!(status, StatusCode::OK);
        let models = body.as_array().unwrap();
        assert_eq!(models.len(), 7);
        assert_eq!(models[0]["id"], "gpt-4.1-nano");
        assert_eq!(models[0]["creditCost"], 1);
    }

    #[tokio::test]
    async fn test_generate_then_hit_cache() {
        let app = app(&[r#"{"content":"Dear team,\n\nHire me.","tone":"ignored"}"#]);
        let user_id = Uuid::new_v4();
        let analysis_id = create_analysis(&app, user_id).await;

        let body = json!({
            "analysisId": analysis_id,
            "userId": user_id,
            "type": "cover-letter",
            "modelId": "gpt-4.1",
            "tone": "conversational"
        });
        let (status, first) = send(&app, "POST", "/api/v1/artifacts/generate", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["cached"], false);
        assert_eq!(first["creditsUsed"], 2);
        assert_eq!(first["content"]["tone"], "conversational");
        assert_eq!(first["content"]["wordCount"], 4);

        let (_, second) = send(&app, "POST", "/api/v1/artifacts/generate", Some(body)).await;
        assert_eq!(second["cached"], true);
        assert_eq!(second["usageCount"], 2);
        assert_eq!(second["creditsUsed"], 0);

        let uri = format!("/api/v1/artifacts/exists?analysisId={analysis_id}&type=cover-letter");
        let (_, exists) = send(&app, "GET", &uri, None).await;
        assert_eq!(exists["exists"], true);

        let (_, balance) = send(&app, "GET", &format!("/api/v1/credits/{user_id}"), None).await;
        assert_eq!(balance["available"], 8);
    }

    #[tokio::test]
    async fn test_unknown_model_is_bad_request() {
        let app = app(&[]);
        let user_id = Uuid::new_v4();
        let analysis_id = create_analysis(&app, user_id).await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/artifacts/generate",
            Some(json!({
                "analysisId": analysis_id,
                "userId": user_id,
                "type": "optimized-resume",
                "modelId": "gpt-2"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_session_before_prep_is_not_found() {
        let app = app(&[]);
        let user_id = Uuid::new_v4();
        let analysis_id = create_analysis(&app, user_id).await;
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/v1/analyses/{analysis_id}/session-evaluation"),
            Some(json!({ "userId": user_id })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bonus_grant_is_bounded() {
        let app = app(&[]);
        let uri = format!("/api/v1/credits/{}/bonus", Uuid::new_v4());

        let (status, body) = send(&app, "POST", &uri, Some(json!({ "amount": u32::MAX }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = send(&app, "POST", &uri, Some(json!({ "amount": 25 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], 35);
    }

    #[tokio::test]
    async fn test_score_report_for_unknown_analysis() {
        let uri = format!("/api/v1/analyses/{}/score-report", Uuid::new_v4());
        let (status, _) = send(&app(&[]), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
