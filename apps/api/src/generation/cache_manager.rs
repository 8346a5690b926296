//! Content Cache Manager — decides whether to serve, join, or generate.
//!
//! Flow for one request:
//!   validate model → load analysis → build cache key → cache hit? →
//!   join the key's flight (or lead it) → preflight → reserve credits →
//!   generate → persist → commit.
//!
//! Every failure after a successful reserve releases the hold before the error
//! is published. Nothing is persisted unless the generator succeeded and at
//! least one caller was still waiting when it did.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analysis::store::AnalysisStore;
use crate::billing::ledger::CreditLedger;
use crate::billing::registry::{ModelDescriptor, ModelId, ModelRegistry};
use crate::clock::Clock;
use crate::errors::GenerationError;
use crate::generation::generator::{GenerationContext, GenerationOptions, GeneratorSet};
use crate::generation::single_flight::{SingleFlight, WaitError};
use crate::generation::store::ArtifactStore;
use crate::models::analysis::AnalysisRecord;
use crate::models::artifact::{
    ArtifactPayload, ArtifactType, CacheKey, GeneratedArtifact, SessionEvaluation,
};

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    /// How long a caller waits on another caller's in-flight generation.
    pub lock_wait_timeout: Duration,
    /// Upper bound on a single generator call.
    pub generation_timeout: Duration,
    /// Model used when a session evaluation request names none.
    pub default_model: ModelId,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            lock_wait_timeout: Duration::from_secs(120),
            generation_timeout: Duration::from_secs(180),
            default_model: ModelId::Gpt41Mini,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub analysis_id: Uuid,
    pub user_id: Uuid,
    pub artifact_type: ArtifactType,
    pub model_id: ModelId,
    pub bypass_cache: bool,
    pub question_id: Option<String>,
    pub options: GenerationOptions,
}

#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub artifact: GeneratedArtifact,
    pub cached: bool,
    /// Credits charged to this caller. Zero for cache hits and for callers
    /// that attached to someone else's generation.
    pub credits_used: u32,
    /// True when the result came from a generation another caller started.
    pub shared: bool,
}

/// What a flight publishes to every attached caller.
#[derive(Debug, Clone)]
struct FlightOutcome {
    artifact: GeneratedArtifact,
    cached: bool,
    credits_charged: u32,
}

type FlightResult = Result<FlightOutcome, GenerationError>;

#[derive(Clone)]
pub struct ContentCacheManager {
    analyses: Arc<dyn AnalysisStore>,
    artifacts: Arc<dyn ArtifactStore>,
    ledger: Arc<dyn CreditLedger>,
    registry: Arc<ModelRegistry>,
    generators: GeneratorSet,
    clock: Arc<dyn Clock>,
    flights: SingleFlight<CacheKey, FlightResult>,
    settings: CacheSettings,
}

impl ContentCacheManager {
    pub fn new(
        analyses: Arc<dyn AnalysisStore>,
        artifacts: Arc<dyn ArtifactStore>,
        ledger: Arc<dyn CreditLedger>,
        registry: Arc<ModelRegistry>,
        generators: GeneratorSet,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            analyses,
            artifacts,
            ledger,
            registry,
            generators,
            clock,
            flights: SingleFlight::new(),
            settings,
        }
    }

    /// Serves a cached artifact or produces a new one, billing the analysis owner.
    pub async fn generate(
        &self,
        request: GenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerateOutcome, GenerationError> {
        let model = self.registry.get(request.model_id)?.clone();
        let analysis = self.load_owned_analysis(request.analysis_id, request.user_id).await?;
        let key = CacheKey::new(
            analysis.id,
            request.artifact_type,
            request.question_id.as_deref(),
        )?;

        if !request.bypass_cache && !self.flights.is_in_flight(&key) {
            if let Some(artifact) = self.artifacts.record_hit(&key).await? {
                info!("Cache hit for {key} (usage {})", artifact.usage_count);
                return Ok(GenerateOutcome {
                    artifact,
                    cached: true,
                    credits_used: 0,
                    shared: false,
                });
            }
        }

        let analysis = Arc::new(analysis);
        loop {
            let manager = self.clone();
            let flight_key = key.clone();
            let flight_analysis = analysis.clone();
            let flight_model = model.clone();
            let options = request.options.clone();
            let bypass = request.bypass_cache;
            let handle = self
                .flights
                .join(key.clone(), move |flight_cancel| {
                    manager.run_flight(
                        flight_key,
                        flight_analysis,
                        flight_model,
                        options,
                        bypass,
                        flight_cancel,
                    )
                })
                .await;

            let leader = handle.is_leader();
            let deadline = (!leader).then_some(self.settings.lock_wait_timeout);
            let started = Instant::now();
            let outcome = handle.wait(deadline, cancel).await.map_err(|e| match e {
                WaitError::TimedOut => GenerationError::LockTimeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                },
                WaitError::Cancelled => GenerationError::Cancelled,
                WaitError::Abandoned => {
                    GenerationError::Generator("Generation ended without a result".to_string())
                }
            })??;

            // A forced regeneration must never hand back the prior artifact.
            if request.bypass_cache && outcome.cached {
                continue;
            }

            // Every caller served from the store counts as one use, not just the leader.
            let mut artifact = outcome.artifact;
            if !leader && outcome.cached {
                if let Some(hit) = self.artifacts.record_hit(&key).await? {
                    artifact = hit;
                }
            }

            return Ok(GenerateOutcome {
                artifact,
                cached: outcome.cached,
                credits_used: if leader { outcome.credits_charged } else { 0 },
                shared: !leader,
            });
        }
    }

    /// Read-only existence check. No locking, no charge.
    pub async fn check_exists(
        &self,
        analysis_id: Uuid,
        artifact_type: ArtifactType,
        question_id: Option<&str>,
    ) -> Result<bool, GenerationError> {
        let key = CacheKey::new(analysis_id, artifact_type, question_id)?;
        self.artifacts.exists(&key).await
    }

    /// Whole-session evaluation for an analysis. Served from cache when present.
    pub async fn evaluate_session(
        &self,
        analysis_id: Uuid,
        user_id: Uuid,
        model_id: Option<ModelId>,
        cancel: &CancellationToken,
    ) -> Result<SessionEvaluation, GenerationError> {
        let outcome = self
            .generate(
                GenerateRequest {
                    analysis_id,
                    user_id,
                    artifact_type: ArtifactType::SessionEvaluation,
                    model_id: model_id.unwrap_or(self.settings.default_model),
                    bypass_cache: false,
                    question_id: None,
                    options: GenerationOptions::default(),
                },
                cancel,
            )
            .await?;

        match outcome.artifact.payload {
            ArtifactPayload::SessionEvaluation(evaluation) => Ok(evaluation),
            other => Err(GenerationError::Storage(format!(
                "Session key for analysis {analysis_id} holds a {} payload",
                other.artifact_type()
            ))),
        }
    }

    /// Unknown analyses and analyses owned by someone else look the same to the caller.
    async fn load_owned_analysis(
        &self,
        analysis_id: Uuid,
        user_id: Uuid,
    ) -> Result<AnalysisRecord, GenerationError> {
        match self.analyses.get(analysis_id).await? {
            Some(analysis) if analysis.user_id == user_id => Ok(analysis),
            _ => Err(GenerationError::NotFound(format!(
                "Analysis {analysis_id} not found"
            ))),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Flight body
    // ────────────────────────────────────────────────────────────────────────

    async fn run_flight(
        self,
        key: CacheKey,
        analysis: Arc<AnalysisRecord>,
        model: ModelDescriptor,
        options: GenerationOptions,
        bypass: bool,
        cancel: CancellationToken,
    ) -> FlightResult {
        // Another flight may have persisted this key between our miss and our lead.
        if !bypass {
            if let Some(artifact) = self.artifacts.record_hit(&key).await? {
                return Ok(FlightOutcome {
                    artifact,
                    cached: true,
                    credits_charged: 0,
                });
            }
        }

        let generator = self.generators.get(key.artifact_type)?;
        let ctx = GenerationContext {
            analysis: &analysis,
            key: &key,
            model: &model,
            options: &options,
            artifacts: self.artifacts.as_ref(),
        };
        generator.preflight(&ctx).await?;

        let reservation = tokio::select! {
            reserved = self.ledger.reserve(analysis.user_id, model.credit_cost) => reserved?,
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
        };
        info!(
            "Generating {key} with {} ({} credits, reservation {reservation})",
            model.id, model.credit_cost
        );

        let generated = tokio::select! {
            result = tokio::time::timeout(self.settings.generation_timeout, generator.generate(&ctx)) => {
                result.unwrap_or_else(|_| {
                    Err(GenerationError::Generator(format!(
                        "Generation timed out after {}s",
                        self.settings.generation_timeout.as_secs()
                    )))
                })
            }
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
        };

        let payload = match generated {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Generation failed for {key}: {e}");
                self.release(reservation).await;
                return Err(e);
            }
        };

        // Past this point the artifact becomes visible, so a late cancel must stop here.
        if cancel.is_cancelled() {
            info!("Discarding {key}: every caller left before it was stored");
            self.release(reservation).await;
            return Err(GenerationError::Cancelled);
        }

        let artifact = match self
            .artifacts
            .upsert(&key, model.id, payload, self.clock.now())
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("Failed to persist {key}: {e}");
                self.release(reservation).await;
                return Err(e);
            }
        };

        let credits_charged = match self.ledger.commit(reservation).await {
            Ok(()) => model.credit_cost,
            Err(e) => {
                // The artifact is already visible; the user keeps it uncharged.
                error!("Failed to commit reservation {reservation} for {key}: {e}");
                self.release(reservation).await;
                0
            }
        };

        info!("Stored {key} as artifact {}", artifact.id);
        Ok(FlightOutcome {
            artifact,
            cached: false,
            credits_charged,
        })
    }

    async fn release(&self, reservation: Uuid) {
        if let Err(e) = self.ledger.release(reservation).await {
            error!("Failed to release reservation {reservation}: {e}");
        }
    }
}
