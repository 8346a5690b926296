//! Axum route handlers for models and credits.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::billing::registry::ModelDescriptor;
use crate::errors::AppError;
use crate::models::credits::CreditBalance;
use crate::state::AppState;

/// Largest single grant accepted over HTTP.
pub const MAX_BONUS_GRANT: u32 = 100_000;

#[derive(Debug, Deserialize)]
pub struct BonusCreditsRequest {
    pub amount: u32,
}

/// GET /api/v1/models
///
/// The price list, in catalogue order.
pub async fn handle_list_models(State(state): State<AppState>) -> Json<Vec<ModelDescriptor>> {
    Json(state.registry.all().to_vec())
}

/// GET /api/v1/credits/:user_id
pub async fn handle_get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<CreditBalance>, AppError> {
    Ok(Json(state.ledger.balance(user_id).await?))
}

/// POST /api/v1/credits/:user_id/bonus
pub async fn handle_add_bonus_credits(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<BonusCreditsRequest>,
) -> Result<Json<CreditBalance>, AppError> {
    if request.amount == 0 || request.amount > MAX_BONUS_GRANT {
        return Err(AppError::Validation(format!(
            "amount must be between 1 and {MAX_BONUS_GRANT}"
        )));
    }
    Ok(Json(state.ledger.add_bonus_credits(user_id, request.amount).await?))
}
