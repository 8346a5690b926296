use std::sync::Arc;

use crate::analysis::store::AnalysisStore;
use crate::billing::ledger::CreditLedger;
use crate::billing::registry::ModelRegistry;
use crate::generation::cache_manager::ContentCacheManager;

/// Shared application state injected into all route handlers via Axum extractors.
/// The cache manager holds its own handles to the same stores.
#[derive(Clone)]
pub struct AppState {
    pub cache: ContentCacheManager,
    pub analyses: Arc<dyn AnalysisStore>,
    pub ledger: Arc<dyn CreditLedger>,
    pub registry: Arc<ModelRegistry>,
}
