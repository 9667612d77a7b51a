//! Process-wide instance and host optimizer callback.
//!
//! The host integrates through one synchronous entry point returning an
//! integer status. Initialization is explicit; there is no teardown beyond
//! process exit. Tests construct their own [`Orchestrator`] instances and
//! never touch the global.

use std::sync::Arc;

use common_config::RequelConfig;
use common_error::{RequelError, RequelResult};
use once_cell::sync::OnceCell;
use requel_host::{HeuristicCostEstimator, SessionHandle, SqlPlanExtractor};
use requel_llm::LlmProvider;
use tracing::{info, warn};

use crate::orchestrator::Orchestrator;
use crate::result::OptimizationResult;

/// Query left unchanged.
pub const STATUS_UNCHANGED: i32 = 0;
/// Query rewritten.
pub const STATUS_REWRITTEN: i32 = 1;
/// Internal failure; the host must keep its own plan.
pub const STATUS_ERROR: i32 = -1;

static INSTANCE: OnceCell<Arc<Orchestrator>> = OnceCell::new();

/// Initialize the process-wide orchestrator with the built-in extractor and
/// estimator, registering the given providers in order.
pub fn init(
    config: RequelConfig,
    providers: Vec<Arc<dyn LlmProvider>>,
) -> RequelResult<Arc<Orchestrator>> {
    let orchestrator = Arc::new(Orchestrator::new(
        config,
        Arc::new(SqlPlanExtractor::new()),
        Arc::new(HeuristicCostEstimator::new()),
    ));
    for provider in providers {
        info!(provider = provider.name(), "registering provider");
        orchestrator.client().register_provider(provider);
    }

    INSTANCE
        .set(orchestrator.clone())
        .map_err(|_| RequelError::config("orchestrator already initialized"))?;
    Ok(orchestrator)
}

/// The process-wide orchestrator, if initialized.
pub fn instance() -> Option<Arc<Orchestrator>> {
    INSTANCE.get().cloned()
}

/// Run the full pipeline from synchronous host code.
pub fn optimize_blocking(
    session: SessionHandle,
    sql: &str,
) -> RequelResult<OptimizationResult> {
    let orchestrator = instance()
        .ok_or_else(|| RequelError::config("orchestrator is not initialized"))?;
    common_runtime::block_on(orchestrator.optimize(session, sql))
}

/// Host optimizer callback.
///
/// Uninitialized or failing calls report unchanged/error; the host never
/// sees a Rust error. The rewritten text itself travels through
/// [`optimize_blocking`] for hosts that consume it directly.
pub fn optimizer_callback(session_token: u64, sql: &str) -> i32 {
    let session = SessionHandle::new(session_token);
    match optimize_blocking(session, sql) {
        Ok(result) if result.optimized => STATUS_REWRITTEN,
        Ok(_) => STATUS_UNCHANGED,
        Err(RequelError::Config(_)) => STATUS_UNCHANGED,
        Err(error) => {
            warn!(%error, "optimizer callback failed");
            STATUS_ERROR
        }
    }
}
