//! Optimization pipeline orchestration for Requel.
//!
//! The [`Orchestrator`] is the controller over every other crate in the
//! workspace: it gates incoming queries, asks the LLM client for candidate
//! rewrites, filters them through the semantic validator in generation
//! order, prices survivors with the host cost estimator, and applies the
//! configured selection policy behind a minimum-improvement bar.
//!
//! The contract toward the host is *worst case, a no-op*: every failure path
//! returns the original SQL with a diagnostic reason, and the synchronous
//! callback in [`callback`] never surfaces an error.

mod callback;
mod orchestrator;
mod result;
mod stats;

pub use callback::{
    init, instance, optimize_blocking, optimizer_callback, STATUS_ERROR, STATUS_REWRITTEN,
    STATUS_UNCHANGED,
};
pub use orchestrator::Orchestrator;
pub use result::{OptimizationResult, StageStats};
pub use stats::{EngineStats, StatsSnapshot};

pub use common_config::{
    GenerationConfig, OptimizationGoal, OptimizationStrategy, RequelConfig, SelectionMode,
};
