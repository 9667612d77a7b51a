//! Host-optimizer boundary for Requel.
//!
//! Everything the core needs from the host database lives behind the two
//! traits in this crate: [`PlanExtractor`] turns SQL text (plus an opaque
//! session handle) into a [`requel_plan::LogicalPlan`], and [`CostEstimator`]
//! prices a plan. Both must be deterministic for a fixed input.
//!
//! [`SqlPlanExtractor`] is the built-in extractor: it lowers one `SELECT`
//! statement through `sqlparser` into the logical plan, failing on statement
//! shapes it cannot represent and mapping unrecognized fragments to `Unknown`
//! nodes, which poison strict validation downstream.
//! [`HeuristicCostEstimator`] is the built-in estimator used when no host
//! cost model is wired in.

mod cost;
mod extract;
mod session;

pub use cost::{CostEstimator, HeuristicCostEstimator};
pub use extract::{PlanExtractor, SqlPlanExtractor};
pub use session::SessionHandle;
