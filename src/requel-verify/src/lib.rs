//! Semantic equivalence validation for Requel.
//!
//! The validator is the gate every candidate rewrite must pass: extract both
//! plans, canonicalize both, and compare. Three modes trade strictness for
//! recall:
//!
//! - **Strict** — byte-identical canonical renderings, confidence 1.0 or 0.0.
//! - **Relaxed** — strict, plus projection and group-by column order is
//!   ignored where row order cannot observe it.
//! - **Heuristic** — relaxed, falling back to a structural similarity score;
//!   equivalent at or above 0.9, with the score as confidence.
//!
//! Failure paths (extraction failure, canonicalization divergence, an
//! unmodeled fragment in either plan) are never errors: they come back as
//! non-equivalent verdicts with confidence 0.0, which makes the enclosing
//! pipeline decline the candidate.

mod diff;
mod similarity;
mod validator;

pub use diff::{enumerate_differences, DiffKind, PlanDiff};
pub use similarity::similarity;
pub use validator::{SemanticValidator, ValidationMode, ValidationResult};
