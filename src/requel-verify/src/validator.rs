//! Semantic equivalence validator.

use serde::Serialize;
use tracing::debug;

use requel_canon::{default_rules, Canonicalizer};
use requel_host::{PlanExtractor, SessionHandle};
use requel_plan::LogicalPlan;

use crate::diff::{enumerate_differences, PlanDiff};
use crate::similarity::similarity;

/// Heuristic mode accepts plans at or above this similarity.
const SIMILARITY_THRESHOLD: f64 = 0.9;

/// How strictly two canonicalized plans are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Byte-identical canonical renderings only.
    #[default]
    Strict,
    /// Strict, plus projection and group-by lists compared as sets where row
    /// order cannot observe the difference.
    Relaxed,
    /// Relaxed, falling back to a structural similarity score.
    Heuristic,
}

/// Verdict of a validation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// Whether the two queries were proven equivalent.
    pub is_equivalent: bool,
    /// Confidence in the verdict, in [0, 1].
    pub confidence: f64,
    /// Human-readable reason.
    pub reason: String,
    /// Structural differences; empty on equivalence and on failure paths.
    pub differences: Vec<PlanDiff>,
}

impl ValidationResult {
    fn equivalent(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            is_equivalent: true,
            confidence,
            reason: reason.into(),
            differences: Vec::new(),
        }
    }

    fn not_equivalent(
        confidence: f64,
        reason: impl Into<String>,
        differences: Vec<PlanDiff>,
    ) -> Self {
        Self {
            is_equivalent: false,
            confidence,
            reason: reason.into(),
            differences,
        }
    }

    /// Non-verdict: validation itself could not run to completion.
    fn failure(reason: impl Into<String>) -> Self {
        Self::not_equivalent(0.0, reason, Vec::new())
    }
}

/// Proves or refutes the equivalence of a query and its rewrite.
pub struct SemanticValidator {
    canonicalizer: Canonicalizer,
    mode: ValidationMode,
}

impl Default for SemanticValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticValidator {
    /// Validator with the default rule set in strict mode.
    pub fn new() -> Self {
        Self {
            canonicalizer: Canonicalizer::new(default_rules()),
            mode: ValidationMode::Strict,
        }
    }

    /// Builder-style mode selection.
    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Change the comparison mode.
    pub fn set_mode(&mut self, mode: ValidationMode) {
        self.mode = mode;
    }

    /// Current comparison mode.
    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Validate two SQL texts by extracting, canonicalizing, and comparing
    /// their plans. Never returns an error; failure paths produce a
    /// non-equivalent result with the failure reason.
    pub fn validate(
        &self,
        extractor: &dyn PlanExtractor,
        session: SessionHandle,
        original_sql: &str,
        rewritten_sql: &str,
    ) -> ValidationResult {
        let original = match extractor.extract(session, original_sql) {
            Ok(plan) => plan,
            Err(error) => {
                debug!(%error, "original extraction failed");
                return ValidationResult::failure("extraction_failed");
            }
        };
        let rewritten = match extractor.extract(session, rewritten_sql) {
            Ok(plan) => plan,
            Err(error) => {
                debug!(%error, "rewrite extraction failed");
                return ValidationResult::failure("extraction_failed");
            }
        };

        self.validate_plans(original, rewritten)
    }

    /// Validate two already-extracted plans.
    pub fn validate_plans(
        &self,
        original: LogicalPlan,
        rewritten: LogicalPlan,
    ) -> ValidationResult {
        let first = self.canonicalizer.run(original);
        let second = self.canonicalizer.run(rewritten);
        if !first.converged || !second.converged {
            return ValidationResult::failure("canonicalization_diverged");
        }

        let original = first.plan;
        let rewritten = second.plan;

        if original.is_unsupported() || rewritten.is_unsupported() {
            return ValidationResult::failure("unsupported_fragment");
        }

        match self.mode {
            ValidationMode::Strict => {
                if original.to_json() == rewritten.to_json() {
                    ValidationResult::equivalent(1.0, "identical_canonical_form")
                } else {
                    let differences =
                        enumerate_differences(original.root(), rewritten.root(), false);
                    ValidationResult::not_equivalent(0.0, "canonical_forms_differ", differences)
                }
            }
            ValidationMode::Relaxed => {
                let differences = enumerate_differences(original.root(), rewritten.root(), true);
                if differences.is_empty() {
                    ValidationResult::equivalent(1.0, "equivalent_up_to_column_order")
                } else {
                    ValidationResult::not_equivalent(0.0, "canonical_forms_differ", differences)
                }
            }
            ValidationMode::Heuristic => {
                let differences = enumerate_differences(original.root(), rewritten.root(), true);
                if differences.is_empty() {
                    return ValidationResult::equivalent(1.0, "equivalent_up_to_column_order");
                }

                let score = similarity(original.root(), rewritten.root());
                let reason = format!("structural_similarity {score:.3}");
                if score >= SIMILARITY_THRESHOLD {
                    ValidationResult {
                        is_equivalent: true,
                        confidence: score,
                        reason,
                        differences,
                    }
                } else {
                    ValidationResult::not_equivalent(score, reason, differences)
                }
            }
        }
    }
}
