//! LLM candidate generation for Requel.
//!
//! `requel-llm` owns everything between "we want rewrites for this query" and
//! "here are candidate SQL strings": prompt assembly ([`PromptBuilder`]), the
//! provider seam ([`LlmProvider`]), and the caching client ([`LlmClient`]).
//!
//! The client keys its bounded LRU cache by a [`request_fingerprint`] over
//! provider, model, prompt, and generation parameters. Concurrent misses for
//! one fingerprint coalesce through a single-flight registry: exactly one
//! upstream request runs, everyone shares its result.

mod cache;
mod client;
mod fingerprint;
mod prompt;
mod provider;

pub use cache::{CacheStats, LruCache};
pub use client::{GenerateResult, LlmClient};
pub use fingerprint::{clamp_temperature, request_fingerprint};
pub use prompt::{FewShotExample, PromptBuilder, TableSchema};
pub use provider::{LlmProvider, LlmResponse, StaticProvider};

pub use common_config::{GenerationConfig, OptimizationGoal};
