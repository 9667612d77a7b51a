//! Error types and result aliases for Requel.
//!
//! Every crate in the workspace speaks `RequelError`; the orchestrator is the
//! only place that converts failures back into a "return the original query"
//! outcome rather than propagating them.

mod error;

pub use error::{RequelError, RequelResult};
