//! Self-verification critics for generated code
//!
//! Two layers: the [`Verifier`] runs a deterministic syntax → lint → test
//! pipeline over modified files, and the [`Evaluator`] asks the LLM for a
//! structured rubric review.

mod evaluator;
mod verifier;

pub use evaluator::{DimensionScore, EvaluationResult, Evaluator};
pub use verifier::{CheckResult, CheckStatus, VerificationResult, Verifier};
