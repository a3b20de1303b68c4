//! codejudge harness
//!
//! Executes candidate Python code against a test spec and returns one
//! verdict per test case:
//!
//! ```text
//! raw spec ─▶ normalizer ─▶ synthesizer ─▶ engine ─▶ evaluator ─▶ HarnessReport
//!                                            │
//!                                            └─ equivalence (on success)
//! ```
//!
//! The reliability guard used by the engine is a best-effort mitigation and
//! NOT a security sandbox; see [`guard`].
pub mod engine;
pub mod equivalence;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod guard;
pub mod literal;
pub mod normalizer;
pub mod synthesizer;
pub mod value;


pub use engine::{ExecutionEngine, ExecutionOutcome};
pub use error::HarnessError;
pub use executor::{run_test, HarnessRequest};
pub use literal::ParseError;
pub use normalizer::{ExecutionMode, TestSpec};
pub use value::Value;
