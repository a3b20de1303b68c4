/// Verdict Aggregator - Scoring Logic
///
/// **Core Responsibility:**
/// Turn raw execution outcomes into index-aligned verdicts.
///
/// **Critical Properties:**
/// - Knows nothing about processes, drivers or Python
/// - Pure functions: (outcomes, expected outputs) → verdicts
///
/// **Rules:**
/// - `Success` compares the output: `Passed` or `Failed`
/// - `NonZeroExit` compares too: `Passed` if the output still matches,
///   otherwise `NonZeroExit(code)`
/// - `Timeout`, `RuntimeError`, `CompileError` map 1:1
/// - A compile error covers every test case
/// - A single verdict against an N-case suite is broadcast to all N
/// - A short list (early stop) is back-filled with its last verdict
/// - `UniformExitRetry`: a stdin suite where every case exited with the
///   same configured code is re-run once through the explicit entry point
use crate::engine::ExecutionOutcome;
use crate::equivalence::compare;
use crate::value::Value;
use codejudge_common::config::HarnessConfig;
use codejudge_common::types::Verdict;
use serde::{Deserialize, Serialize};

/// Verdict for one executed case
pub fn judge(outcome: &ExecutionOutcome, expected: &Value) -> Verdict {
    match outcome {
        ExecutionOutcome::Success { output, .. } => {
            if compare(output, expected) {
                Verdict::Passed
            } else {
                Verdict::Failed
            }
        }
        ExecutionOutcome::NonZeroExit { code, output, .. } => {
            if compare(output, expected) {
                Verdict::Passed
            } else {
                Verdict::NonZeroExit { code: *code }
            }
        }
        ExecutionOutcome::Timeout => Verdict::Timeout,
        ExecutionOutcome::RuntimeError { .. } => Verdict::RuntimeError,
        ExecutionOutcome::CompileError { .. } => Verdict::CompileError,
    }
}

pub fn broadcast(verdict: Verdict, n: usize) -> Vec<Verdict> {
    vec![verdict; n]
}

/// Align a verdict list with an `n`-case suite
pub fn finalize(mut verdicts: Vec<Verdict>, n: usize) -> Vec<Verdict> {
    match verdicts.last().copied() {
        None => verdicts,
        Some(last) => {
            verdicts.resize(n, last);
            verdicts
        }
    }
}

/// Re-run a stdin suite once when every case exited with `exit_code`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformExitRetry {
    pub exit_code: i32,
}

impl UniformExitRetry {
    pub fn from_config(config: &HarnessConfig) -> Option<Self> {
        config
            .uniform_exit_retry_code
            .map(|exit_code| Self { exit_code })
    }

    pub fn applies_to(&self, verdicts: &[Verdict]) -> bool {
        !verdicts.is_empty()
            && verdicts
                .iter()
                .all(|v| *v == Verdict::NonZeroExit { code: self.exit_code })
    }
}

/// Pass count for a finished suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub passed: usize,
    pub total: usize,
}

impl SuiteSummary {
    pub fn from_verdicts(verdicts: &[Verdict]) -> Self {
        Self {
            passed: verdicts.iter().filter(|v| v.is_pass()).count(),
            total: verdicts.len(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }

    /// Fraction of passing cases, 0.0 for an empty suite
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}
