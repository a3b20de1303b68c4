use crate::literal::ParseError;
use thiserror::Error;

/// Failures inside the harness. None of these escape `run_test`; the
/// orchestrator turns them into verdicts or an empty report.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid test spec: {0}")]
    Parse(#[from] ParseError),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("driver protocol error: {0}")]
    Protocol(String),
}
