// Harness configuration shared by the worker, the CLI and the API
use serde::{Deserialize, Serialize};

/// Tunables for one harness run
///
/// Every field has a default so a partial JSON document (or none at all)
/// yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Interpreter used for both the call-based driver and stdin scripts
    pub python_executable: String,
    /// Per-test wall-clock limit when the request does not carry one
    pub default_timeout_seconds: u64,
    /// Extra time granted to the driver's own alarm before the process group is killed
    pub call_grace_ms: u64,
    /// Address-space / data / stack cap for the call-based driver process
    pub guard_memory_bytes: u64,
    /// `ulimit -v` value (KiB) for stdin-mode subprocesses
    pub subprocess_memory_kb: u64,
    pub early_stop: bool,
    /// Exit code that, when reported uniformly across a stdin suite,
    /// triggers one re-run through the explicit entry point. `None` disables it.
    pub uniform_exit_retry_code: Option<i32>,
    pub max_source_bytes: usize,
    pub max_input_bytes: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            python_executable: "python3".to_string(),
            default_timeout_seconds: 90,
            call_grace_ms: 2000,
            guard_memory_bytes: 4 * 1024 * 1024 * 1024,
            subprocess_memory_kb: 10 * 1024 * 1024,
            early_stop: true,
            uniform_exit_retry_code: Some(1),
            max_source_bytes: 1024 * 1024,
            max_input_bytes: 10 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: HarnessConfig =
            serde_json::from_str(r#"{"default_timeout_seconds": 5}"#).unwrap();
        assert_eq!(config.default_timeout_seconds, 5);
        assert_eq!(config.python_executable, "python3");
        assert_eq!(config.uniform_exit_retry_code, Some(1));
    }

    #[test]
    fn test_retry_policy_can_be_disabled() {
        let config: HarnessConfig =
            serde_json::from_str(r#"{"uniform_exit_retry_code": null}"#).unwrap();
        assert_eq!(config.uniform_exit_retry_code, None);
    }
}
