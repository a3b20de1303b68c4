/// Harness Orchestration
///
/// Glue between the pure modules and the engine:
///
/// 1. Normalize the raw spec (malformed ⇒ empty report)
/// 2. Synthesize the artifact for the detected mode
/// 3. Execute cases sequentially through `ExecutionEngine`
/// 4. Judge each outcome and align the verdicts with the suite
///
/// Nothing escapes `run_test`. Infrastructure failures become
/// `RuntimeError` verdicts for the cases they affect.
use crate::engine::{CallSession, ExecutionEngine, ExecutionOutcome, SessionStart};
use crate::error::HarnessError;
use crate::evaluator::{broadcast, finalize, judge, SuiteSummary, UniformExitRetry};
use crate::normalizer::{normalize, ExecutionMode, TestCase, TestSpec};
use crate::synthesizer::{synthesize, CandidateArtifact, ENTRY_POINT};
use crate::value::Value;
use codejudge_common::config::HarnessConfig;
use codejudge_common::types::{DebugRecord, HarnessReport, JobRequest, RawTestSpec, Verdict};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// One candidate evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessRequest {
    pub candidate_source: String,
    pub test_spec: RawTestSpec,
    #[serde(default)]
    pub harness_template: String,
    /// Per-case limit; falls back to `HarnessConfig::default_timeout_seconds`
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub debug: bool,
    /// Falls back to `HarnessConfig::early_stop`
    #[serde(default)]
    pub early_stop: Option<bool>,
}

impl From<&JobRequest> for HarnessRequest {
    fn from(job: &JobRequest) -> Self {
        Self {
            candidate_source: job.candidate_source.clone(),
            test_spec: job.test_spec.clone(),
            harness_template: job.harness_template.clone(),
            timeout_seconds: job.timeout_seconds,
            debug: job.debug,
            early_stop: job.early_stop,
        }
    }
}

/// Resolved per-run settings
struct RunSettings {
    timeout: Duration,
    early_stop: bool,
    debug: bool,
}

/// Evaluate a candidate against its test spec
#[tracing::instrument(skip_all, fields(debug = request.debug))]
pub async fn run_test(request: &HarnessRequest, config: &HarnessConfig) -> HarnessReport {
    let spec = match normalize(&request.test_spec) {
        Ok(spec) => spec,
        Err(e) => {
            warn!(error = %e, "malformed test spec, returning an empty report");
            return HarnessReport::default();
        }
    };

    let settings = RunSettings {
        timeout: Duration::from_secs(request.timeout_seconds.unwrap_or(config.default_timeout_seconds)),
        early_stop: request.early_stop.unwrap_or(config.early_stop),
        debug: request.debug,
    };
    let n = spec.len();
    let started = Instant::now();
    info!(
        mode = spec.mode.label(),
        cases = n,
        timeout_s = settings.timeout.as_secs(),
        early_stop = settings.early_stop,
        "evaluating candidate"
    );

    let mut records = Vec::new();
    let verdicts = if spec.is_empty() {
        Vec::new()
    } else {
        match evaluate(request, config, &spec, &settings, &mut records).await {
            Ok(verdicts) => finalize(verdicts, n),
            Err(e) => {
                error!(error = %e, "harness failure, marking the suite as runtime errors");
                broadcast(Verdict::RuntimeError, n)
            }
        }
    };

    let summary = SuiteSummary::from_verdicts(&verdicts);
    info!(
        passed = summary.passed,
        total = summary.total,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "evaluation finished"
    );

    HarnessReport {
        verdicts,
        debug: settings.debug.then_some(records),
    }
}

async fn evaluate(
    request: &HarnessRequest,
    config: &HarnessConfig,
    spec: &TestSpec,
    settings: &RunSettings,
    records: &mut Vec<DebugRecord>,
) -> Result<Vec<Verdict>, HarnessError> {
    let engine = ExecutionEngine::new(config)?;

    if let Some(rejected) = engine.reject_source(&request.candidate_source) {
        warn!(bytes = request.candidate_source.len(), "candidate source rejected");
        record_failure(records, &rejected);
        return Ok(vec![Verdict::RuntimeError]);
    }

    let artifact = synthesize(&request.candidate_source, &request.harness_template, &spec.mode);
    match (&spec.mode, &artifact) {
        (ExecutionMode::CallBased { fn_name }, CandidateArtifact::CallBased { program }) => {
            run_call_based(&engine, program, fn_name, &spec.cases, settings, records).await
        }
        (
            ExecutionMode::StandardInput,
            CandidateArtifact::StandardInput {
                compile_variant,
                execute_variant,
            },
        ) => {
            let compile_path = engine.write_artifact("candidate_compile.py", compile_variant).await?;
            if let Some(detail) = engine
                .check_compiles(&compile_path, ENTRY_POINT, settings.timeout)
                .await?
            {
                info!(%detail, "candidate failed to compile");
                record_failure(records, &ExecutionOutcome::CompileError { detail });
                return Ok(vec![Verdict::CompileError]);
            }

            let script = engine.write_artifact("candidate.py", execute_variant).await?;
            let verdicts = run_standard_input(&engine, &script, &spec.cases, settings, records).await;

            match (UniformExitRetry::from_config(config), artifact.fallback_script()) {
                (Some(policy), Some(fallback)) if policy.applies_to(&verdicts) => {
                    info!(
                        exit_code = policy.exit_code,
                        "every case exited uniformly, retrying through the entry point"
                    );
                    let fallback_path = engine.write_artifact("candidate_fallback.py", &fallback).await?;
                    records.clear();
                    Ok(run_standard_input(&engine, &fallback_path, &spec.cases, settings, records).await)
                }
                _ => Ok(verdicts),
            }
        }
        _ => Err(HarnessError::Protocol(format!(
            "artifact does not match execution mode {}",
            spec.mode.label()
        ))),
    }
}

/// Positional arguments for a call: sequences are splatted, anything else is one argument
pub fn call_arguments(input: &Value) -> Vec<Value> {
    match input {
        Value::List(items) | Value::Tuple(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// Text fed to (or expected from) a stdin script: sequence elements as `str()`, one per line
pub fn render_stdin(value: &Value) -> String {
    match value {
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(Value::to_display_string)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_display_string(),
    }
}

async fn open_session(
    engine: &ExecutionEngine,
    program_path: &Path,
    fn_name: &str,
    timeout: Duration,
) -> Result<Result<CallSession, String>, HarnessError> {
    match engine.start_session(program_path, fn_name, timeout).await? {
        SessionStart::Ready(session) => Ok(Ok(session)),
        SessionStart::CompileError(detail) => Ok(Err(detail)),
    }
}

async fn run_call_based(
    engine: &ExecutionEngine,
    program: &str,
    fn_name: &str,
    cases: &[TestCase],
    settings: &RunSettings,
    records: &mut Vec<DebugRecord>,
) -> Result<Vec<Verdict>, HarnessError> {
    let program_path = engine.write_artifact("candidate.py", program).await?;

    let mut session = match open_session(engine, &program_path, fn_name, settings.timeout).await? {
        Ok(session) => session,
        Err(detail) => {
            info!(%detail, fn_name, "candidate failed to load");
            record_failure(records, &ExecutionOutcome::CompileError { detail });
            return Ok(vec![Verdict::CompileError]);
        }
    };

    let mut verdicts = Vec::with_capacity(cases.len());
    for (index, case) in cases.iter().enumerate() {
        if !session.is_alive() {
            // the previous call killed the driver; later cases get a fresh one
            debug!(test_index = index, "respawning driver");
            session = match open_session(engine, &program_path, fn_name, settings.timeout).await? {
                Ok(session) => session,
                Err(detail) => {
                    warn!(test_index = index, %detail, "driver could not be restarted");
                    verdicts.resize(cases.len(), Verdict::RuntimeError);
                    break;
                }
            };
        }

        let args = call_arguments(&case.input);
        let outcome = match engine.reject_input(&Value::Tuple(args.clone()).to_literal()) {
            Some(rejected) => rejected,
            None => session.invoke(&args, settings.timeout).await,
        };
        let verdict = judge(&outcome, &case.expected);
        debug!(test_index = index, %verdict, "call judged");

        if settings.debug {
            records.push(DebugRecord {
                index,
                input: case.input.to_literal(),
                expected: case.expected.to_literal(),
                actual: outcome.output().map(Value::to_literal),
                stderr: outcome.stderr().to_string(),
            });
        }

        verdicts.push(verdict);
        if settings.early_stop && verdict == Verdict::RuntimeError {
            verdicts.resize(cases.len(), Verdict::RuntimeError);
            break;
        }
    }

    session.close().await;
    Ok(verdicts)
}

async fn run_standard_input(
    engine: &ExecutionEngine,
    script: &Path,
    cases: &[TestCase],
    settings: &RunSettings,
    records: &mut Vec<DebugRecord>,
) -> Vec<Verdict> {
    let mut verdicts = Vec::with_capacity(cases.len());
    for (index, case) in cases.iter().enumerate() {
        let input = render_stdin(&case.input);
        let expected = Value::Str(render_stdin(&case.expected));

        let outcome = engine.run_script(script, &input, settings.timeout).await;
        let verdict = judge(&outcome, &expected);
        debug!(test_index = index, %verdict, "script judged");

        if settings.debug {
            records.push(DebugRecord {
                index,
                input,
                expected: render_stdin(&case.expected),
                actual: outcome.output().map(Value::to_display_string),
                stderr: outcome.stderr().to_string(),
            });
        }

        verdicts.push(verdict);
        if settings.early_stop && !verdict.is_pass() {
            break;
        }
    }
    verdicts
}

fn record_failure(records: &mut Vec<DebugRecord>, outcome: &ExecutionOutcome) {
    records.push(DebugRecord {
        index: 0,
        input: String::new(),
        expected: String::new(),
        actual: None,
        stderr: outcome.stderr().to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_arguments_splat_sequences() {
        let input = Value::List(vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(call_arguments(&input), vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(call_arguments(&Value::Str("x".into())), vec![Value::Str("x".into())]);
        assert!(call_arguments(&Value::List(vec![])).is_empty());
    }

    #[test]
    fn test_render_stdin_joins_elements_with_str() {
        let input = Value::List(vec![Value::Str("2 3".into()), Value::Int(4), Value::Float(0.5)]);
        assert_eq!(render_stdin(&input), "2 3\n4\n0.5");
        assert_eq!(render_stdin(&Value::Str("a\nb".into())), "a\nb");
        assert_eq!(
            render_stdin(&Value::List(vec![Value::List(vec![Value::Int(1)])])),
            "[1]"
        );
    }

    #[test]
    fn test_request_from_job() {
        let job: JobRequest = serde_json::from_value(serde_json::json!({
            "id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
            "candidate_source": "print(1)",
            "test_spec": "{'inputs': [''], 'outputs': ['1']}",
            "timeout_seconds": 3
        }))
        .unwrap();
        let request = HarnessRequest::from(&job);
        assert_eq!(request.timeout_seconds, Some(3));
        assert_eq!(request.harness_template, "");
        assert!(matches!(request.test_spec, RawTestSpec::Serialized(_)));
    }

    #[tokio::test]
    async fn test_malformed_spec_yields_empty_report() {
        let request = HarnessRequest {
            candidate_source: "print(1)".into(),
            test_spec: RawTestSpec::Serialized("{'inputs': [1, 2], 'outputs': [".into()),
            harness_template: String::new(),
            timeout_seconds: Some(1),
            debug: true,
            early_stop: None,
        };
        let report = run_test(&request, &HarnessConfig::default()).await;
        assert!(report.verdicts.is_empty());
        assert!(report.debug.is_none());
    }

    #[tokio::test]
    async fn test_oversized_source_is_a_runtime_error() {
        let config = HarnessConfig {
            max_source_bytes: 8,
            ..HarnessConfig::default()
        };
        let request = HarnessRequest {
            candidate_source: "print('this is too long')".into(),
            test_spec: RawTestSpec::Serialized("{'inputs': ['', ''], 'outputs': ['a', 'b']}".into()),
            harness_template: String::new(),
            timeout_seconds: Some(1),
            debug: false,
            early_stop: None,
        };
        let report = run_test(&request, &config).await;
        assert_eq!(report.verdicts, vec![Verdict::RuntimeError; 2]);
    }
}
