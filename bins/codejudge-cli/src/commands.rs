// CLI commands for codejudge
use anyhow::{bail, Context, Result};
use codejudge_common::config::HarnessConfig;
use codejudge_common::redis;
use codejudge_common::types::{JobRequest, RawTestSpec};
use codejudge_harness::equivalence::{self, StageResult};
use codejudge_harness::evaluator::SuiteSummary;
use codejudge_harness::literal::parse_literal;
use codejudge_harness::{run_test, HarnessRequest, Value};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Log to stderr so the JSON report on stdout stays machine readable
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// A JSON mapping is passed through structured, anything else is a serialized literal
pub fn load_spec(path: &Path) -> Result<RawTestSpec> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test spec {}", path.display()))?;

    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(json @ serde_json::Value::Object(_)) => Ok(RawTestSpec::Structured(json)),
        _ => Ok(RawTestSpec::Serialized(content)),
    }
}

fn load_harness_config(path: Option<&Path>) -> Result<HarnessConfig> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => HarnessConfig::default(),
    };
    if let Ok(python) = std::env::var("PYTHON_EXECUTABLE") {
        config.python_executable = python;
    }
    Ok(config)
}

pub fn build_request(
    code: &Path,
    spec: &Path,
    template: Option<&Path>,
    timeout: Option<u64>,
    debug: bool,
) -> Result<HarnessRequest> {
    let candidate_source = fs::read_to_string(code)
        .with_context(|| format!("Failed to read candidate {}", code.display()))?;
    if candidate_source.trim().is_empty() {
        bail!("Candidate source {} is empty", code.display());
    }
    let harness_template = match template {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read template {}", path.display()))?,
        None => String::new(),
    };

    Ok(HarnessRequest {
        candidate_source,
        test_spec: load_spec(spec)?,
        harness_template,
        timeout_seconds: timeout,
        debug,
        early_stop: None,
    })
}

/// Evaluate in-process and print the report
pub async fn run_local(request: &HarnessRequest, config_path: Option<&Path>) -> Result<()> {
    let config = load_harness_config(config_path)?;

    let start = Instant::now();
    let report = run_test(request, &config).await;
    let summary = SuiteSummary::from_verdicts(&report.verdicts);

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.verdicts.is_empty() {
        eprintln!("⚠️  No verdicts: the test spec could not be parsed or is empty");
    } else {
        let marker = if summary.all_passed() { "✅" } else { "❌" };
        eprintln!(
            "{} {}/{} passed in {}ms",
            marker,
            summary.passed,
            summary.total,
            start.elapsed().as_millis()
        );
    }
    Ok(())
}

fn describe(result: &StageResult) -> String {
    match result {
        Ok(true) => "✓ match".to_string(),
        Ok(false) => "✗ no match".to_string(),
        Err(e) => format!("- does not apply ({})", e),
    }
}

/// Print every stage's answer and the overall result
pub fn compare(actual: &str, expected: &str, literal: bool) -> Result<()> {
    let (actual, expected) = if literal {
        (
            parse_literal(actual).context("Failed to parse --actual")?,
            parse_literal(expected).context("Failed to parse --expected")?,
        )
    } else {
        (Value::Str(actual.to_string()), Value::Str(expected.to_string()))
    };

    println!("actual:   {}", actual.to_literal());
    println!("expected: {}", expected.to_literal());
    println!();
    for (name, result) in equivalence::explain(&actual, &expected) {
        println!("  {:<20} {}", name, describe(&result));
    }
    println!();

    if equivalence::compare(&actual, &expected) {
        println!("✅ equivalent");
    } else {
        println!("❌ not equivalent");
    }
    Ok(())
}

async fn connect() -> Result<::redis::aio::ConnectionManager> {
    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = ::redis::Client::open(redis_url.as_str()).context("Failed to create Redis client")?;
    ::redis::aio::ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", redis_url))
}

/// Queue a request for the worker
pub async fn submit(request: HarnessRequest) -> Result<()> {
    let job = JobRequest {
        id: Uuid::new_v4(),
        candidate_source: request.candidate_source,
        test_spec: request.test_spec,
        harness_template: request.harness_template,
        timeout_seconds: request.timeout_seconds,
        debug: request.debug,
        early_stop: request.early_stop,
    };

    let queue = std::env::var("CODEJUDGE_QUEUE").unwrap_or_else(|_| redis::QUEUE_NAME.to_string());
    let mut conn = connect().await?;
    redis::push_job(&mut conn, &queue, &job)
        .await
        .context("Failed to queue job")?;

    println!("📨 Queued job on {}", queue);
    println!("{}", job.id);
    Ok(())
}

/// Print a stored result, polling for up to `wait_seconds`
pub async fn fetch_result(id: &str, wait_seconds: u64) -> Result<()> {
    let job_id = Uuid::parse_str(id).with_context(|| format!("Invalid job id: {}", id))?;
    let mut conn = connect().await?;
    let deadline = Instant::now() + Duration::from_secs(wait_seconds);

    loop {
        if let Some(result) = redis::get_result(&mut conn, &job_id).await? {
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("No result for job {} yet (queued, running or expired)", job_id);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_spec_detects_json_mappings() {
        let json = write_temp(r#"{"inputs": [[1]], "outputs": [1], "fn_name": "f"}"#);
        assert!(matches!(load_spec(json.path()).unwrap(), RawTestSpec::Structured(_)));

        let literal = write_temp("{'inputs': ['1'], 'outputs': ['1']}");
        assert!(matches!(load_spec(literal.path()).unwrap(), RawTestSpec::Serialized(_)));
    }

    #[test]
    fn test_build_request_reads_files() {
        let code = write_temp("print(1)\n");
        let spec = write_temp("{'inputs': [''], 'outputs': ['1']}");
        let template = write_temp("import bisect");

        let request = build_request(code.path(), spec.path(), Some(template.path()), Some(4), true).unwrap();
        assert_eq!(request.candidate_source, "print(1)\n");
        assert_eq!(request.harness_template, "import bisect");
        assert_eq!(request.timeout_seconds, Some(4));
        assert!(request.debug);
    }

    #[test]
    fn test_build_request_rejects_empty_source() {
        let code = write_temp("  \n");
        let spec = write_temp("{'inputs': [], 'outputs': []}");
        assert!(build_request(code.path(), spec.path(), None, None, false).is_err());
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let config = write_temp(r#"{"default_timeout_seconds": 3}"#);
        let loaded = load_harness_config(Some(config.path())).unwrap();
        assert_eq!(loaded.default_timeout_seconds, 3);
        assert_eq!(loaded.call_grace_ms, HarnessConfig::default().call_grace_ms);
    }

    #[test]
    fn test_describe_stage_results() {
        assert_eq!(describe(&Ok(true)), "✓ match");
        assert!(describe(&Err(equivalence::StageError::NotLines)).starts_with("- does not apply"));
    }
}
