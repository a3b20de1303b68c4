/// Execution Engine - Runs Candidate Code
///
/// **Core Responsibility:**
/// Execute a synthesized artifact against one test input and capture the raw
/// outcome.
///
/// **Architectural Boundary:**
/// - Engine knows HOW to execute (driver process, bash subprocess, limits)
/// - Engine does NOT compare outputs or assign verdicts
/// - Engine returns `ExecutionOutcome`s for the evaluator to judge
///
/// **Call-Based Execution:**
/// One long-lived Python driver per suite (`python/driver.py`). The artifact
/// is loaded once; each case is a JSON line request answered by a JSON line
/// event. Timeouts are enforced twice: `SIGALRM` inside the driver, and a
/// hard deadline here (`timeout + call_grace_ms`) that kills the driver's
/// process group. A killed driver is not reused.
///
/// **Standard-I/O Execution:**
/// Every case is a fresh `bash -c "ulimit -v <kb>; exec python <script>"`
/// in its own session, input piped on stdin, killed as a group on timeout.
///
/// **Safety Limits:**
/// Oversized sources and inputs are rejected before anything is spawned.
use crate::error::HarnessError;
use crate::guard::{kill_process_group, ReliabilityGuard};
use crate::literal::parse_literal;
use crate::value::Value;
use codejudge_common::config::HarnessConfig;
use serde::Deserialize;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Stderr kept per driver process; the rest is drained and discarded
const STDERR_CAPTURE_BYTES: usize = 64 * 1024;

/// Raw result of running one test case
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success { output: Value, stderr: String },
    CompileError { detail: String },
    RuntimeError { detail: String },
    Timeout,
    NonZeroExit { code: i32, output: Value, stderr: String },
}

impl ExecutionOutcome {
    /// Captured output, if the candidate produced any
    pub fn output(&self) -> Option<&Value> {
        match self {
            ExecutionOutcome::Success { output, .. } | ExecutionOutcome::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Diagnostics for debug records
    pub fn stderr(&self) -> &str {
        match self {
            ExecutionOutcome::Success { stderr, .. } | ExecutionOutcome::NonZeroExit { stderr, .. } => stderr,
            ExecutionOutcome::CompileError { detail } | ExecutionOutcome::RuntimeError { detail } => detail,
            ExecutionOutcome::Timeout => "TIMEOUT",
        }
    }
}

/// Driver → engine protocol events
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum DriverEvent {
    Ready,
    CompileError { detail: String },
    Result { value: String },
    Error { detail: String },
    Timeout,
}

enum Reply {
    Event(DriverEvent),
    Closed,
    Expired,
}

/// Outcome of starting a driver
pub enum SessionStart {
    Ready(CallSession),
    CompileError(String),
}

/// Subprocess-backed execution engine
///
/// Owns a private working directory holding the driver and every artifact;
/// it is removed when the engine is dropped.
pub struct ExecutionEngine {
    config: HarnessConfig,
    guard: ReliabilityGuard,
    workdir: TempDir,
    driver_path: PathBuf,
}

impl ExecutionEngine {
    pub fn new(config: &HarnessConfig) -> Result<Self, HarnessError> {
        let workdir = tempfile::Builder::new().prefix("codejudge-").tempdir()?;
        let driver_path = workdir.path().join("driver.py");
        std::fs::write(&driver_path, ReliabilityGuard::driver_script())?;

        debug!(workdir = %workdir.path().display(), "execution engine ready");

        Ok(Self {
            config: config.clone(),
            guard: ReliabilityGuard::new(config.guard_memory_bytes),
            workdir,
            driver_path,
        })
    }

    /// GUARDRAIL: refuse sources above `max_source_bytes`
    pub fn reject_source(&self, source: &str) -> Option<ExecutionOutcome> {
        (source.len() > self.config.max_source_bytes).then(|| ExecutionOutcome::RuntimeError {
            detail: format!(
                "source exceeds maximum size of {} bytes",
                self.config.max_source_bytes
            ),
        })
    }

    /// GUARDRAIL: refuse serialized inputs above `max_input_bytes`
    pub fn reject_input(&self, input: &str) -> Option<ExecutionOutcome> {
        (input.len() > self.config.max_input_bytes).then(|| ExecutionOutcome::RuntimeError {
            detail: format!(
                "test input exceeds maximum size of {} bytes",
                self.config.max_input_bytes
            ),
        })
    }

    /// Write an artifact into the working directory
    pub async fn write_artifact(&self, name: &str, contents: &str) -> Result<PathBuf, HarnessError> {
        let path = self.workdir.path().join(name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    fn driver_command(&self, artifact: &Path, entry_point: &str, timeout: Duration, load_only: bool) -> Command {
        let mut command = Command::new(&self.config.python_executable);
        command
            .arg(&self.driver_path)
            .arg(artifact)
            .arg(entry_point)
            .arg(timeout.as_secs().max(1).to_string())
            .arg(if load_only { "1" } else { "0" })
            .current_dir(self.workdir.path())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        self.guard.confine(&mut command);
        command
    }

    /// Spawn a driver, load the artifact and resolve `entry_point`
    #[tracing::instrument(skip(self, artifact), fields(artifact = %artifact.display()))]
    pub async fn start_session(
        &self,
        artifact: &Path,
        entry_point: &str,
        timeout: Duration,
    ) -> Result<SessionStart, HarnessError> {
        self.spawn_driver(artifact, entry_point, timeout, false).await
    }

    /// Load-only check of a compile variant; `Some(detail)` when it fails
    #[tracing::instrument(skip(self, artifact), fields(artifact = %artifact.display()))]
    pub async fn check_compiles(
        &self,
        artifact: &Path,
        entry_point: &str,
        timeout: Duration,
    ) -> Result<Option<String>, HarnessError> {
        match self.spawn_driver(artifact, entry_point, timeout, true).await? {
            SessionStart::Ready(session) => {
                session.close().await;
                Ok(None)
            }
            SessionStart::CompileError(detail) => Ok(Some(detail)),
        }
    }

    async fn spawn_driver(
        &self,
        artifact: &Path,
        entry_point: &str,
        timeout: Duration,
        load_only: bool,
    ) -> Result<SessionStart, HarnessError> {
        let mut command = self.driver_command(artifact, entry_point, timeout, load_only);
        let child = command.spawn().map_err(|source| HarnessError::Spawn {
            program: self.config.python_executable.clone(),
            source,
        })?;

        let mut session = CallSession::attach(child, Duration::from_millis(self.config.call_grace_ms))?;
        debug!(pid = ?session.pid, load_only, "driver spawned");

        match session.next_reply(timeout + session.grace).await? {
            Reply::Event(DriverEvent::Ready) => Ok(SessionStart::Ready(session)),
            Reply::Event(DriverEvent::CompileError { detail }) => {
                session.shutdown().await;
                Ok(SessionStart::CompileError(detail))
            }
            Reply::Closed => {
                let stderr = session.shutdown().await;
                Ok(SessionStart::CompileError(format!(
                    "driver exited before loading the candidate: {}",
                    stderr.trim()
                )))
            }
            Reply::Expired => {
                session.shutdown().await;
                Ok(SessionStart::CompileError(
                    "timed out while loading the candidate".to_string(),
                ))
            }
            Reply::Event(other) => {
                session.shutdown().await;
                Err(HarnessError::Protocol(format!(
                    "expected ready, got {:?}",
                    other
                )))
            }
        }
    }

    /// `bash -c` body: memory cap, then exec the interpreter on the script
    fn script_command_line(&self, script: &Path) -> String {
        format!(
            "ulimit -v {}; exec {} {}",
            self.config.subprocess_memory_kb,
            shell_quote(&self.config.python_executable),
            shell_quote(&script.to_string_lossy())
        )
    }

    /// Run a stdin/stdout script against one input
    #[tracing::instrument(skip(self, input), fields(script = %script.display(), input_bytes = input.len()))]
    pub async fn run_script(&self, script: &Path, input: &str, timeout: Duration) -> ExecutionOutcome {
        if let Some(rejected) = self.reject_input(input) {
            return rejected;
        }

        let mut command = Command::new("bash");
        command
            .arg("-c")
            .arg(self.script_command_line(script))
            .current_dir(self.workdir.path())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        ReliabilityGuard::detach(&mut command);

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "failed to spawn script");
                return ExecutionOutcome::RuntimeError {
                    detail: format!("failed to spawn bash: {}", e),
                };
            }
        };
        let pid = child.id();

        if let Some(mut stdin) = child.stdin.take() {
            let payload = input.as_bytes().to_vec();
            tokio::spawn(async move {
                // the script may exit without reading everything
                let _ = stdin.write_all(&payload).await;
            });
        }

        let outcome = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                ExecutionOutcome::Timeout
            }
            Ok(Err(e)) => ExecutionOutcome::RuntimeError {
                detail: format!("failed to collect script output: {}", e),
            },
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout)
                    .trim_end_matches('\n')
                    .to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                // signals are reported as negative codes
                let code = output
                    .status
                    .code()
                    .or_else(|| output.status.signal().map(|signal| -signal))
                    .unwrap_or(-1);

                if code == 0 {
                    ExecutionOutcome::Success {
                        output: Value::Str(stdout),
                        stderr,
                    }
                } else {
                    ExecutionOutcome::NonZeroExit {
                        code,
                        output: Value::Str(stdout),
                        stderr,
                    }
                }
            }
        };

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "script finished");
        outcome
    }
}

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}

/// A loaded call-based candidate living in a driver process
pub struct CallSession {
    child: Child,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    replies: Lines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    grace: Duration,
    alive: bool,
}

impl CallSession {
    fn attach(mut child: Child, grace: Duration) -> Result<Self, HarnessError> {
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Protocol("driver stdout not captured".to_string()))?;
        let stderr = child.stderr.take().map(drain_stderr);

        Ok(Self {
            pid: child.id(),
            child,
            stdin,
            replies: BufReader::new(stdout).lines(),
            stderr,
            grace,
            alive: true,
        })
    }

    /// False once the driver exited or was killed
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    async fn next_reply(&mut self, wait: Duration) -> Result<Reply, HarnessError> {
        loop {
            match tokio::time::timeout(wait, self.replies.next_line()).await {
                Err(_) => return Ok(Reply::Expired),
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(None)) => return Ok(Reply::Closed),
                Ok(Ok(Some(line))) if line.trim().is_empty() => continue,
                Ok(Ok(Some(line))) => {
                    let event = serde_json::from_str(&line).map_err(|e| {
                        HarnessError::Protocol(format!("unreadable driver reply {:?}: {}", line, e))
                    })?;
                    return Ok(Reply::Event(event));
                }
            }
        }
    }

    async fn send(&mut self, request: &serde_json::Value) -> Result<(), HarnessError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| HarnessError::Protocol("driver stdin already closed".to_string()))?;
        let mut line = serde_json::to_string(request)
            .map_err(|e| HarnessError::Protocol(e.to_string()))?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Call the entry point with positional `args`
    #[tracing::instrument(skip(self, args), fields(pid = ?self.pid, argc = args.len()))]
    pub async fn invoke(&mut self, args: &[Value], timeout: Duration) -> ExecutionOutcome {
        if !self.alive {
            return ExecutionOutcome::RuntimeError {
                detail: "driver is no longer running".to_string(),
            };
        }

        let request = serde_json::json!({ "args": Value::Tuple(args.to_vec()).to_literal() });
        if let Err(e) = self.send(&request).await {
            let stderr = self.shutdown().await;
            return ExecutionOutcome::RuntimeError {
                detail: format!("driver unavailable: {} {}", e, stderr.trim()),
            };
        }

        let started = Instant::now();
        let reply = self.next_reply(timeout + self.grace).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match reply {
            Ok(Reply::Event(DriverEvent::Result { value })) => {
                debug!(elapsed_ms, "call returned");
                let output = parse_literal(&value).unwrap_or(Value::Str(value));
                ExecutionOutcome::Success {
                    output,
                    stderr: String::new(),
                }
            }
            Ok(Reply::Event(DriverEvent::Error { detail })) => {
                debug!(elapsed_ms, %detail, "call raised");
                ExecutionOutcome::RuntimeError { detail }
            }
            Ok(Reply::Event(DriverEvent::Timeout)) => ExecutionOutcome::Timeout,
            Ok(Reply::Expired) => {
                warn!(elapsed_ms, "driver missed the hard deadline, killing it");
                self.shutdown().await;
                ExecutionOutcome::Timeout
            }
            Ok(Reply::Closed) => {
                let stderr = self.shutdown().await;
                ExecutionOutcome::RuntimeError {
                    detail: format!("driver exited during the call: {}", stderr.trim()),
                }
            }
            Ok(Reply::Event(other)) => {
                self.shutdown().await;
                ExecutionOutcome::RuntimeError {
                    detail: format!("unexpected driver event {:?}", other),
                }
            }
            Err(e) => {
                self.shutdown().await;
                ExecutionOutcome::RuntimeError { detail: e.to_string() }
            }
        }
    }

    /// Kill the driver's process group and return whatever it wrote to stderr
    async fn shutdown(&mut self) -> String {
        if self.alive {
            if let Some(pid) = self.pid {
                kill_process_group(pid);
            }
            self.alive = false;
        }
        self.stdin.take();
        if let Err(e) = self.child.wait().await {
            debug!(error = %e, "failed to reap driver");
        }
        match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        }
    }

    /// End the session: EOF on stdin, a grace period, then a kill
    pub async fn close(mut self) {
        self.stdin.take();
        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.alive = false;
                debug!(pid = ?self.pid, %status, "driver exited");
                // stray grandchildren may still hold the group
                if let Some(pid) = self.pid {
                    kill_process_group(pid);
                }
            }
            _ => {
                info!(pid = ?self.pid, "driver did not exit after EOF, killing it");
                self.shutdown().await;
            }
        }
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        if self.alive {
            if let Some(pid) = self.pid {
                kill_process_group(pid);
            }
        }
    }
}

fn drain_stderr(mut stderr: ChildStderr) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut captured = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stderr.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let room = STDERR_CAPTURE_BYTES.saturating_sub(captured.len());
                    captured.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
        }
        String::from_utf8_lossy(&captured).into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/tmp/a b.py"), "'/tmp/a b.py'");
        assert_eq!(shell_quote("it's.py"), "'it'\\''s.py'");
    }

    #[test]
    fn test_script_command_line_quotes_interpreter() {
        let config = HarnessConfig {
            python_executable: "/opt/py 3/bin/python; rm -rf x".to_string(),
            subprocess_memory_kb: 2048,
            ..HarnessConfig::default()
        };
        let engine = ExecutionEngine::new(&config).unwrap();
        let line = engine.script_command_line(Path::new("/tmp/run.py"));
        assert_eq!(line, "ulimit -v 2048; exec '/opt/py 3/bin/python; rm -rf x' '/tmp/run.py'");
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = ExecutionOutcome::NonZeroExit {
            code: 1,
            output: Value::Str("3".into()),
            stderr: "boom".into(),
        };
        assert_eq!(outcome.output(), Some(&Value::Str("3".into())));
        assert_eq!(outcome.stderr(), "boom");
        assert_eq!(ExecutionOutcome::Timeout.output(), None);
    }

    #[test]
    fn test_driver_events_decode() {
        let event: DriverEvent = serde_json::from_str(r#"{"event": "result", "value": "[1, 2]"}"#).unwrap();
        assert!(matches!(event, DriverEvent::Result { value } if value == "[1, 2]"));

        let event: DriverEvent = serde_json::from_str(r#"{"event": "timeout"}"#).unwrap();
        assert!(matches!(event, DriverEvent::Timeout));
    }

    #[test]
    fn test_guardrails_reject_oversized_payloads() {
        let config = HarnessConfig {
            max_source_bytes: 4,
            max_input_bytes: 2,
            ..HarnessConfig::default()
        };
        let engine = ExecutionEngine::new(&config).unwrap();
        assert!(engine.reject_source("abcd").is_none());
        assert!(matches!(
            engine.reject_source("abcde"),
            Some(ExecutionOutcome::RuntimeError { .. })
        ));
        assert!(matches!(
            engine.reject_input("abc"),
            Some(ExecutionOutcome::RuntimeError { .. })
        ));
    }

    #[test]
    fn test_workdir_holds_driver_and_is_removed_on_drop() {
        let engine = ExecutionEngine::new(&HarnessConfig::default()).unwrap();
        let workdir = engine.workdir.path().to_path_buf();
        assert!(workdir.join("driver.py").exists());
        drop(engine);
        assert!(!workdir.exists());
    }
}
