//! Command Gateway
//!
//! Orchestrates the lifecycle of one external-tool command:
//!
//! ```text
//! Received → Validated → AllowListed → Admitted → Spawned
//!                                               → {Completed | TimedOut | ExecutionFailed}
//! ```
//!
//! Gates 1-3 (validation, allow-list, admission) reject synchronously and
//! never touch the filesystem or the process table. Once a process is
//! spawned, every subsequent failure is normalized into an
//! [`ExecutionResult`]; nothing escapes [`CommandGateway::execute`] as a
//! panic or an `Err`.
//!
//! # Security Features
//!
//! - **No Shell**: the validated command is spawned as an argument list.
//! - **Admission Cap**: at most N processes in flight; excess commands are
//!   rejected immediately, never queued.
//! - **Timeout Enforcement**: every command races a deadline; on expiry the
//!   process is forcibly terminated. Kill is best-effort: a process that
//!   ignores termination may outlive the reported failure.
//! - **Output Sanitization**: stdout is redacted before it leaves the
//!   gateway. stderr is surfaced unredacted to aid diagnosis; the tool's
//!   error text does not carry secret payloads, and callers rely on seeing
//!   it verbatim.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::GatewayError;
use super::resolver::ExecutableResolver;
use super::validator::{sanitize_output, truncate_for_log, CommandValidator, SafeCommand};
use crate::config::GatewayConfig;

/// Exit code reported for every result that never reached a real process
/// exit: gate rejections, spawn failures, timeouts, cancellations.
pub const SENTINEL_EXIT_CODE: i32 = -1;

/// A command to execute, plus optional per-command overrides.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    text: String,
    env: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            env: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Overlay an environment variable onto the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run the command from the given working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Override the configured timeout for this command only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl From<&str> for CommandRequest {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for CommandRequest {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Result of one command's lifecycle. Always produced, never thrown.
///
/// Callers branch on `success`; the other fields are for display and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the command ran and exited with code zero.
    pub success: bool,

    /// Standard output with sensitive field values redacted. Not truncated.
    pub stdout: String,

    /// Raw error text: the process's stderr, or the gateway's failure
    /// message when no process output exists.
    pub stderr: String,

    /// Process exit code, or [`SENTINEL_EXIT_CODE`] when no process exited.
    pub exit_code: i32,

    /// Wall-clock time from receipt to terminal state, in milliseconds.
    pub duration_ms: u64,
}

impl ExecutionResult {
    fn completed(stdout: String, stderr: String, exit_code: i32, elapsed: Duration) -> Self {
        Self {
            success: exit_code == 0,
            stdout,
            stderr,
            exit_code,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    fn from_error(error: &GatewayError, elapsed: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: error.to_string(),
            exit_code: SENTINEL_EXIT_CODE,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    /// One-line summary for operator-facing surfaces.
    pub fn summary(&self) -> String {
        if self.success {
            format!("ok ({} ms, {} bytes)", self.duration_ms, self.stdout.len())
        } else {
            format!(
                "failed (exit {}, {} ms): {}",
                self.exit_code,
                self.duration_ms,
                truncate_for_log(&self.stderr)
            )
        }
    }
}

/// Registry of admitted commands: the shared mutable state behind the
/// concurrency cap, the in-flight counter, and bulk cancellation.
#[derive(Debug)]
struct AdmissionRegistry {
    cap: usize,
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, CancellationToken>>,
}

impl AdmissionRegistry {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            next_id: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    // A poisoned lock only means another task panicked mid-access; the map
    // itself stays consistent, so recover the guard rather than propagate.
    fn entries(&self) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit one command, or reject immediately when the cap is reached.
    /// No queueing.
    fn try_admit(self: &Arc<Self>) -> Result<AdmissionSlot, GatewayError> {
        let mut entries = self.entries();
        if entries.len() >= self.cap {
            return Err(GatewayError::ConcurrencyLimit(self.cap));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        entries.insert(id, token.clone());
        Ok(AdmissionSlot {
            registry: Arc::clone(self),
            id,
            token,
        })
    }

    fn active(&self) -> usize {
        self.entries().len()
    }

    fn cancel_all(&self) {
        for token in self.entries().values() {
            token.cancel();
        }
    }
}

/// One of at most N concurrently permitted executions. Releasing in `Drop`
/// is what keeps the slot count from drifting from the number of truly
/// in-flight commands, whichever terminal branch is taken.
struct AdmissionSlot {
    registry: Arc<AdmissionRegistry>,
    id: u64,
    token: CancellationToken,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.registry.entries().remove(&self.id);
    }
}

/// The secure command-execution gateway.
///
/// Construction takes the full configuration (tool name, allow-list,
/// timeout, cap) and a platform resolver, so the decision logic is testable
/// against arbitrary allow-lists and substitute binaries.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use vaultkeeper_gateway::config::GatewayConfig;
/// use vaultkeeper_gateway::gateway::{CommandGateway, CommandRequest, UnixResolver};
///
/// #[tokio::main]
/// async fn main() {
///     let config = GatewayConfig::default();
///     let resolver = Arc::new(UnixResolver::new(config.tool.clone()));
///     let gateway = CommandGateway::new(config, resolver);
///
///     let result = gateway.execute(CommandRequest::new("az keyvault list")).await;
///     println!("{}", result.summary());
/// }
/// ```
#[derive(Debug)]
pub struct CommandGateway {
    config: GatewayConfig,
    validator: CommandValidator,
    resolver: Arc<dyn ExecutableResolver>,
    registry: Arc<AdmissionRegistry>,
    resolved: Mutex<Option<PathBuf>>,
}

impl CommandGateway {
    pub fn new(config: GatewayConfig, resolver: Arc<dyn ExecutableResolver>) -> Self {
        let validator = CommandValidator::new(config.tool.clone());
        let registry = Arc::new(AdmissionRegistry::new(config.max_concurrent));
        Self {
            config,
            validator,
            resolver,
            registry,
            resolved: Mutex::new(None),
        }
    }

    /// Run one command through every gate and, if admitted, to completion.
    pub async fn execute(&self, request: impl Into<CommandRequest>) -> ExecutionResult {
        let request = request.into();
        let start = Instant::now();

        // Gate 1: validation.
        let safe = match self.validator.validate_command(request.text()) {
            Ok(safe) => safe,
            Err(err) => return self.reject(request.text(), err.into(), start),
        };

        // Gate 2: allow-list.
        if !self.is_allow_listed(request.text()) {
            let shown = truncate_for_log(&sanitize_output(request.text()));
            return self.reject(request.text(), GatewayError::Authorization(shown), start);
        }

        // Gate 3: admission.
        let slot = match self.registry.try_admit() {
            Ok(slot) => slot,
            Err(err) => return self.reject(request.text(), err, start),
        };

        let executable = match self.resolve_executable() {
            Ok(path) => path,
            Err(err) => return self.reject(request.text(), err, start),
        };
        debug!(executable = %executable.display(), "resolved tool");

        let result = self.run_process(&request, &safe, &executable, &slot, start).await;
        drop(slot);

        let logged_command = truncate_for_log(&sanitize_output(request.text()));
        if result.success {
            info!(
                command = %logged_command,
                duration_ms = result.duration_ms,
                output = %truncate_for_log(&result.stdout),
                "command completed"
            );
        } else {
            warn!(
                command = %logged_command,
                exit_code = result.exit_code,
                duration_ms = result.duration_ms,
                "command failed: {}",
                truncate_for_log(&result.stderr)
            );
        }
        result
    }

    /// How many commands are currently admitted. Exposed for observability
    /// and tests; returns to zero once all outstanding results are delivered.
    pub fn active_count(&self) -> usize {
        self.registry.active()
    }

    /// Force-complete every admitted command with a cancellation result and
    /// clear tracking. The hosting process is not terminated.
    pub fn cancel_all(&self) {
        let active = self.registry.active();
        if active > 0 {
            warn!(active, "cancelling all in-flight commands");
        }
        self.registry.cancel_all();
    }

    /// Whether the external tool can be located, without executing anything.
    pub fn check_availability(&self) -> bool {
        self.resolve_executable().is_ok()
    }

    /// First line of `<tool> version` output, if the tool runs.
    pub async fn get_version(&self) -> Option<String> {
        let result = self
            .execute(CommandRequest::new(format!("{} version", self.config.tool)))
            .await;
        if !result.success {
            return None;
        }
        result
            .stdout
            .lines()
            .next()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
    }

    /// Whether a session exists, probed with `<tool> account show`. A
    /// non-zero exit of a *found* tool means signed out; tool-not-found
    /// surfaces separately through [`Self::check_availability`].
    pub async fn is_authenticated(&self) -> bool {
        self.execute(CommandRequest::new(format!(
            "{} account show",
            self.config.tool
        )))
        .await
        .success
    }

    fn reject(&self, text: &str, err: GatewayError, start: Instant) -> ExecutionResult {
        let logged = truncate_for_log(&sanitize_output(text));
        if err.is_security_event() {
            warn!(target: "security", command = %logged, "command rejected: {}", err);
        } else {
            warn!(command = %logged, "command not admitted: {}", err);
        }
        ExecutionResult::from_error(&err, start.elapsed())
    }

    /// Case-insensitive prefix match against the injected allow-list, on
    /// token boundaries so "az keyvault listx" does not ride on an
    /// "az keyvault list" entry.
    fn is_allow_listed(&self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        self.config.allow_list.iter().any(|entry| {
            let entry = entry.trim().to_lowercase();
            !entry.is_empty()
                && (normalized == entry
                    || normalized
                        .strip_prefix(&entry)
                        .is_some_and(|rest| rest.starts_with(char::is_whitespace)))
        })
    }

    /// Resolve the tool, reusing a previously successful resolution if it
    /// still exists. Failed resolutions are never cached: the tool may be
    /// installed while the application is running.
    fn resolve_executable(&self) -> Result<PathBuf, GatewayError> {
        let mut cached = self.resolved.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(path) = cached.as_ref() {
            if path.is_file() {
                return Ok(path.clone());
            }
            *cached = None;
        }
        let path = self.resolver.resolve()?;
        *cached = Some(path.clone());
        Ok(path)
    }

    async fn run_process(
        &self,
        request: &CommandRequest,
        safe: &SafeCommand,
        executable: &PathBuf,
        slot: &AdmissionSlot,
        start: Instant,
    ) -> ExecutionResult {
        let mut command = TokioCommand::new(executable);
        command
            .args(&safe.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        // GUI-launched processes inherit a minimal PATH on macOS; widen it
        // the same way resolution does so the tool's own helpers are found.
        if cfg!(target_os = "macos") {
            command.env("PATH", super::resolver::widened_search_path());
        }
        for (key, value) in &request.env {
            command.env(key, value);
        }
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                return ExecutionResult::from_error(
                    &GatewayError::Execution(err.to_string()),
                    start.elapsed(),
                )
            }
        };

        // Drain both pipes concurrently while awaiting exit, so a chatty
        // process can never deadlock on a full pipe.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stdout_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let timeout = request.timeout.unwrap_or(self.config.timeout());
        let outcome = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Ok(status.code().unwrap_or(SENTINEL_EXIT_CODE)),
                Err(err) => Err(GatewayError::Execution(err.to_string())),
            },
            _ = tokio::time::sleep(timeout) => {
                Err(GatewayError::Timeout(timeout.as_secs()))
            }
            _ = slot.token.cancelled() => Err(GatewayError::Cancelled),
        };

        if outcome.is_err() {
            // Timeout or cancel: terminate and reap. Best-effort; a process
            // ignoring the signal continues past the reported failure.
            let _ = child.start_kill();
            let _ = child.wait().await;
        }

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();

        match outcome {
            Ok(exit_code) => {
                let stdout = sanitize_output(&String::from_utf8_lossy(&stdout_bytes));
                let mut stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();
                // A failing tool that printed nothing still owes the caller
                // an error text.
                if exit_code != 0 && stderr.trim().is_empty() {
                    stderr = GatewayError::NonZeroExit(exit_code).to_string();
                }
                ExecutionResult::completed(stdout, stderr, exit_code, start.elapsed())
            }
            Err(err) => ExecutionResult::from_error(&err, start.elapsed()),
        }
    }
}
