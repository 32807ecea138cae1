//! Deduplicating command executor.
//!
//! Identical concurrent invocations share one spawned process; every
//! waiter observes the same outcome, and each waiter can cancel its own
//! view without disturbing the others.

use crate::runner::{CommandSpec, ProcessRunner, RawOutput, TokioProcessRunner};
use apexlog_core::{AccessConfig, Error, Result};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Identity of one logical invocation.
///
/// Two concurrent requests with an equal key share one spawned process.
/// The environment participates by shape (inherited vs. overridden), not
/// by content, matching how the resolver's PATH-recovery pass is keyed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionKey {
    program: String,
    args: Vec<String>,
    uses_alternate_path_env: bool,
    timeout_ms: u64,
}

impl ExecutionKey {
    fn new(request: &CommandRequest, timeout: Duration) -> Self {
        Self {
            program: request.program.clone(),
            args: request.args.clone(),
            uses_alternate_path_env: request.env_override.is_some(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// One command to execute.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Program name or path
    pub program: String,
    /// Arguments, exec-style
    pub args: Vec<String>,
    /// Extra environment entries (the resolver's recovered PATH)
    pub env_override: Option<HashMap<String, String>>,
    /// Per-request timeout; `None` uses the configured default
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    /// Build a request for a program with arguments
    #[must_use]
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env_override: None,
            timeout: None,
        }
    }

    /// Layer extra environment entries over the inherited environment
    #[must_use]
    pub fn with_env_override(mut self, env: HashMap<String, String>) -> Self {
        self.env_override = Some(env);
        self
    }

    /// Override the configured default timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Output of a successful execution (exit code 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

type SharedResult = Shared<BoxFuture<'static, Result<CommandOutput>>>;

/// Deduplicating, timeout-bounded executor over a [`ProcessRunner`].
///
/// The in-flight table and the process are owned by a spawned task, so the
/// shared work completes (and the table entry is removed) even when every
/// waiter has cancelled.
pub struct CommandExecutor {
    runner: Arc<dyn ProcessRunner>,
    inflight: Arc<Mutex<HashMap<ExecutionKey, SharedResult>>>,
    default_timeout: Duration,
    output_cap_bytes: usize,
}

impl fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("default_timeout", &self.default_timeout)
            .field("output_cap_bytes", &self.output_cap_bytes)
            .finish_non_exhaustive()
    }
}

impl CommandExecutor {
    /// Create an executor backed by the real tokio runner
    #[must_use]
    pub fn new(config: &AccessConfig) -> Self {
        Self::with_runner(Arc::new(TokioProcessRunner), config)
    }

    /// Create an executor over an injected runner (the test seam)
    #[must_use]
    pub fn with_runner(runner: Arc<dyn ProcessRunner>, config: &AccessConfig) -> Self {
        Self {
            runner,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            default_timeout: config.exec_timeout,
            output_cap_bytes: config.effective_output_cap(),
        }
    }

    /// Number of executions currently in flight (test observability)
    #[must_use]
    pub fn inflight_len(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Execute a command, joining an identical in-flight invocation if one
    /// exists.
    ///
    /// Cancelling `cancel` fails only this caller with [`Error::Aborted`];
    /// the shared process keeps running for the remaining waiters and is
    /// reaped on its own timeout.
    pub async fn execute(
        &self,
        request: CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let key = ExecutionKey::new(&request, timeout);
        let shared = self.obtain(key, request, timeout);

        tokio::select! {
            () = cancel.cancelled() => Err(Error::Aborted),
            result = shared => result,
        }
    }

    fn obtain(&self, key: ExecutionKey, request: CommandRequest, timeout: Duration) -> SharedResult {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(existing) = inflight.get(&key) {
            debug!(program = %key.program, "joining in-flight execution");
            return existing.clone();
        }

        let runner = Arc::clone(&self.runner);
        let table = Arc::clone(&self.inflight);
        let cleanup_key = key.clone();
        let cap = self.output_cap_bytes;

        let task = tokio::spawn(async move {
            let result = run_once(runner.as_ref(), request, timeout, cap).await;
            table
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .remove(&cleanup_key);
            result
        });

        let shared: SharedResult = async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    warn!(%join_error, "execution task aborted");
                    Err(Error::process(format!("execution task failed: {join_error}")))
                }
            }
        }
        .boxed()
        .shared();

        inflight.insert(key, shared.clone());
        shared
    }
}

async fn run_once(
    runner: &dyn ProcessRunner,
    request: CommandRequest,
    timeout: Duration,
    output_cap_bytes: usize,
) -> Result<CommandOutput> {
    let spec = CommandSpec {
        program: request.program,
        args: request.args,
        env_override: request.env_override,
        output_cap_bytes,
    };

    // Dropping the runner future on timeout reaps the child (kill_on_drop).
    match tokio::time::timeout(timeout, runner.run(&spec)).await {
        Ok(Ok(raw)) => finish(&spec.program, raw),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(program = %spec.program, timeout_ms, "command timed out");
            Err(Error::CliTimeout {
                program: spec.program,
                timeout_ms,
            })
        }
    }
}

fn finish(program: &str, raw: RawOutput) -> Result<CommandOutput> {
    if raw.code == Some(0) {
        Ok(CommandOutput {
            stdout: raw.stdout,
            stderr: raw.stderr,
        })
    } else {
        Err(Error::CliExitNonZero {
            program: program.to_string(),
            code: raw.code,
            signal: raw.signal,
            stderr: raw.stderr,
        })
    }
}
