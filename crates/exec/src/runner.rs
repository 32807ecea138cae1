//! The process-spawn seam: a trait with a real tokio implementation.
//!
//! The executor never touches `tokio::process` directly; it drives a
//! [`ProcessRunner`], so tests substitute scripted doubles without
//! changing production call sites.

use apexlog_core::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, trace};

/// Everything needed to run one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path
    pub program: String,
    /// Arguments, exec-style (no shell interpretation)
    pub args: Vec<String>,
    /// Extra environment entries layered over the inherited environment
    pub env_override: Option<HashMap<String, String>>,
    /// Combined stdout+stderr cap; exceeding it kills the process
    pub output_cap_bytes: usize,
}

/// Raw outcome of a finished process, before exit-status policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Exit code, when the process exited normally
    pub code: Option<i32>,
    /// Terminating signal, when the process was killed (unix only)
    pub signal: Option<i32>,
}

impl RawOutput {
    /// A zero-exit outcome with the given stdout
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            code: Some(0),
            signal: None,
        }
    }

    /// A non-zero-exit outcome with the given code and stderr
    #[must_use]
    pub fn exit(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            code: Some(code),
            signal: None,
        }
    }
}

/// Spawns one external command and gathers its output.
///
/// Implementations stream stdout/stderr, enforce the byte cap, and
/// normalize a missing binary to [`Error::CliNotFound`]. They do not apply
/// timeout or exit-status policy; the executor owns both.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the command to completion and return its raw output
    async fn run(&self, spec: &CommandSpec) -> Result<RawOutput>;
}

/// The real runner, backed by `tokio::process`.
///
/// The child is spawned with `kill_on_drop`, so a caller-side timeout that
/// drops the in-flight future also reaps the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<RawOutput> {
        debug!(program = %spec.program, args = ?spec.args, "spawning command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(env) = &spec.env_override {
            for (key, value) in env {
                cmd.env(key, value);
            }
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CliNotFound {
                    program: spec.program.clone(),
                }
            } else {
                Error::process(format!("failed to spawn '{}': {e}", spec.program))
            }
        })?;

        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| Error::process("child stdout was not piped"))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| Error::process("child stderr was not piped"))?;

        let mut stdout_buf: Vec<u8> = Vec::new();
        let mut stderr_buf: Vec<u8> = Vec::new();
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut stdout_chunk = [0u8; 8192];
        let mut stderr_chunk = [0u8; 8192];

        while stdout_open || stderr_open {
            tokio::select! {
                read = stdout_pipe.read(&mut stdout_chunk), if stdout_open => match read {
                    Ok(0) => stdout_open = false,
                    Ok(n) => stdout_buf.extend_from_slice(&stdout_chunk[..n]),
                    Err(e) => return Err(Error::process(format!("reading stdout: {e}"))),
                },
                read = stderr_pipe.read(&mut stderr_chunk), if stderr_open => match read {
                    Ok(0) => stderr_open = false,
                    Ok(n) => stderr_buf.extend_from_slice(&stderr_chunk[..n]),
                    Err(e) => return Err(Error::process(format!("reading stderr: {e}"))),
                },
            }

            if stdout_buf.len() + stderr_buf.len() > spec.output_cap_bytes {
                let _ = child.start_kill();
                return Err(Error::BufferExceeded {
                    program: spec.program.clone(),
                    limit_bytes: spec.output_cap_bytes,
                });
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::process(format!("waiting for '{}': {e}", spec.program)))?;

        let signal = exit_signal(&status);
        trace!(program = %spec.program, code = ?status.code(), ?signal, "command finished");

        Ok(RawOutput {
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            code: status.code(),
            signal,
        })
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
