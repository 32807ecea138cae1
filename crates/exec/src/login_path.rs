//! PATH recovery from the user's interactive login shell.
//!
//! GUI-launched processes often inherit a PATH without the user's CLI
//! install locations. When every credential candidate fails with a missing
//! binary, the resolver asks this helper for the PATH an interactive login
//! shell would see and retries with it injected.

use crate::runner::{CommandSpec, ProcessRunner, TokioProcessRunner};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_OUTPUT_CAP: usize = 64 * 1024;

/// One-time-cached login-shell PATH probe.
///
/// The probe runs at most once per process lifetime; every later call
/// returns the cached answer. On Windows there is no login shell to ask,
/// so the probe is skipped entirely.
pub struct LoginPathRecovery {
    runner: Arc<dyn ProcessRunner>,
    cached: OnceCell<Option<String>>,
}

impl std::fmt::Debug for LoginPathRecovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginPathRecovery")
            .field("cached", &self.cached.get())
            .finish_non_exhaustive()
    }
}

impl Default for LoginPathRecovery {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginPathRecovery {
    /// Create a recovery helper backed by the real runner
    #[must_use]
    pub fn new() -> Self {
        Self::with_runner(Arc::new(TokioProcessRunner))
    }

    /// Create a recovery helper over an injected runner (the test seam)
    #[must_use]
    pub fn with_runner(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            cached: OnceCell::new(),
        }
    }

    /// The PATH as the user's interactive login shell reports it.
    ///
    /// `None` when the platform has no login shell, the probe fails, or
    /// the shell prints nothing usable. Best-effort by contract: this
    /// never returns an error.
    pub async fn login_shell_path(&self) -> Option<String> {
        self.cached
            .get_or_init(|| async { self.probe().await })
            .await
            .clone()
    }

    async fn probe(&self) -> Option<String> {
        if cfg!(windows) {
            debug!("skipping login-shell PATH probe on windows");
            return None;
        }

        let shell = std::env::var("SHELL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "/bin/bash".to_string());

        debug!(%shell, "probing login shell for PATH");

        let spec = CommandSpec {
            program: shell.clone(),
            args: vec![
                "-i".to_string(),
                "-l".to_string(),
                "-c".to_string(),
                r#"printf '%s' "$PATH""#.to_string(),
            ],
            env_override: None,
            output_cap_bytes: PROBE_OUTPUT_CAP,
        };

        let raw = match tokio::time::timeout(PROBE_TIMEOUT, self.runner.run(&spec)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(%shell, error = %e, "login-shell PATH probe failed");
                return None;
            }
            Err(_) => {
                warn!(%shell, "login-shell PATH probe timed out");
                return None;
            }
        };

        if raw.code != Some(0) {
            warn!(%shell, code = ?raw.code, "login shell exited non-zero during PATH probe");
            return None;
        }

        // Interactive shells may echo banners around the payload; the PATH
        // is the last non-empty line.
        let path = raw
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .next_back()?
            .to_string();

        if path.is_empty() {
            return None;
        }

        debug!(recovered_len = path.len(), "recovered PATH from login shell");
        Some(path)
    }
}
