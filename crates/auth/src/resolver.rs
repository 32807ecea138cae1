//! Credential resolution through the locally installed Salesforce CLI.

use crate::candidates::{Candidate, auth_candidates, org_list_candidates};
use crate::orgs::{merge_org_groupings, parse_org_list_payload};
use apexlog_core::{AccessConfig, Error, OrgAuth, OrgItem, Result};
use apexlog_exec::{CommandExecutor, CommandRequest, LoginPathRecovery};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of walking one candidate list.
enum PassOutcome {
    /// Every candidate failed because its binary was missing
    AllNotFound,
    /// A hard failure to propagate, or exhaustion with a mixed failure set
    Failed(Error),
}

/// Resolves org credentials and org listings by shelling out to the
/// `sf`/`sfdx` CLI through the deduplicating executor.
#[derive(Debug)]
pub struct CredentialResolver {
    executor: Arc<CommandExecutor>,
    path_recovery: Arc<LoginPathRecovery>,
}

impl CredentialResolver {
    /// Create a resolver backed by the real executor and PATH probe
    #[must_use]
    pub fn new(config: &AccessConfig) -> Self {
        Self::with_parts(
            Arc::new(CommandExecutor::new(config)),
            Arc::new(LoginPathRecovery::new()),
        )
    }

    /// Create a resolver over injected parts (the test seam)
    #[must_use]
    pub fn with_parts(executor: Arc<CommandExecutor>, path_recovery: Arc<LoginPathRecovery>) -> Self {
        Self {
            executor,
            path_recovery,
        }
    }

    /// Resolve credentials for the given org (or the default org).
    ///
    /// Walks the candidate table; the first invocation whose JSON stdout
    /// carries an access token and instance URL wins. When every candidate
    /// fails with a missing binary, the PATH is recovered from the user's
    /// login shell and the full table is retried with it injected.
    pub async fn org_auth(
        &self,
        target: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<OrgAuth> {
        let fallback_username = target.map(ToString::to_string);
        let parse = move |stdout: &str| parse_auth_payload(stdout, fallback_username.clone());

        self.resolve_two_pass(auth_candidates(target), &parse, cancel)
            .await
    }

    /// List every org the local CLI knows about, merged and sorted.
    pub async fn list_orgs(&self, cancel: &CancellationToken) -> Result<Vec<OrgItem>> {
        let parse = |stdout: &str| parse_org_list_payload(stdout).map(merge_org_groupings);

        self.resolve_two_pass(org_list_candidates(), &parse, cancel)
            .await
    }

    async fn resolve_two_pass<T>(
        &self,
        candidates: Vec<Candidate>,
        parse: &(dyn Fn(&str) -> Option<T> + Sync),
        cancel: &CancellationToken,
    ) -> Result<T> {
        match self.run_pass(&candidates, None, parse, cancel).await {
            Ok(value) => return Ok(value),
            Err(PassOutcome::Failed(e)) => return Err(e),
            Err(PassOutcome::AllNotFound) => {}
        }

        let Some(path) = self.path_recovery.login_shell_path().await else {
            return Err(not_found_error(&candidates));
        };

        debug!("retrying CLI candidates with login-shell PATH");
        let env: HashMap<String, String> = [("PATH".to_string(), path)].into_iter().collect();

        match self.run_pass(&candidates, Some(&env), parse, cancel).await {
            Ok(value) => Ok(value),
            Err(PassOutcome::AllNotFound) => Err(not_found_error(&candidates)),
            Err(PassOutcome::Failed(e)) => Err(e),
        }
    }

    async fn run_pass<T>(
        &self,
        candidates: &[Candidate],
        env: Option<&HashMap<String, String>>,
        parse: &(dyn Fn(&str) -> Option<T> + Sync),
        cancel: &CancellationToken,
    ) -> std::result::Result<T, PassOutcome> {
        let mut not_found = 0usize;
        let mut last_failure: Option<Error> = None;

        for candidate in candidates {
            let mut request = CommandRequest::new(candidate.program, candidate.args.clone());
            if let Some(env) = env {
                request = request.with_env_override(env.clone());
            }

            match self.executor.execute(request, cancel).await {
                Ok(output) => {
                    if let Some(value) = parse(&output.stdout) {
                        debug!(program = %candidate.program, "CLI candidate succeeded");
                        return Ok(value);
                    }
                    debug!(program = %candidate.program, "CLI candidate output missing credentials");
                    last_failure = Some(Error::json_parse(
                        format!("{} stdout", candidate.program),
                        "expected JSON with an access token and instance URL",
                    ));
                }
                Err(e) if e.is_cli_not_found() => {
                    not_found += 1;
                    last_failure = Some(e);
                }
                Err(
                    e @ (Error::CliTimeout { .. } | Error::BufferExceeded { .. } | Error::Aborted),
                ) => {
                    // Hard execution failures are not a candidate problem;
                    // the next invocation would hit the same wall.
                    return Err(PassOutcome::Failed(e));
                }
                Err(e) => {
                    debug!(program = %candidate.program, error = %e, "CLI candidate failed");
                    last_failure = Some(e);
                }
            }
        }

        if not_found == candidates.len() {
            return Err(PassOutcome::AllNotFound);
        }

        let detail = last_failure.map_or_else(
            || "no CLI candidate produced credentials".to_string(),
            |e| format!("no CLI candidate produced credentials: {e}"),
        );
        warn!(%detail, "credential resolution exhausted all candidates");
        Err(PassOutcome::Failed(Error::auth(detail)))
    }
}

fn not_found_error(candidates: &[Candidate]) -> Error {
    Error::CliNotFound {
        program: candidates
            .first()
            .map_or("sf", |c| c.program)
            .to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct DisplayPayload {
    result: Option<DisplayResult>,
}

#[derive(Debug, Deserialize)]
struct DisplayResult {
    #[serde(rename = "accessToken", alias = "access_token")]
    access_token: Option<String>,
    #[serde(rename = "instanceUrl", alias = "instance_url")]
    instance_url: Option<String>,
    username: Option<String>,
}

fn parse_auth_payload(stdout: &str, fallback_username: Option<String>) -> Option<OrgAuth> {
    let payload: DisplayPayload = serde_json::from_str(stdout).ok()?;
    let result = payload.result?;

    let access_token = result.access_token.filter(|t| !t.is_empty())?;
    let instance_url = result.instance_url.filter(|u| !u.is_empty())?;
    let username = result.username.filter(|u| !u.is_empty()).or(fallback_username);

    Some(OrgAuth::new(access_token, instance_url, username))
}
