//! Shared fixtures for the tooling test suites.

use apexlog_auth::CredentialResolver;
use apexlog_core::AccessConfig;
use apexlog_exec::testing::ScriptedRunner;
use apexlog_exec::{CommandExecutor, LoginPathRecovery};
use std::sync::Arc;

/// A CLI `org display` payload carrying the given token and instance
pub(crate) fn display_json(token: &str, instance_url: &str) -> String {
    serde_json::json!({
        "status": 0,
        "result": {
            "accessToken": token,
            "instanceUrl": instance_url,
            "username": "dev@corp.example",
        }
    })
    .to_string()
}

/// A resolver whose CLI always answers with `stdout`
pub(crate) fn resolver_returning(stdout: &str) -> Arc<CredentialResolver> {
    let runner = Arc::new(ScriptedRunner::ok(stdout.to_string()));
    let config = AccessConfig::default();
    Arc::new(CredentialResolver::with_parts(
        Arc::new(CommandExecutor::with_runner(runner.clone(), &config)),
        Arc::new(LoginPathRecovery::with_runner(runner)),
    ))
}
