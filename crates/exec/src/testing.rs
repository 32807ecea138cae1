//! Scripted [`ProcessRunner`] doubles shared by the apexlog test suites.

use crate::runner::{CommandSpec, ProcessRunner, RawOutput};
use apexlog_core::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

type Handler = dyn Fn(&CommandSpec) -> Result<RawOutput> + Send + Sync;

/// A runner that answers from a scripted handler and records every call.
pub struct ScriptedRunner {
    handler: Box<Handler>,
    delay: Option<Duration>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    /// Answer every call through `handler`
    pub fn new(handler: impl Fn(&CommandSpec) -> Result<RawOutput> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with a zero exit and the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        let stdout = stdout.into();
        Self::new(move |_| Ok(RawOutput::success(stdout.clone())))
    }

    /// Sleep before answering, to widen concurrency windows in tests
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `run` was invoked
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Every recorded invocation, in order
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<RawOutput> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(spec.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.handler)(spec)
    }
}
