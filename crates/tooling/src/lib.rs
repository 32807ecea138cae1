//! Tooling API access for Apex debug logs.
//!
//! This crate is the network half of the access layer: a pooled HTTP
//! client with one-shot 401 credential refresh, a log service with a
//! short-TTL listing cache and a never-expiring growing-prefix head cache,
//! and a best-effort trace-flag provisioner.

pub mod cache;
mod head;
pub mod http;
pub mod logs;
mod trace;

#[cfg(test)]
pub(crate) mod testing;

pub use http::{CreateResponse, QueryResponse, ToolingClient};
pub use logs::LogService;
pub use trace::DEFAULT_TRACE_TTL_MINUTES;
