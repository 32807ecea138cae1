//! Shared data model for the apexlog crates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

/// A point-in-time view of org credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    /// Bearer token for REST calls
    pub access_token: String,
    /// Base URL of the org instance
    pub instance_url: String,
    /// Username the credentials belong to, when the CLI reported one
    pub username: Option<String>,
}

impl fmt::Debug for AuthSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSnapshot")
            .field("access_token", &"<redacted>")
            .field("instance_url", &self.instance_url)
            .field("username", &self.username)
            .finish()
    }
}

/// Shared, refreshable org credentials.
///
/// Cloning the handle shares the underlying state: when the HTTP layer
/// refreshes a stale token in place, every holder observes the new value.
/// The lock is only ever held for a field copy, never across an await.
#[derive(Clone, Debug)]
pub struct OrgAuth {
    inner: Arc<RwLock<AuthSnapshot>>,
}

impl OrgAuth {
    /// Create credentials from a resolved token/instance pair
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        instance_url: impl Into<String>,
        username: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AuthSnapshot {
                access_token: access_token.into(),
                instance_url: instance_url.into(),
                username,
            })),
        }
    }

    /// Copy out the current credential state
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// The current bearer token
    #[must_use]
    pub fn access_token(&self) -> String {
        self.snapshot().access_token
    }

    /// The current instance base URL, without a trailing slash
    #[must_use]
    pub fn instance_url(&self) -> String {
        let url = self.snapshot().instance_url;
        url.trim_end_matches('/').to_string()
    }

    /// The username the credentials were resolved for
    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.snapshot().username
    }

    /// Replace the credential state in place after a refresh.
    ///
    /// All clones of this handle observe the new token immediately.
    pub fn replace(&self, refreshed: AuthSnapshot) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = refreshed;
    }
}

/// One Apex debug log record, as returned by the Tooling API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApexLogRow {
    /// Record id
    pub id: String,
    /// When the logged request started (API datetime string)
    #[serde(default)]
    pub start_time: Option<String>,
    /// The entry-point operation
    #[serde(default)]
    pub operation: Option<String>,
    /// Originating application
    #[serde(default)]
    pub application: Option<String>,
    /// Wall-clock duration of the logged request
    #[serde(default)]
    pub duration_milliseconds: Option<u64>,
    /// Completion status
    #[serde(default)]
    pub status: Option<String>,
    /// Request type
    #[serde(default)]
    pub request: Option<String>,
    /// Body size in bytes
    #[serde(default)]
    pub log_length: Option<u64>,
    /// The user the log was captured for
    #[serde(default)]
    pub log_user: Option<LogUser>,
}

/// The user relation nested inside an [`ApexLogRow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogUser {
    /// Display name of the log's user
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
}

/// One authenticated org known to the local CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgItem {
    /// Login username; the dedup key when merging CLI result groupings
    pub username: String,
    /// Local alias, when one is set
    pub alias: Option<String>,
    /// Whether this is the default org
    pub is_default_username: bool,
    /// Whether this is the default Dev Hub
    pub is_default_dev_hub_username: bool,
    /// Whether this is a scratch org
    pub is_scratch_org: bool,
    /// Instance base URL, when the CLI reported one
    pub instance_url: Option<String>,
}

impl OrgItem {
    /// The label orgs sort by: alias when present, username otherwise
    #[must_use]
    pub fn sort_label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.username)
    }
}

/// One named debug-verbosity bundle, as returned by the Tooling API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugLevel {
    /// Record id
    #[serde(rename = "Id")]
    pub id: String,
    /// API name used when provisioning trace flags
    #[serde(rename = "DeveloperName")]
    pub developer_name: String,
    /// Display label
    #[serde(rename = "MasterLabel", default)]
    pub master_label: Option<String>,
}
