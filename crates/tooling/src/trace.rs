//! Best-effort provisioning of a user trace flag.
//!
//! A trace flag is a warmup convenience, not a critical path: every
//! internal failure is logged and converted into a `false` return, so the
//! embedding tool can always proceed to fetch whatever logs already exist.

use crate::logs::{LogService, soql_quote};
use apexlog_core::{OrgAuth, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Validity window length when the caller does not choose one
pub const DEFAULT_TRACE_TTL_MINUTES: i64 = 30;

const TRACE_LOG_TYPE: &str = "USER_DEBUG";

#[derive(Debug, Deserialize)]
struct UserRow {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct TraceFlagRow {
    #[serde(rename = "Id")]
    #[allow(dead_code)]
    id: String,
    #[serde(rename = "StartDate", default)]
    start_date: Option<String>,
    #[serde(rename = "ExpirationDate", default)]
    expiration_date: Option<String>,
}

impl TraceFlagRow {
    /// Whether this record's validity window contains `now`
    fn covers(&self, now: DateTime<Utc>) -> bool {
        let Some(start) = self.start_date.as_deref().and_then(parse_api_datetime) else {
            return false;
        };
        let Some(end) = self.expiration_date.as_deref().and_then(parse_api_datetime) else {
            return false;
        };
        start <= now && now < end
    }
}

impl LogService {
    /// Ensure a trace flag captures the current user's activity.
    ///
    /// Returns `true` only when a new record was created and the platform
    /// reported the create as successful; `false` for every no-op path
    /// (an active record already covers now, the user or debug level
    /// cannot be resolved) and for every internal error. Never returns an
    /// error.
    pub async fn ensure_user_trace_flag(
        &self,
        auth: &OrgAuth,
        debug_level_developer_name: &str,
        ttl_minutes: i64,
        cancel: &CancellationToken,
    ) -> bool {
        match self
            .provision_trace_flag(auth, debug_level_developer_name, ttl_minutes, cancel)
            .await
        {
            Ok(created) => created,
            Err(e) => {
                warn!(error = %e, "trace flag provisioning failed");
                false
            }
        }
    }

    async fn provision_trace_flag(
        &self,
        auth: &OrgAuth,
        debug_level_developer_name: &str,
        ttl_minutes: i64,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let Some(username) = auth.username().filter(|u| !u.is_empty()) else {
            debug!("no username on credentials; skipping trace flag");
            return Ok(false);
        };

        let users: Vec<UserRow> = self
            .client()
            .query(
                auth,
                &format!(
                    "SELECT Id FROM User WHERE Username = '{}'",
                    soql_quote(&username)
                ),
                cancel,
            )
            .await?;
        let Some(user) = users.first() else {
            debug!(%username, "user not resolvable; skipping trace flag");
            return Ok(false);
        };

        let now = self.clock().now_utc();
        let existing: Vec<TraceFlagRow> = self
            .client()
            .tooling_query(
                auth,
                &format!(
                    "SELECT Id, StartDate, ExpirationDate FROM TraceFlag \
                     WHERE TracedEntityId = '{}' AND LogType = '{TRACE_LOG_TYPE}'",
                    soql_quote(&user.id)
                ),
                cancel,
            )
            .await?;
        if existing.iter().any(|flag| flag.covers(now)) {
            debug!("an active trace flag already covers now");
            return Ok(false);
        }

        let levels: Vec<apexlog_core::DebugLevel> = self
            .client()
            .tooling_query(
                auth,
                &format!(
                    "SELECT Id, DeveloperName, MasterLabel FROM DebugLevel \
                     WHERE DeveloperName = '{}'",
                    soql_quote(debug_level_developer_name)
                ),
                cancel,
            )
            .await?;
        let Some(level) = levels.first() else {
            debug!(
                developer_name = debug_level_developer_name,
                "debug level not found; skipping trace flag"
            );
            return Ok(false);
        };

        // Backdate the start slightly so the window is already open when
        // the platform evaluates it.
        let start = now - Duration::seconds(1);
        let end = now + Duration::minutes(ttl_minutes);

        let created = self
            .client()
            .tooling_create(
                auth,
                "TraceFlag",
                serde_json::json!({
                    "TracedEntityId": user.id,
                    "DebugLevelId": level.id,
                    "LogType": TRACE_LOG_TYPE,
                    "StartDate": format_api_datetime(start),
                    "ExpirationDate": format_api_datetime(end),
                }),
                cancel,
            )
            .await?;

        debug!(success = created.success, id = ?created.id, "trace flag create answered");
        Ok(created.success)
    }
}

/// Render a datetime in the platform's required UTC literal format
fn format_api_datetime(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.3f+0000").to_string()
}

/// Parse the platform's UTC datetime literal (also accepts `Z`/offset forms)
fn parse_api_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.3f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
