//! The log service: listings, bodies and debug levels over the caches.

use crate::cache::{FifoCache, TtlCache};
use crate::http::ToolingClient;
use apexlog_core::{AccessConfig, ApexLogRow, Clock, DebugLevel, OrgAuth, Result, SystemClock};
use reqwest::Method;
use reqwest::header::HeaderMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Identity of one cached log listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ListKey {
    pub instance_url: String,
    pub username: String,
    pub limit: u32,
    pub offset: u32,
}

/// Identity of one cached log head.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct HeadKey {
    pub instance_url: String,
    pub username: String,
    pub log_id: String,
}

/// Fetches Apex debug logs through the Tooling API, caching listings for a
/// short TTL and log heads for the process lifetime.
///
/// Owned by the embedding application and shared by reference; all cache
/// state lives here and is resettable for tests.
pub struct LogService {
    client: Arc<ToolingClient>,
    config: AccessConfig,
    clock: Arc<dyn Clock>,
    list_cache: Mutex<TtlCache<ListKey, Vec<ApexLogRow>>>,
    head_cache: Mutex<FifoCache<HeadKey, Vec<String>>>,
}

impl std::fmt::Debug for LogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LogService {
    /// Create a service over the given client with the real clock
    #[must_use]
    pub fn new(config: AccessConfig, client: Arc<ToolingClient>) -> Self {
        Self::with_clock(config, client, Arc::new(SystemClock))
    }

    /// Create a service with an injected clock (the test seam)
    #[must_use]
    pub fn with_clock(config: AccessConfig, client: Arc<ToolingClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            list_cache: Mutex::new(TtlCache::new(config.list_cache_ttl, clock.clone())),
            head_cache: Mutex::new(FifoCache::new(config.head_cache_max_entries)),
            config,
            clock,
        }
    }

    pub(crate) fn client(&self) -> &ToolingClient {
        &self.client
    }

    pub(crate) fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn head_cache(&self) -> &Mutex<FifoCache<HeadKey, Vec<String>>> {
        &self.head_cache
    }

    pub(crate) fn head_key(&self, auth: &OrgAuth, log_id: &str) -> HeadKey {
        HeadKey {
            instance_url: auth.instance_url(),
            username: auth.username().unwrap_or_default(),
            log_id: log_id.to_string(),
        }
    }

    /// Drop all cached listings and heads
    pub fn reset_caches(&self) {
        self.list_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .reset();
        self.head_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .reset();
    }

    /// List debug logs, newest first.
    ///
    /// `limit` is clamped into `[1, 200]` and `offset` to `>= 0`.
    /// Unfiltered listings are served from a 3-second cache keyed by
    /// `(instance, user, limit, offset)`; a debug-level filter bypasses the
    /// cache entirely in both directions.
    pub async fn fetch_apex_logs(
        &self,
        auth: &OrgAuth,
        limit: i64,
        offset: i64,
        debug_level_filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ApexLogRow>> {
        let limit = u32::try_from(limit.clamp(1, 200)).unwrap_or(1);
        let offset = u32::try_from(offset.max(0)).unwrap_or(0);

        let key = ListKey {
            instance_url: auth.instance_url(),
            username: auth.username().unwrap_or_default(),
            limit,
            offset,
        };

        if debug_level_filter.is_none()
            && let Some(rows) = self
                .list_cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(&key)
        {
            debug!(limit, offset, "serving log listing from cache");
            return Ok(rows);
        }

        let soql = log_list_soql(limit, offset, debug_level_filter);
        let rows: Vec<ApexLogRow> = self.client.tooling_query(auth, &soql, cancel).await?;

        if debug_level_filter.is_none() {
            self.list_cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key, rows.clone());
        }

        Ok(rows)
    }

    /// Fetch the full body of one log (no cache)
    pub async fn fetch_apex_log_body(
        &self,
        auth: &OrgAuth,
        log_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let url = self.client.log_body_url(auth, log_id);
        self.client
            .request_with_auth(auth, Method::GET, url, HeaderMap::new(), None, cancel)
            .await
    }

    /// List the org's named debug levels (no cache)
    pub async fn list_debug_levels(
        &self,
        auth: &OrgAuth,
        cancel: &CancellationToken,
    ) -> Result<Vec<DebugLevel>> {
        self.client
            .tooling_query(
                auth,
                "SELECT Id, DeveloperName, MasterLabel FROM DebugLevel ORDER BY DeveloperName",
                cancel,
            )
            .await
    }
}

/// Escape a value for interpolation into a quoted SOQL literal
pub(crate) fn soql_quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn log_list_soql(limit: u32, offset: u32, debug_level_filter: Option<&str>) -> String {
    let mut soql = String::from(
        "SELECT Id, StartTime, Operation, Application, DurationMilliseconds, \
         Status, Request, LogLength, LogUser.Name FROM ApexLog",
    );

    if let Some(filter) = debug_level_filter {
        soql.push_str(&format!(
            " WHERE LogUserId IN (SELECT TracedEntityId FROM TraceFlag \
             WHERE DebugLevel.DeveloperName = '{}')",
            soql_quote(filter)
        ));
    }

    soql.push_str(&format!(
        " ORDER BY StartTime DESC LIMIT {limit} OFFSET {offset}"
    ));
    soql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{display_json, resolver_returning};
    use apexlog_core::test_utils::ManualClock;
    use std::time::Duration;
    use wiremock::matchers::{method as http_method, path, query_param_contains};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn service_for(server: &MockServer, clock: Arc<ManualClock>) -> LogService {
        let resolver = resolver_returning(&display_json("fresh", &server.uri()));
        let config = AccessConfig::default();
        let client = Arc::new(ToolingClient::new(&config, resolver).unwrap());
        LogService::with_clock(config, client, clock)
    }

    fn auth_for(server: &MockServer) -> OrgAuth {
        OrgAuth::new("token", server.uri(), Some("dev@corp.example".to_string()))
    }

    fn listing_body(ids: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "totalSize": ids.len(),
            "done": true,
            "records": ids
                .iter()
                .map(|id| serde_json::json!({ "Id": id, "Status": "Success" }))
                .collect::<Vec<_>>()
        })
    }

    async fn mount_listing(server: &MockServer, ids: &[&str]) {
        Mock::given(http_method("GET"))
            .and(path("/services/data/v64.0/tooling/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(ids)))
            .mount(server)
            .await;
    }

    fn recorded_soql(request: &Request) -> String {
        request
            .url
            .query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_limit_and_offset_are_clamped() {
        let server = MockServer::start().await;
        mount_listing(&server, &["07L1"]).await;

        let service = service_for(&server, Arc::new(ManualClock::new()));
        service
            .fetch_apex_logs(&auth_for(&server), 500, -3, None, &CancellationToken::new())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let soql = recorded_soql(&requests[0]);
        assert!(soql.ends_with("LIMIT 200 OFFSET 0"), "got: {soql}");
    }

    #[tokio::test]
    async fn test_listing_served_from_cache_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/services/data/v64.0/tooling/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(&["07L1"])))
            .expect(1)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new());
        let service = service_for(&server, clock.clone());
        let auth = auth_for(&server);

        let first = service
            .fetch_apex_logs(&auth, 50, 0, None, &CancellationToken::new())
            .await
            .unwrap();
        clock.advance(Duration::from_millis(2999));
        let second = service
            .fetch_apex_logs(&auth, 50, 0, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_listing_refetched_after_ttl() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/services/data/v64.0/tooling/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(&["07L1"])))
            .expect(2)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new());
        let service = service_for(&server, clock.clone());
        let auth = auth_for(&server);

        service
            .fetch_apex_logs(&auth, 50, 0, None, &CancellationToken::new())
            .await
            .unwrap();
        clock.advance(Duration::from_millis(3000));
        service
            .fetch_apex_logs(&auth, 50, 0, None, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_distinct_pagination_is_cached_separately() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/services/data/v64.0/tooling/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(&["07L1"])))
            .expect(2)
            .mount(&server)
            .await;

        let service = service_for(&server, Arc::new(ManualClock::new()));
        let auth = auth_for(&server);

        service
            .fetch_apex_logs(&auth, 50, 0, None, &CancellationToken::new())
            .await
            .unwrap();
        service
            .fetch_apex_logs(&auth, 50, 50, None, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_filtered_requests_bypass_cache() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/services/data/v64.0/tooling/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(&["07L1"])))
            .expect(3)
            .mount(&server)
            .await;

        let service = service_for(&server, Arc::new(ManualClock::new()));
        let auth = auth_for(&server);
        let cancel = CancellationToken::new();

        // A filtered fetch neither reads nor populates the cache.
        service
            .fetch_apex_logs(&auth, 50, 0, Some("SFDC_DevConsole"), &cancel)
            .await
            .unwrap();
        service
            .fetch_apex_logs(&auth, 50, 0, Some("SFDC_DevConsole"), &cancel)
            .await
            .unwrap();
        service
            .fetch_apex_logs(&auth, 50, 0, None, &cancel)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_filter_lands_in_soql() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/services/data/v64.0/tooling/query"))
            .and(query_param_contains("q", "DebugLevel.DeveloperName = 'MyLevel'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(&[])))
            .expect(1)
            .mount(&server)
            .await;

        let service = service_for(&server, Arc::new(ManualClock::new()));
        service
            .fetch_apex_logs(
                &auth_for(&server),
                50,
                0,
                Some("MyLevel"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reset_caches_forces_refetch() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/services/data/v64.0/tooling/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(&["07L1"])))
            .expect(2)
            .mount(&server)
            .await;

        let service = service_for(&server, Arc::new(ManualClock::new()));
        let auth = auth_for(&server);

        service
            .fetch_apex_logs(&auth, 50, 0, None, &CancellationToken::new())
            .await
            .unwrap();
        service.reset_caches();
        service
            .fetch_apex_logs(&auth, 50, 0, None, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fetch_body_returns_raw_text() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path(
                "/services/data/v64.0/tooling/sobjects/ApexLog/07L1/Body",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string("EXECUTION_STARTED\n"))
            .expect(1)
            .mount(&server)
            .await;

        let service = service_for(&server, Arc::new(ManualClock::new()));
        let body = service
            .fetch_apex_log_body(&auth_for(&server), "07L1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(body, "EXECUTION_STARTED\n");
    }

    #[tokio::test]
    async fn test_list_debug_levels() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/services/data/v64.0/tooling/query"))
            .and(query_param_contains("q", "FROM DebugLevel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalSize": 1,
                "done": true,
                "records": [
                    { "Id": "7dl1", "DeveloperName": "SFDC_DevConsole", "MasterLabel": "SFDC_DevConsole" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service = service_for(&server, Arc::new(ManualClock::new()));
        let levels = service
            .list_debug_levels(&auth_for(&server), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].developer_name, "SFDC_DevConsole");
    }

    #[test]
    fn test_soql_quote_escapes() {
        assert_eq!(soql_quote("O'Neil"), "O\\'Neil");
        assert_eq!(soql_quote(r"a\b"), r"a\\b");
    }
}
