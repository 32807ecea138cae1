//! REST access to the Tooling API with one-shot credential refresh.
//!
//! Requests are issued once; a 401 triggers exactly one in-place refresh
//! through the credential resolver and one retry. A second consecutive
//! 401 is terminal, guaranteeing the retry loop cannot spin.

use apexlog_auth::CredentialResolver;
use apexlog_core::{AccessConfig, Error, OrgAuth, Result};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// The envelope every query endpoint wraps its records in.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse<T> {
    /// Matched records
    #[serde(default = "Vec::new")]
    pub records: Vec<T>,
    /// Total match count, which can exceed `records.len()`
    #[serde(rename = "totalSize", default)]
    pub total_size: Option<u64>,
    /// Whether this response is the final page
    #[serde(default)]
    pub done: Option<bool>,
}

/// Outcome of a sobject create call.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateResponse {
    /// Id of the created record
    #[serde(default)]
    pub id: Option<String>,
    /// Whether the platform reported the create as successful
    #[serde(default)]
    pub success: bool,
    /// Structured error entries, when the create failed
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

/// Pooled HTTP client over the Tooling and standard REST surfaces.
#[derive(Debug)]
pub struct ToolingClient {
    http: reqwest::Client,
    resolver: Arc<CredentialResolver>,
    api_version: String,
}

impl ToolingClient {
    /// Create a client with a pooled connection and the configured API
    /// version.
    pub fn new(config: &AccessConfig, resolver: Arc<CredentialResolver>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("apexlog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            resolver,
            api_version: config.api_version.clone(),
        })
    }

    /// The REST API version requests are issued against
    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Absolute URL of an ApexLog body resource
    pub(crate) fn log_body_url(&self, auth: &OrgAuth, log_id: &str) -> String {
        format!(
            "{}/services/data/v{}/tooling/sobjects/ApexLog/{}/Body",
            auth.instance_url(),
            self.api_version,
            log_id
        )
    }

    /// Issue a request with bearer auth, refreshing credentials in place
    /// on a single 401.
    pub async fn request_with_auth(
        &self,
        auth: &OrgAuth,
        method: Method,
        url: String,
        headers: HeaderMap,
        body: Option<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let work = async {
            let first = self
                .send(auth, method.clone(), &url, &headers, body.as_ref())
                .await?;

            if first.status() != StatusCode::UNAUTHORIZED {
                return read_checked(first, &url).await;
            }

            self.refresh(auth, cancel).await?;

            let second = self.send(auth, method, &url, &headers, body.as_ref()).await?;
            if second.status() == StatusCode::UNAUTHORIZED {
                return Err(Error::AuthExpired { url });
            }
            read_checked(second, &url).await
        };

        tokio::select! {
            () = cancel.cancelled() => Err(Error::Aborted),
            result = work => result,
        }
    }

    /// Run a SOQL query against the Tooling API and return its records
    pub async fn tooling_query<T: DeserializeOwned>(
        &self,
        auth: &OrgAuth,
        soql: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let url = self.query_url(auth, "tooling/query", soql)?;
        self.fetch_records(auth, url, cancel).await
    }

    /// Run a SOQL query against the standard (non-tooling) API
    pub async fn query<T: DeserializeOwned>(
        &self,
        auth: &OrgAuth,
        soql: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let url = self.query_url(auth, "query", soql)?;
        self.fetch_records(auth, url, cancel).await
    }

    /// Create a record in a tooling sobject collection
    pub async fn tooling_create(
        &self,
        auth: &OrgAuth,
        sobject: &str,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<CreateResponse> {
        let url = format!(
            "{}/services/data/v{}/tooling/sobjects/{}",
            auth.instance_url(),
            self.api_version,
            sobject
        );
        let body = self
            .request_with_auth(auth, Method::POST, url, HeaderMap::new(), Some(payload), cancel)
            .await?;

        serde_json::from_str(&body)
            .map_err(|e| Error::json_parse(format!("{sobject} create response"), e.to_string()))
    }

    /// Re-resolve credentials and swap them into the shared handle.
    pub(crate) async fn refresh(&self, auth: &OrgAuth, cancel: &CancellationToken) -> Result<()> {
        debug!("401 received; refreshing org credentials in place");
        let target = auth.username();
        let fresh = self.resolver.org_auth(target.as_deref(), cancel).await?;
        auth.replace(fresh.snapshot());
        Ok(())
    }

    fn query_url(&self, auth: &OrgAuth, endpoint: &str, soql: &str) -> Result<String> {
        let base = format!(
            "{}/services/data/v{}/{}",
            auth.instance_url(),
            self.api_version,
            endpoint
        );
        let url = Url::parse_with_params(&base, &[("q", soql)])
            .map_err(|e| Error::http(format!("invalid query URL: {e}")))?;
        Ok(url.into())
    }

    async fn fetch_records<T: DeserializeOwned>(
        &self,
        auth: &OrgAuth,
        url: String,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let body = self
            .request_with_auth(auth, Method::GET, url, HeaderMap::new(), None, cancel)
            .await?;

        let response: QueryResponse<T> = serde_json::from_str(&body)
            .map_err(|e| Error::json_parse("query response", e.to_string()))?;
        trace!(records = response.records.len(), total = ?response.total_size, "query returned");
        Ok(response.records)
    }

    async fn send(
        &self,
        auth: &OrgAuth,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .request(method, url)
            .headers(headers.clone())
            .bearer_auth(auth.access_token());

        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .map_err(|e| Error::http(format!("{url}: {e}")))
    }
}

async fn read_checked(response: reqwest::Response, url: &str) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::http(format!("{url}: reading response body: {e}")))?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(Error::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{display_json, resolver_returning};
    use wiremock::matchers::{header, method as http_method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth_for(server: &MockServer, token: &str) -> OrgAuth {
        OrgAuth::new(token, server.uri(), Some("dev@corp.example".to_string()))
    }

    fn client_for(server: &MockServer, refreshed_token: &str) -> ToolingClient {
        let resolver = resolver_returning(&display_json(refreshed_token, &server.uri()));
        ToolingClient::new(&AccessConfig::default(), resolver).unwrap()
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "unused");
        let body = client
            .request_with_auth(
                &auth_for(&server, "initial"),
                Method::GET,
                format!("{}/ping", server.uri()),
                HeaderMap::new(),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(body, "pong");
    }

    #[tokio::test]
    async fn test_single_401_refreshes_and_retries_once() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/guarded"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(http_method("GET"))
            .and(path("/guarded"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "fresh");
        let auth = auth_for(&server, "stale");

        let body = client
            .request_with_auth(
                &auth,
                Method::GET,
                format!("{}/guarded", server.uri()),
                HeaderMap::new(),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(body, "ok");
        // The refresh mutated the shared handle in place.
        assert_eq!(auth.access_token(), "fresh");
    }

    #[tokio::test]
    async fn test_second_consecutive_401_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/guarded"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, "still-stale");
        let err = client
            .request_with_auth(
                &auth_for(&server, "stale"),
                Method::GET,
                format!("{}/guarded", server.uri()),
                HeaderMap::new(),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthExpired { .. }));
    }

    #[tokio::test]
    async fn test_other_statuses_do_not_refresh() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "unused");
        let err = client
            .request_with_auth(
                &auth_for(&server, "initial"),
                Method::GET,
                format!("{}/broken", server.uri()),
                HeaderMap::new(),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            Error::HttpStatus { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tooling_query_decodes_records() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/services/data/v64.0/tooling/query"))
            .and(query_param("q", "SELECT Id FROM ApexLog"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalSize": 1,
                "done": true,
                "records": [{ "Id": "07L000000000001" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        #[derive(Debug, Deserialize)]
        struct IdOnly {
            #[serde(rename = "Id")]
            id: String,
        }

        let client = client_for(&server, "unused");
        let rows: Vec<IdOnly> = client
            .tooling_query(
                &auth_for(&server, "t"),
                "SELECT Id FROM ApexLog",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "07L000000000001");
    }

    #[tokio::test]
    async fn test_cancellation_aborts_request() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, "unused");
        let cancel = CancellationToken::new();
        let auth = auth_for(&server, "t");

        let pending = client.request_with_auth(
            &auth,
            Method::GET,
            format!("{}/slow", server.uri()),
            HeaderMap::new(),
            None,
            &cancel,
        );
        tokio::pin!(pending);

        tokio::select! {
            _ = &mut pending => panic!("request should not have finished"),
            () = tokio::time::sleep(std::time::Duration::from_millis(20)) => cancel.cancel(),
        }

        assert!(matches!(pending.await, Err(Error::Aborted)));
    }
}
