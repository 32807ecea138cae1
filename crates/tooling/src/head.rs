//! Cheap access to the first lines of a log body.
//!
//! The fast path asks for an uncompressed byte range and is only trusted
//! when the server honors it exactly (206, no encoding transformation);
//! anything else falls back to a streaming GET that hangs up as soon as
//! enough lines have arrived. Because logs are immutable, fetched prefixes
//! are cached for the process lifetime under a longer-prefix-wins merge.

use crate::logs::LogService;
use apexlog_core::{Error, OrgAuth, Result};
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_RANGE, RANGE};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bodies at or below this size are range-fetched whole
const SMALL_BODY_LIMIT: u64 = 4096;

/// Range size when the body is large or its size unknown
const DEFAULT_STRIDE: u64 = 8192;

enum StreamAttempt {
    Lines(Vec<String>),
    Unauthorized,
}

impl LogService {
    /// Fetch the first `max_lines` lines of a log body.
    ///
    /// Served from the head cache when a long-enough prefix is already
    /// known; otherwise a byte-range request is attempted, with a
    /// streaming fallback when the range is not honored. The cache is
    /// updated under a longer-prefix-wins merge, capped at the configured
    /// line count, so cached coverage never shrinks.
    pub async fn fetch_apex_log_head(
        &self,
        auth: &OrgAuth,
        log_id: &str,
        max_lines: usize,
        known_length_bytes: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let key = self.head_key(auth, log_id);

        {
            let cache = self
                .head_cache()
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(cached) = cache.get(&key)
                && cached.len() >= max_lines
            {
                debug!(log_id, max_lines, "serving log head from cache");
                return Ok(cached[..max_lines].to_vec());
            }
        }

        let work = self.fetch_head_lines(auth, log_id, max_lines, known_length_bytes, cancel);
        let mut lines = tokio::select! {
            () = cancel.cancelled() => return Err(Error::Aborted),
            result = work => result?,
        };

        let cap = self.config().head_cache_max_lines;
        let retained: Vec<String> = lines.iter().take(cap).cloned().collect();
        {
            let mut cache = self
                .head_cache()
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let longer_than_cached = cache
                .get(&key)
                .is_none_or(|existing| existing.len() < retained.len());
            if longer_than_cached {
                cache.insert(key, retained);
            }
        }

        lines.truncate(max_lines);
        Ok(lines)
    }

    async fn fetch_head_lines(
        &self,
        auth: &OrgAuth,
        log_id: &str,
        max_lines: usize,
        known_length_bytes: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        if let Some(lines) = self.range_head_fetch(auth, log_id, known_length_bytes).await? {
            return Ok(lines);
        }

        debug!(log_id, "range request not honored; falling back to streaming");
        self.streaming_head_fetch(auth, log_id, max_lines, cancel).await
    }

    /// Attempt the byte-range fast path; `None` means fall back.
    async fn range_head_fetch(
        &self,
        auth: &OrgAuth,
        log_id: &str,
        known_length_bytes: Option<u64>,
    ) -> Result<Option<Vec<String>>> {
        let stride = match known_length_bytes {
            Some(len) if len <= SMALL_BODY_LIMIT => len.max(1),
            _ => DEFAULT_STRIDE,
        };

        let url = self.client().log_body_url(auth, log_id);
        let response = self
            .client()
            .http()
            .get(&url)
            .bearer_auth(auth.access_token())
            .header(RANGE, format!("bytes=0-{}", stride - 1))
            .header(ACCEPT_ENCODING, "identity")
            .send()
            .await
            .map_err(|e| Error::http(format!("{url}: {e}")))?;

        if response.status() != StatusCode::PARTIAL_CONTENT {
            debug!(status = %response.status(), "range request answered without partial content");
            return Ok(None);
        }

        if let Some(encoding) = response.headers().get(CONTENT_ENCODING) {
            let value = encoding.to_str().unwrap_or_default();
            if !value.is_empty() && !value.eq_ignore_ascii_case("identity") {
                debug!(encoding = %value, "range response was transfer-encoded");
                return Ok(None);
            }
        }

        let complete = range_reached_end(
            response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok()),
        );

        let text = response
            .text()
            .await
            .map_err(|e| Error::http(format!("{url}: reading range body: {e}")))?;

        Ok(Some(split_prefix_lines(&text, complete)))
    }

    async fn streaming_head_fetch(
        &self,
        auth: &OrgAuth,
        log_id: &str,
        max_lines: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        match self.stream_head_once(auth, log_id, max_lines).await? {
            StreamAttempt::Lines(lines) => Ok(lines),
            StreamAttempt::Unauthorized => {
                self.client().refresh(auth, cancel).await?;
                match self.stream_head_once(auth, log_id, max_lines).await? {
                    StreamAttempt::Lines(lines) => Ok(lines),
                    StreamAttempt::Unauthorized => Err(Error::AuthExpired {
                        url: self.client().log_body_url(auth, log_id),
                    }),
                }
            }
        }
    }

    async fn stream_head_once(
        &self,
        auth: &OrgAuth,
        log_id: &str,
        max_lines: usize,
    ) -> Result<StreamAttempt> {
        let url = self.client().log_body_url(auth, log_id);
        let response = self
            .client()
            .http()
            .get(&url)
            .bearer_auth(auth.access_token())
            .send()
            .await
            .map_err(|e| Error::http(format!("{url}: {e}")))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(StreamAttempt::Unauthorized);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::HttpStatus { status, url, body });
        }

        let mut stream = response.bytes_stream();
        let mut pending = String::new();
        let mut lines: Vec<String> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::http(format!("{url}: {e}")))?;
            pending.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = pending.find('\n') {
                let line = pending[..newline].trim_end_matches('\r').to_string();
                lines.push(line);
                pending.drain(..=newline);

                if lines.len() >= max_lines {
                    // Dropping the stream hangs up without reading the rest.
                    return Ok(StreamAttempt::Lines(lines));
                }
            }
        }

        if !pending.is_empty() {
            lines.push(pending);
        }
        Ok(StreamAttempt::Lines(lines))
    }
}

/// Whether a `Content-Range` header says the range covers the whole body
fn range_reached_end(content_range: Option<&str>) -> bool {
    let Some(value) = content_range else {
        return false;
    };
    let Some(spec) = value.strip_prefix("bytes ") else {
        return false;
    };
    let Some((range, total)) = spec.split_once('/') else {
        return false;
    };
    let Some((_, end)) = range.split_once('-') else {
        return false;
    };
    match (end.trim().parse::<u64>(), total.trim().parse::<u64>()) {
        (Ok(end), Ok(total)) => end + 1 >= total,
        _ => false,
    }
}

/// Split a fetched prefix into lines.
///
/// A trailing segment without a newline is only a real line when the
/// fetch covered the whole body; otherwise it is a truncation artifact
/// and is dropped.
fn split_prefix_lines(text: &str, complete: bool) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut rest = text;

    while let Some(newline) = rest.find('\n') {
        lines.push(rest[..newline].trim_end_matches('\r').to_string());
        rest = &rest[newline + 1..];
    }

    if complete && !rest.is_empty() {
        lines.push(rest.to_string());
    }

    lines
}
