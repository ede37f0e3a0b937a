use chrono::{DateTime, Utc};
use log::{debug, warn};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A raw event exactly as the upstream service hands it over. Filtering and
/// recognized-type validation are the caller's job (`events-ingest`), not
/// this client's — the client's only responsibility is faithfully decoding
/// the wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub repo: RawRepo,
    pub actor: RawActor,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRepo {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawActor {
    #[serde(default)]
    pub login: String,
}

/// Upstream-reported remaining request budget and when it resets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitState {
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

/// The outcome of one conditional fetch against a single endpoint key
/// (global, or one `owner/name`).
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub events: Vec<RawEvent>,
    pub new_etag: Option<String>,
    pub poll_interval_hint: Option<Duration>,
    pub rate_limit: RateLimitState,
    /// `false` when the upstream responded "not modified": `events` is empty
    /// and `new_etag` is the caller's prior tag, unchanged.
    pub modified: bool,
}

#[derive(Debug, Error, Diagnostic)]
pub enum UpstreamError {
    #[error("upstream rate limit exhausted, retry after {retry_after:?}")]
    Throttled { retry_after: Duration },

    #[error("transport error contacting upstream")]
    Transport(#[source] reqwest::Error),

    #[error("upstream reported a server error ({code})")]
    ServerError { code: u16 },

    #[error("upstream returned an unrecoverable status {code}")]
    Permanent { code: u16 },

    #[error("upstream rejected our authorization token")]
    Auth,

    #[error("error building upstream request")]
    RequestBuild(#[source] reqwest::Error),

    #[error("error decoding upstream response body")]
    Decode(#[source] reqwest::Error),
}

impl UpstreamError {
    /// `true` for failures the ingestion engine should retry with
    /// exponential backoff rather than logging and waiting for the next
    /// regularly scheduled tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UpstreamError::Transport(_) | UpstreamError::ServerError { .. }
        )
    }
}

const GITHUB_API_BASE: &str = "https://api.github.com";

/// Wraps the upstream activity-events endpoint: conditional GETs, header
/// extraction, and JSON decoding. Holds no poll-pacing or storage state —
/// that lives in the ingestion engine.
pub struct EventsClient {
    client: reqwest::Client,
    user_agent: String,
    token: Option<String>,
    base_url: String,
}

impl EventsClient {
    pub fn new(user_agent: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            user_agent: user_agent.into(),
            token,
            base_url: GITHUB_API_BASE.to_string(),
        }
    }

    /// Point the client at a different base URL. Used by tests against a
    /// local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn fetch_global(&self, etag: Option<&str>) -> Result<FetchResult, UpstreamError> {
        let url = format!("{}/events", self.base_url);
        self.fetch(&url, etag).await
    }

    pub async fn fetch_repo(
        &self,
        owner_name: &str,
        etag: Option<&str>,
    ) -> Result<FetchResult, UpstreamError> {
        let url = format!("{}/repos/{}/events", self.base_url, owner_name);
        self.fetch(&url, etag).await
    }

    async fn fetch(&self, url: &str, etag: Option<&str>) -> Result<FetchResult, UpstreamError> {
        let mut builder = self.client.get(url).header("User-Agent", &self.user_agent);

        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("token {}", token));
        }
        if let Some(etag) = etag {
            builder = builder.header("If-None-Match", etag);
        }

        let request = builder.build().map_err(UpstreamError::RequestBuild)?;

        debug!("Fetching {url} (conditional on {etag:?})");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(UpstreamError::Transport)?;

        let status = response.status();
        let rate_limit = rate_limit_from_headers(response.headers());
        let poll_interval_hint = poll_interval_from_headers(response.headers());
        let new_etag = etag_from_headers(response.headers());

        if status.as_u16() == 304 {
            debug!("{url} not modified");
            return Ok(FetchResult {
                events: Vec::new(),
                new_etag: new_etag.or_else(|| etag.map(str::to_string)),
                poll_interval_hint,
                rate_limit,
                modified: false,
            });
        }

        if status.as_u16() == 429 {
            let retry_after = retry_after_from_headers(response.headers())
                .unwrap_or(Duration::from_secs(60));
            warn!("{url} throttled, retry after {retry_after:?}");
            return Err(UpstreamError::Throttled { retry_after });
        }

        if status.as_u16() == 401 {
            return Err(UpstreamError::Auth);
        }

        if status.is_server_error() {
            return Err(UpstreamError::ServerError { code: status.as_u16() });
        }

        if status.is_client_error() {
            return Err(UpstreamError::Permanent { code: status.as_u16() });
        }

        let events: Vec<RawEvent> = response.json().await.map_err(UpstreamError::Decode)?;

        Ok(FetchResult {
            events,
            new_etag,
            poll_interval_hint,
            rate_limit,
            modified: true,
        })
    }
}

fn etag_from_headers(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn poll_interval_from_headers(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("X-Poll-Interval")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn retry_after_from_headers(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn rate_limit_from_headers(headers: &reqwest::header::HeaderMap) -> RateLimitState {
    let remaining = headers
        .get("X-RateLimit-Remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u32>().ok());

    let reset_at = headers
        .get("X-RateLimit-Reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0));

    RateLimitState { remaining, reset_at }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_event(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "type": "WatchEvent",
            "repo": {"name": "o/r"},
            "actor": {"login": "alice"},
            "created_at": "2025-01-01T00:00:00Z",
            "payload": {},
        })
    }

    #[tokio::test]
    async fn fetch_global_decodes_events_and_etag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"abc\"")
                    .insert_header("X-Poll-Interval", "60")
                    .insert_header("X-RateLimit-Remaining", "42")
                    .set_body_json(vec![sample_event("A1")]),
            )
            .mount(&server)
            .await;

        let client = EventsClient::new("test-agent", None).with_base_url(server.uri());
        let result = client.fetch_global(None).await.unwrap();

        assert!(result.modified);
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].id, "A1");
        assert_eq!(result.new_etag.as_deref(), Some("\"abc\""));
        assert_eq!(result.poll_interval_hint, Some(Duration::from_secs(60)));
        assert_eq!(result.rate_limit.remaining, Some(42));
    }

    #[tokio::test]
    async fn not_modified_preserves_prior_etag_and_returns_no_events() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(header("If-None-Match", "\"abc\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let client = EventsClient::new("test-agent", None).with_base_url(server.uri());
        let result = client.fetch_global(Some("\"abc\"")).await.unwrap();

        assert!(!result.modified);
        assert!(result.events.is_empty());
        assert_eq!(result.new_etag.as_deref(), Some("\"abc\""));
    }

    #[tokio::test]
    async fn throttled_response_yields_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "10"))
            .mount(&server)
            .await;

        let client = EventsClient::new("test-agent", None).with_base_url(server.uri());
        let err = client.fetch_global(None).await.unwrap_err();

        match err {
            UpstreamError::Throttled { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(10));
            }
            other => panic!("expected Throttled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_failure_is_reported_distinctly() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = EventsClient::new("test-agent", Some("bad-token".into()))
            .with_base_url(server.uri());
        let err = client.fetch_global(None).await.unwrap_err();

        assert!(matches!(err, UpstreamError::Auth));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/events"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = EventsClient::new("test-agent", None).with_base_url(server.uri());
        let err = client.fetch_repo("o/r", None).await.unwrap_err();

        assert!(matches!(err, UpstreamError::ServerError { code: 500 }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn other_client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let client = EventsClient::new("test-agent", None).with_base_url(server.uri());
        let err = client.fetch_global(None).await.unwrap_err();

        assert!(matches!(err, UpstreamError::Permanent { code: 422 }));
        assert!(!err.is_transient());
    }
}
