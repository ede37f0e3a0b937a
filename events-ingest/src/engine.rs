use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use events_client::{EventsClient, RawEvent, UpstreamError};
use events_db::{Event, RecognizedSet, Store};
use log::{info, warn};
use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::IngestConfig;

const BACKOFF_INITIAL_SECONDS: u64 = 2;
const BACKOFF_CAP_SECONDS: u64 = 120;

/// One polled endpoint: the upstream global feed, or a single target repo.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndpointKey {
    Global,
    Repo(String),
}

impl EndpointKey {
    fn etag_cache_key(&self) -> String {
        match self {
            EndpointKey::Global => "global".to_string(),
            EndpointKey::Repo(name) => format!("repo:{name}"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("upstream fetch failed")]
    Upstream(#[from] UpstreamError),
    #[error("event store operation failed")]
    Store(#[from] events_db::StoreError),
}

/// Outcome of a single fetch→filter→write cycle, used to drive the next
/// tick's pacing.
enum CycleOutcome {
    Wrote { inserted: usize, poll_interval_hint: Option<Duration> },
    NotModified,
    Throttled { retry_after: Duration },
    Transient,
    Permanent,
}

/// Keeps the running state machine's backoff for a single endpoint key.
/// Reset to the initial value on every successful (non-transient) cycle.
struct KeyState {
    backoff: Duration,
}

impl KeyState {
    fn new() -> Self {
        Self { backoff: Duration::from_secs(BACKOFF_INITIAL_SECONDS) }
    }

    fn bump(&mut self) -> Duration {
        let current = self.backoff;
        let next = (self.backoff * 2).min(Duration::from_secs(BACKOFF_CAP_SECONDS));
        self.backoff = next;
        current
    }

    fn reset(&mut self) {
        self.backoff = Duration::from_secs(BACKOFF_INITIAL_SECONDS);
    }
}

/// Drives the store toward freshness by periodically polling the upstream
/// client and writing through the store, one cooperative task per endpoint
/// key, per §4.D.
pub struct Engine {
    client: EventsClient,
    store: Store,
    config: IngestConfig,
    recognized: RecognizedSet,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(client: EventsClient, store: Store, config: IngestConfig) -> Self {
        Self {
            client,
            store,
            config,
            recognized: RecognizedSet::Extended,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn endpoint_keys(&self) -> Vec<EndpointKey> {
        match self.config.targets() {
            None => vec![EndpointKey::Global],
            Some(targets) => targets.iter().cloned().map(EndpointKey::Repo).collect(),
        }
    }

    /// Spawns one cooperative task per endpoint key and waits for all of
    /// them to drain on cancellation. Per §4.D: per-key serial, cross-key
    /// parallel, bounded by `worker_count`.
    pub async fn run(self: Arc<Self>) {
        let keys = self.endpoint_keys();
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.worker_count.max(1)));

        let handles: Vec<_> = keys
            .into_iter()
            .map(|key| {
                let engine = self.clone();
                let semaphore = semaphore.clone();
                tokio::spawn(async move { engine.run_key(key, semaphore).await })
            })
            .collect();

        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn run_key(&self, key: EndpointKey, semaphore: Arc<tokio::sync::Semaphore>) {
        let mut state = KeyState::new();
        let base_interval = Duration::from_secs(self.config.poll_interval_seconds);
        let mut next_delay = Duration::from_secs(0);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Ingestion task for {:?} received shutdown signal, draining", key);
                    break;
                }
                _ = tokio::time::sleep(next_delay) => {}
            }

            if self.cancel.is_cancelled() {
                break;
            }

            let _permit = semaphore.acquire().await.expect("semaphore closed");
            let outcome = self.poll_once(&key, usize::MAX).await;
            drop(_permit);

            next_delay = match outcome {
                Ok(CycleOutcome::Wrote { inserted, poll_interval_hint }) => {
                    info!("Ingested {inserted} new events for {:?}", key);
                    state.reset();
                    poll_interval_hint.map(|hint| hint.max(base_interval)).unwrap_or(base_interval)
                }
                Ok(CycleOutcome::NotModified) => {
                    state.reset();
                    base_interval
                }
                Ok(CycleOutcome::Throttled { retry_after }) => {
                    info!("Throttled on {:?}, retrying after {:?}", key, retry_after);
                    retry_after
                }
                Ok(CycleOutcome::Transient) => {
                    let delay = state.bump();
                    warn!("Transient upstream error on {:?}, backing off {:?}", key, delay);
                    delay
                }
                Ok(CycleOutcome::Permanent) => {
                    warn!("Permanent upstream error on {:?}, will retry next tick", key);
                    state.reset();
                    base_interval
                }
                Err(err) => {
                    warn!("Store error while ingesting {:?}: {err}", key);
                    base_interval
                }
            };
        }
    }

    /// Runs one fetch→filter→write cycle for `key`, truncating the fetched
    /// event batch to at most `page_size_cap` rows before writing.
    async fn poll_once(&self, key: &EndpointKey, page_size_cap: usize) -> Result<CycleOutcome, IngestError> {
        let cache_key = key.etag_cache_key();
        let prior_etag = self.store.get_etag(&cache_key)?;

        let fetch_result = match key {
            EndpointKey::Global => self.client.fetch_global(prior_etag.as_deref()).await,
            EndpointKey::Repo(name) => self.client.fetch_repo(name, prior_etag.as_deref()).await,
        };

        let fetch_result = match fetch_result {
            Ok(result) => result,
            Err(UpstreamError::Throttled { retry_after }) => {
                return Ok(CycleOutcome::Throttled { retry_after });
            }
            Err(err) if err.is_transient() => return Ok(CycleOutcome::Transient),
            Err(_) => return Ok(CycleOutcome::Permanent),
        };

        let now = Utc::now();

        if !fetch_result.modified {
            // Etag is already conserved by the client's fallback-to-prior-etag
            // logic; still need to advance last_poll_at for this key.
            self.store.put_etag(&cache_key, fetch_result.new_etag.as_deref(), now)?;
            return Ok(CycleOutcome::NotModified);
        }

        let mut raw_events = fetch_result.events;
        raw_events.truncate(page_size_cap);

        let events: Vec<Event> = raw_events
            .into_iter()
            .filter(|raw| self.accepts(key, raw))
            .map(|raw| {
                Event::new(
                    raw.id,
                    raw.event_type,
                    raw.repo.name,
                    raw.actor.login,
                    raw.created_at,
                    raw.payload,
                    now,
                )
            })
            .collect();

        let inserted = self.store.insert_events(&events)?;
        self.store.put_etag(&cache_key, fetch_result.new_etag.as_deref(), now)?;

        Ok(CycleOutcome::Wrote { inserted, poll_interval_hint: fetch_result.poll_interval_hint })
    }

    fn accepts(&self, key: &EndpointKey, raw: &RawEvent) -> bool {
        if !self.recognized.recognizes(&raw.event_type) {
            return false;
        }
        match key {
            EndpointKey::Global => true,
            EndpointKey::Repo(name) => &raw.repo.name == name,
        }
    }

    /// Manual trigger for `/collect`: one cycle per endpoint key, capped by
    /// `limit` events per key, returning the total number of newly
    /// inserted rows.
    pub async fn collect(&self, limit: usize) -> Result<usize, IngestError> {
        let mut total = 0usize;
        for key in self.endpoint_keys() {
            match self.poll_once(&key, limit).await? {
                CycleOutcome::Wrote { inserted, .. } => total += inserted,
                _ => {}
            }
        }
        Ok(total)
    }
}

/// A handle a shared `Engine` reference can be wrapped in when callers need
/// interior mutability around startup/shutdown bookkeeping beyond what the
/// engine itself tracks.
pub type SharedEngine = Arc<Mutex<Engine>>;
