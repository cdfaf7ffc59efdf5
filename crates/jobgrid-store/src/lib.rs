//! Store ports, persisted quota ledger, and HTTP fetch utilities for JobGrid.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use jobgrid_core::{JobRecord, SourceQuota};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{info_span, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobgrid-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("record not found: {0}")]
    NotFound(Uuid),
}

/// Conjunction of equality conditions against persisted records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub url: Option<String>,
    pub title_normalized: Option<String>,
    pub company_normalized: Option<String>,
    pub content_hash: Option<String>,
    pub is_active: Option<bool>,
}

impl RecordFilter {
    pub fn matches(&self, record: &JobRecord) -> bool {
        fn eq(cond: &Option<String>, value: &str) -> bool {
            cond.as_deref().map(|c| c == value).unwrap_or(true)
        }
        eq(&self.source, &record.source)
            && eq(&self.external_id, &record.external_id)
            && eq(&self.url, &record.url)
            && eq(&self.title_normalized, &record.title_normalized)
            && eq(&self.company_normalized, &record.company_normalized)
            && eq(&self.content_hash, &record.content_hash)
            && self.is_active.map(|a| a == record.is_active).unwrap_or(true)
    }
}

/// The fixed field subset a confirmed duplicate is allowed to refresh.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub description: Option<String>,
    pub requirements: Option<Vec<String>>,
    pub salary: Option<String>,
    pub apply_url: Option<String>,
    pub source_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Document-store port consumed by the ingestion pipeline. The real
/// deployment backs this with the application's shared store; tests and
/// the CLI default use [`MemoryJobStore`].
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn find_one(&self, filter: &RecordFilter) -> Result<Option<JobRecord>, StoreError>;

    /// Most-recently-created first, at most `limit` records.
    async fn find_top_n(
        &self,
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError>;

    async fn insert(&self, record: JobRecord) -> Result<Uuid, StoreError>;

    async fn update_by_id(&self, id: Uuid, update: RecordUpdate) -> Result<(), StoreError>;

    /// Replace the first record matching `filter`, or insert when none does.
    async fn upsert(&self, filter: &RecordFilter, record: JobRecord) -> Result<Uuid, StoreError>;

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn delete_by_filter(&self, filter: &RecordFilter) -> Result<usize, StoreError>;

    async fn count(&self, filter: &RecordFilter) -> Result<usize, StoreError>;
}

/// In-memory store used by tests and the default CLI wiring.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    records: RwLock<Vec<JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Vec<JobRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn find_one(&self, filter: &RecordFilter) -> Result<Option<JobRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| filter.matches(r)).cloned())
    }

    async fn find_top_n(
        &self,
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let records = self.records.read().await;
        let mut matched: Vec<JobRecord> =
            records.iter().filter(|r| filter.matches(r)).cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(limit);
        Ok(matched)
    }

    async fn insert(&self, record: JobRecord) -> Result<Uuid, StoreError> {
        let id = record.id;
        self.records.write().await.push(record);
        Ok(id)
    }

    async fn update_by_id(&self, id: Uuid, update: RecordUpdate) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        if let Some(description) = update.description {
            record.description = description;
        }
        if let Some(requirements) = update.requirements {
            record.requirements = Some(requirements);
        }
        if let Some(salary) = update.salary {
            record.salary = Some(salary);
        }
        if let Some(apply_url) = update.apply_url {
            record.apply_url = Some(apply_url);
        }
        if let Some(source_url) = update.source_url {
            record.url = source_url;
        }
        record.updated_at = update.updated_at;
        Ok(())
    }

    async fn upsert(&self, filter: &RecordFilter, record: JobRecord) -> Result<Uuid, StoreError> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.iter_mut().find(|r| filter.matches(r)) {
            let id = existing.id;
            let created_at = existing.created_at;
            *existing = record;
            existing.id = id;
            existing.created_at = created_at;
            Ok(id)
        } else {
            let id = record.id;
            records.push(record);
            Ok(id)
        }
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() < before)
    }

    async fn delete_by_filter(&self, filter: &RecordFilter) -> Result<usize, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !filter.matches(r));
        Ok(before - records.len())
    }

    async fn count(&self, filter: &RecordFilter) -> Result<usize, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| filter.matches(r)).count())
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("reading ledger {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("writing ledger {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("ledger serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persistence port for the quota ledger. Must survive restarts; the
/// caller process may be killed between runs.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load(&self) -> Result<BTreeMap<String, SourceQuota>, LedgerError>;
    async fn persist(&self, sources: &BTreeMap<String, SourceQuota>) -> Result<(), LedgerError>;
}

/// JSON-file ledger backend with atomic temp-file rename writes.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    async fn load(&self) -> Result<BTreeMap<String, SourceQuota>, LedgerError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(LedgerError::Read {
                path: self.path.clone(),
                source: err,
            }),
        }
    }

    async fn persist(&self, sources: &BTreeMap<String, SourceQuota>) -> Result<(), LedgerError> {
        let bytes = serde_json::to_vec_pretty(sources)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|err| LedgerError::Write {
                path: self.path.clone(),
                source: err,
            })?;
        }
        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4()));
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|err| LedgerError::Write {
                path: temp_path.clone(),
                source: err,
            })?;
        file.write_all(&bytes).await.map_err(|err| LedgerError::Write {
            path: temp_path.clone(),
            source: err,
        })?;
        file.flush().await.map_err(|err| LedgerError::Write {
            path: temp_path.clone(),
            source: err,
        })?;
        drop(file);
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|err| LedgerError::Write {
                path: self.path.clone(),
                source: err,
            })
    }
}

/// In-memory ledger backend for tests.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    sources: Mutex<BTreeMap<String, SourceQuota>>,
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> Result<BTreeMap<String, SourceQuota>, LedgerError> {
        Ok(self.sources.lock().await.clone())
    }

    async fn persist(&self, sources: &BTreeMap<String, SourceQuota>) -> Result<(), LedgerError> {
        *self.sources.lock().await = sources.clone();
        Ok(())
    }
}

/// Operational snapshot for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaStatus {
    pub remaining: usize,
    pub next_reset: Option<DateTime<Utc>>,
}

struct LedgerState {
    sources: BTreeMap<String, SourceQuota>,
    dirty: bool,
}

/// Per-source sliding-window request counter with permanent endpoint
/// disables and month-keyed quota-exceeded flags.
///
/// All mutation goes through one async mutex, so a check-then-record
/// sequence done via [`QuotaLedger::try_begin_request`] is atomic:
/// concurrent callers cannot both observe capacity and both proceed.
pub struct QuotaLedger {
    state: Mutex<LedgerState>,
    store: Arc<dyn LedgerStore>,
}

impl QuotaLedger {
    pub async fn open(store: Arc<dyn LedgerStore>) -> Result<Self, LedgerError> {
        let sources = store.load().await?;
        Ok(Self {
            state: Mutex::new(LedgerState {
                sources,
                dirty: false,
            }),
            store,
        })
    }

    /// Register a source's quota parameters if it is not already known.
    /// Parameters are fixed per source client at construction.
    pub async fn register_source(&self, source: &str, max_requests: usize, window_length_days: i64) {
        let mut state = self.state.lock().await;
        state
            .sources
            .entry(source.to_string())
            .or_insert_with(|| SourceQuota::new(source, max_requests, window_length_days));
    }

    pub async fn can_make_request(&self, source: &str) -> bool {
        let mut state = self.state.lock().await;
        Self::can_make_request_at(&mut state, source, Utc::now())
    }

    /// Append a request timestamp and persist immediately. The in-process
    /// count is updated even when persistence fails; the failure is logged
    /// and retried on the next mutation.
    pub async fn record_request(&self, source: &str) {
        let mut state = self.state.lock().await;
        Self::record_request_at(&mut state, source, Utc::now());
        self.flush(&mut state).await;
    }

    /// Atomic check-then-record. Returns false (recording nothing) when
    /// the source has no capacity.
    pub async fn try_begin_request(&self, source: &str) -> bool {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if !Self::can_make_request_at(&mut state, source, now) {
            return false;
        }
        Self::record_request_at(&mut state, source, now);
        self.flush(&mut state).await;
        true
    }

    pub async fn requests_remaining(&self, source: &str) -> usize {
        let mut state = self.state.lock().await;
        Self::remaining_at(&mut state, source, Utc::now())
    }

    /// Earliest in-window timestamp plus the window length, or None when
    /// the window is empty.
    pub async fn next_reset_date(&self, source: &str) -> Option<DateTime<Utc>> {
        let mut state = self.state.lock().await;
        Self::next_reset_at(&mut state, source, Utc::now())
    }

    /// Permanently disable an endpoint for a source. Idempotent; cleared
    /// only by manual reconfiguration.
    pub async fn disable_endpoint(&self, source: &str, endpoint: &str, reason: &str) {
        let mut state = self.state.lock().await;
        let quota = match state.sources.get_mut(source) {
            Some(quota) => quota,
            None => return,
        };
        if quota.disabled_endpoints.insert(endpoint.to_string()) {
            warn!(source, endpoint, reason, "endpoint permanently disabled");
            state.dirty = true;
            self.flush(&mut state).await;
        }
    }

    /// Flag the source as quota-exhausted for the given "YYYY-MM" month.
    pub async fn mark_quota_exceeded(&self, source: &str, month_key: &str) {
        let mut state = self.state.lock().await;
        let quota = match state.sources.get_mut(source) {
            Some(quota) => quota,
            None => return,
        };
        if quota.quota_exceeded_months.insert(month_key.to_string()) {
            warn!(source, month_key, "provider quota exceeded for month");
            state.dirty = true;
            self.flush(&mut state).await;
        }
    }

    pub async fn status(&self, source: &str) -> QuotaStatus {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        QuotaStatus {
            remaining: Self::remaining_at(&mut state, source, now),
            next_reset: Self::next_reset_at(&mut state, source, now),
        }
    }

    pub fn month_key(now: DateTime<Utc>) -> String {
        format!("{:04}-{:02}", now.year(), now.month())
    }

    async fn flush(&self, state: &mut LedgerState) {
        state.dirty = true;
        match self.store.persist(&state.sources).await {
            Ok(()) => state.dirty = false,
            Err(err) => {
                // Retried on the next mutation; the in-process decision stands.
                warn!(error = %err, "persisting quota ledger failed");
            }
        }
    }

    fn window_start(quota: &SourceQuota, now: DateTime<Utc>) -> DateTime<Utc> {
        now - ChronoDuration::days(quota.window_length_days)
    }

    fn in_window_count(quota: &SourceQuota, now: DateTime<Utc>) -> usize {
        let start = Self::window_start(quota, now);
        quota
            .request_timestamps
            .iter()
            .filter(|ts| **ts > start)
            .count()
    }

    fn prune(quota: &mut SourceQuota, now: DateTime<Utc>) {
        let start = Self::window_start(quota, now);
        quota.request_timestamps.retain(|ts| *ts > start);
        let current = Self::month_key(now);
        quota.quota_exceeded_months.retain(|m| *m == current);
    }

    fn can_make_request_at(state: &mut LedgerState, source: &str, now: DateTime<Utc>) -> bool {
        let quota = match state.sources.get_mut(source) {
            Some(quota) => quota,
            None => return false,
        };
        Self::prune(quota, now);
        // One fetch endpoint per source client, so any disabled endpoint
        // takes the whole source out of rotation.
        if !quota.disabled_endpoints.is_empty() {
            return false;
        }
        if quota.quota_exceeded_months.contains(&Self::month_key(now)) {
            return false;
        }
        Self::in_window_count(quota, now) < quota.max_requests
    }

    fn record_request_at(state: &mut LedgerState, source: &str, now: DateTime<Utc>) {
        if let Some(quota) = state.sources.get_mut(source) {
            quota.request_timestamps.push(now);
            Self::prune(quota, now);
            state.dirty = true;
        }
    }

    fn remaining_at(state: &mut LedgerState, source: &str, now: DateTime<Utc>) -> usize {
        let quota = match state.sources.get_mut(source) {
            Some(quota) => quota,
            None => return 0,
        };
        Self::prune(quota, now);
        quota
            .max_requests
            .saturating_sub(Self::in_window_count(quota, now))
    }

    fn next_reset_at(
        state: &mut LedgerState,
        source: &str,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let quota = state.sources.get_mut(source)?;
        Self::prune(quota, now);
        let earliest = quota.request_timestamps.iter().min()?;
        Some(*earliest + ChronoDuration::days(quota.window_length_days))
    }

    #[cfg(any(test, feature = "testing"))]
    pub async fn backdate_requests(&self, source: &str, by: ChronoDuration) {
        let mut state = self.state.lock().await;
        if let Some(quota) = state.sources.get_mut(source) {
            for ts in &mut quota.request_timestamps {
                *ts -= by;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Cross-host concurrency cap.
    pub global_concurrency: usize,
    /// Minimum delay between two requests to the same host.
    pub host_delay: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            global_concurrency: 8,
            host_delay: Duration::from_millis(1500),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}: {body_excerpt}")]
    HttpStatus {
        status: u16,
        url: String,
        body_excerpt: String,
    },
}

impl FetchError {
    /// Timeouts and resets are retryable on the next scheduled run, never
    /// fatal to the current one.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(err) => {
                classify_reqwest_error(err) == RetryDisposition::Retryable
            }
            FetchError::HttpStatus { status, .. } => {
                StatusCode::from_u16(*status)
                    .map(|s| classify_status(s) == RetryDisposition::Retryable)
                    .unwrap_or(false)
            }
        }
    }
}

#[derive(Debug)]
struct HostGate {
    last_request: Option<Instant>,
}

/// HTTP client wrapper enforcing bounded timeouts, retry with backoff, a
/// cross-host concurrency cap, and serialized same-host access with a
/// minimum inter-request delay.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    host_delay: Duration,
    hosts: Mutex<HashMap<String, Arc<Mutex<HostGate>>>>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build()?;
        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            host_delay: config.host_delay,
            hosts: Mutex::new(HashMap::new()),
            backoff: config.backoff,
        })
    }

    fn host_of(url: &str) -> String {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string())
    }

    async fn host_gate(&self, host: &str) -> Arc<Mutex<HostGate>> {
        let mut hosts = self.hosts.lock().await;
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(HostGate { last_request: None })))
            .clone()
    }

    /// GET with optional extra headers. Holding the host gate for the whole
    /// request serializes same-host fetches; distinct hosts proceed in
    /// parallel up to the global cap.
    pub async fn get(
        &self,
        source: &str,
        request_url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchedResponse, FetchError> {
        let _global = self
            .global_limit
            .acquire()
            .await
            .expect("semaphore not closed");
        let gate = self.host_gate(&Self::host_of(request_url)).await;
        let mut gate = gate.lock().await;

        if let Some(last) = gate.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.host_delay {
                tokio::time::sleep(self.host_delay - elapsed).await;
            }
        }

        let span = info_span!("http_fetch", source, url = request_url);
        let _guard = span.enter();

        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            let mut request = self.client.get(request_url);
            for (name, value) in headers {
                request = request.header(name, value);
            }
            gate.last_request = Some(Instant::now());

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();
                    let body = resp.bytes().await?.to_vec();

                    if status.is_success() {
                        return Ok(FetchedResponse {
                            status,
                            final_url,
                            body,
                        });
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && status != StatusCode::TOO_MANY_REQUESTS
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    let body_excerpt =
                        String::from_utf8_lossy(&body[..body.len().min(256)]).into_owned();
                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                        body_excerpt,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }

        Err(FetchError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jobgrid_core::JobCandidate;
    use tempfile::tempdir;

    fn mk_record(title: &str, company: &str, source: &str, external_id: &str) -> JobRecord {
        let candidate = JobCandidate {
            title: title.to_string(),
            company: company.to_string(),
            location: "Remote".to_string(),
            description: format!("{title} at {company}"),
            url: format!("https://jobs.example/{external_id}"),
            apply_url: None,
            salary: None,
            job_type: None,
            posted_date: None,
            requirements: None,
            source: source.to_string(),
            external_id: external_id.to_string(),
        };
        JobRecord::from_candidate(&candidate, Utc::now())
    }

    #[tokio::test]
    async fn memory_store_filters_and_updates() {
        let store = MemoryJobStore::new();
        let record = mk_record("Rust Engineer", "Acme", "remotive", "r-1");
        let id = store.insert(record).await.unwrap();

        let found = store
            .find_one(&RecordFilter {
                source: Some("remotive".to_string()),
                external_id: Some("r-1".to_string()),
                ..RecordFilter::default()
            })
            .await
            .unwrap();
        assert!(found.is_some());

        store
            .update_by_id(
                id,
                RecordUpdate {
                    description: Some("fresh description".to_string()),
                    updated_at: Utc::now(),
                    ..RecordUpdate::default()
                },
            )
            .await
            .unwrap();
        let updated = store
            .find_one(&RecordFilter::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.description, "fresh description");
    }

    #[tokio::test]
    async fn top_n_is_newest_first_and_bounded() {
        let store = MemoryJobStore::new();
        for i in 0..5 {
            let mut record = mk_record("Engineer", "Acme", "remotive", &format!("r-{i}"));
            record.created_at = Utc.with_ymd_and_hms(2026, 1, 1 + i, 0, 0, 0).single().unwrap();
            store.insert(record).await.unwrap();
        }
        let top = store
            .find_top_n(
                &RecordFilter {
                    company_normalized: Some("acme".to_string()),
                    ..RecordFilter::default()
                },
                3,
            )
            .await
            .unwrap();
        assert_eq!(top.len(), 3);
        assert!(top[0].created_at > top[1].created_at);
        assert!(top[1].created_at > top[2].created_at);
    }

    #[tokio::test]
    async fn ledger_exhausts_and_reports_reset() {
        let ledger = QuotaLedger::open(Arc::new(MemoryLedgerStore::default()))
            .await
            .unwrap();
        ledger.register_source("remotive", 2, 1).await;

        assert!(ledger.try_begin_request("remotive").await);
        assert!(ledger.try_begin_request("remotive").await);
        assert!(!ledger.try_begin_request("remotive").await);
        assert!(!ledger.can_make_request("remotive").await);
        assert_eq!(ledger.requests_remaining("remotive").await, 0);
        assert!(ledger.next_reset_date("remotive").await.is_some());

        // Requests age out of the one-day window.
        ledger
            .backdate_requests("remotive", ChronoDuration::days(2))
            .await;
        assert!(ledger.can_make_request("remotive").await);
        assert_eq!(ledger.requests_remaining("remotive").await, 2);
    }

    #[tokio::test]
    async fn remaining_never_goes_negative() {
        let ledger = QuotaLedger::open(Arc::new(MemoryLedgerStore::default()))
            .await
            .unwrap();
        ledger.register_source("jooble", 1, 7).await;
        ledger.record_request("jooble").await;
        ledger.record_request("jooble").await;
        assert_eq!(ledger.requests_remaining("jooble").await, 0);
    }

    #[tokio::test]
    async fn disabled_endpoint_blocks_the_source() {
        let ledger = QuotaLedger::open(Arc::new(MemoryLedgerStore::default()))
            .await
            .unwrap();
        ledger.register_source("adzuna", 100, 30).await;
        assert!(ledger.can_make_request("adzuna").await);

        ledger
            .disable_endpoint("adzuna", "https://api.adzuna.example/v1/search", "provider sunset")
            .await;
        assert!(!ledger.can_make_request("adzuna").await);
        // Idempotent.
        ledger
            .disable_endpoint("adzuna", "https://api.adzuna.example/v1/search", "provider sunset")
            .await;
        assert!(!ledger.can_make_request("adzuna").await);
    }

    #[tokio::test]
    async fn quota_exceeded_flag_is_month_scoped() {
        let ledger = QuotaLedger::open(Arc::new(MemoryLedgerStore::default()))
            .await
            .unwrap();
        ledger.register_source("jooble", 100, 30).await;

        let current = QuotaLedger::month_key(Utc::now());
        ledger.mark_quota_exceeded("jooble", &current).await;
        assert!(!ledger.can_make_request("jooble").await);

        // A stale month key is pruned on read and does not block.
        let ledger2 = QuotaLedger::open(Arc::new(MemoryLedgerStore::default()))
            .await
            .unwrap();
        ledger2.register_source("jooble", 100, 30).await;
        ledger2.mark_quota_exceeded("jooble", "2019-01").await;
        assert!(ledger2.can_make_request("jooble").await);
    }

    #[tokio::test]
    async fn file_ledger_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("ledger.json");

        {
            let ledger = QuotaLedger::open(Arc::new(FileLedgerStore::new(&path)))
                .await
                .unwrap();
            ledger.register_source("remotive", 5, 7).await;
            ledger.record_request("remotive").await;
            ledger.record_request("remotive").await;
        }

        let reopened = QuotaLedger::open(Arc::new(FileLedgerStore::new(&path)))
            .await
            .unwrap();
        assert_eq!(reopened.requests_remaining("remotive").await, 3);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[test]
    fn status_classification_marks_429_retryable_next_run() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RetryDisposition::NonRetryable
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            RetryDisposition::Retryable
        );
    }
}
