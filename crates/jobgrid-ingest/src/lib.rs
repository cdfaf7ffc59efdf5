//! Ingestion pipeline orchestration: the deduplication cascade with
//! confidence-gated writes, the batch duplicate sweep, and the run
//! coordinator that drives sources and crawl targets.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use jobgrid_core::{
    content_hash, normalize_text, Confidence, DedupVerdict, JobCandidate, JobRecord, MatchReason,
    RunStatistics,
};
use jobgrid_crawl::{CrawlTarget, PageCrawler};
use jobgrid_sources::{provider_spec, ApiSourceClient, SourceClient};
use jobgrid_store::{
    FileLedgerStore, HttpClientConfig, HttpFetcher, JobStore, QuotaLedger, RecordFilter,
    RecordUpdate, StoreError,
};
use serde::Deserialize;
use strsim::normalized_levenshtein;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobgrid-ingest";

/// Thresholds for the fuzzy tail of the cascade. Scores at or above
/// `high` map to High confidence, at or above `medium` to Medium, and
/// anything passing `match_threshold` below that to Low.
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    pub fuzzy_candidate_limit: usize,
    pub match_threshold: f64,
    pub medium_threshold: f64,
    pub high_threshold: f64,
    pub title_weight: f64,
    pub description_weight: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            fuzzy_candidate_limit: 10,
            match_threshold: 0.85,
            medium_threshold: 0.85,
            high_threshold: 0.95,
            title_weight: 0.7,
            description_weight: 0.3,
        }
    }
}

/// Aggregate counts from the batch duplicate sweep.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CleanupReport {
    pub scanned: usize,
    pub removed_duplicates: usize,
    pub companies: usize,
}

/// Runs one candidate through the identity-strength-ordered match
/// cascade and decides insert/update/skip against the store.
pub struct DeduplicationEngine {
    store: Arc<dyn JobStore>,
    config: DedupConfig,
}

impl DeduplicationEngine {
    pub fn new(store: Arc<dyn JobStore>, config: DedupConfig) -> Self {
        Self { store, config }
    }

    /// Strategies run in order, first match wins; fuzzy runs last and
    /// only over a bounded window of recent same-company records.
    pub async fn check(&self, candidate: &JobCandidate) -> Result<DedupVerdict, StoreError> {
        // Normalization always precedes the store lookups.
        let title_normalized = normalize_text(&candidate.title);
        let company_normalized = normalize_text(&candidate.company);
        let hash = content_hash(&candidate.title, &candidate.company, &candidate.description);

        if !candidate.external_id.is_empty() {
            let filter = RecordFilter {
                source: Some(candidate.source.clone()),
                external_id: Some(candidate.external_id.clone()),
                ..RecordFilter::default()
            };
            if let Some(record) = self.store.find_one(&filter).await? {
                return Ok(verdict(record.id, 1.0, MatchReason::ExactExternalIdMatch, Confidence::High));
            }
        }

        if !candidate.url.is_empty() {
            let filter = RecordFilter {
                url: Some(candidate.url.clone()),
                ..RecordFilter::default()
            };
            if let Some(record) = self.store.find_one(&filter).await? {
                return Ok(verdict(record.id, 1.0, MatchReason::UrlExactMatch, Confidence::High));
            }
        }

        let filter = RecordFilter {
            title_normalized: Some(title_normalized.clone()),
            company_normalized: Some(company_normalized.clone()),
            ..RecordFilter::default()
        };
        if let Some(record) = self.store.find_one(&filter).await? {
            return Ok(verdict(record.id, 0.95, MatchReason::TitleCompanyExactMatch, Confidence::High));
        }

        let filter = RecordFilter {
            content_hash: Some(hash.clone()),
            ..RecordFilter::default()
        };
        if let Some(record) = self.store.find_one(&filter).await? {
            return Ok(verdict(record.id, 0.95, MatchReason::ContentHashMatch, Confidence::High));
        }

        // Bounded fuzzy window: same company, most recent first. Widening
        // this read is a deliberate non-goal; the batch sweep covers the
        // recall gap.
        let filter = RecordFilter {
            company_normalized: Some(company_normalized),
            ..RecordFilter::default()
        };
        let recent = self
            .store
            .find_top_n(&filter, self.config.fuzzy_candidate_limit)
            .await?;
        let description_normalized = normalize_text(&candidate.description);
        let mut best: Option<(f64, Uuid)> = None;
        for record in &recent {
            let score = self.fuzzy_score(
                &title_normalized,
                &description_normalized,
                &record.title_normalized,
                &normalize_text(&record.description),
            );
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, record.id));
            }
        }
        if let Some((score, id)) = best {
            if score >= self.config.match_threshold {
                let confidence = if score >= self.config.high_threshold {
                    Confidence::High
                } else if score >= self.config.medium_threshold {
                    Confidence::Medium
                } else {
                    Confidence::Low
                };
                return Ok(verdict(id, score, MatchReason::FuzzyTitleDescriptionMatch, confidence));
            }
        }

        Ok(DedupVerdict::no_match())
    }

    fn fuzzy_score(
        &self,
        title_a: &str,
        description_a: &str,
        title_b: &str,
        description_b: &str,
    ) -> f64 {
        let title_similarity = normalized_levenshtein(title_a, title_b);
        let description_similarity = normalized_levenshtein(description_a, description_b);
        self.config.title_weight * title_similarity
            + self.config.description_weight * description_similarity
    }

    /// Single-record ingestion path: check, then insert or refresh. A
    /// Low-confidence match never mutates the existing record; its id is
    /// still returned for visibility.
    pub async fn save(&self, candidate: &JobCandidate) -> Result<(Uuid, DedupVerdict), StoreError> {
        let verdict = self.check(candidate).await?;

        if !verdict.is_duplicate {
            let record = JobRecord::from_candidate(candidate, Utc::now());
            let id = self.store.insert(record).await?;
            return Ok((id, verdict));
        }

        let matched_id = verdict
            .matched_record_id
            .expect("duplicate verdict always carries the matched id");
        if verdict.confidence >= Confidence::Medium {
            self.store
                .update_by_id(
                    matched_id,
                    RecordUpdate {
                        description: Some(candidate.description.clone()),
                        requirements: candidate.requirements.clone(),
                        salary: candidate.salary.clone(),
                        apply_url: candidate.apply_url.clone(),
                        source_url: Some(candidate.url.clone()),
                        updated_at: Utc::now(),
                    },
                )
                .await?;
        }
        Ok((matched_id, verdict))
    }

    /// In-memory pairwise form of the cascade, used by the batch sweep.
    pub fn compare_records(&self, later: &JobRecord, earlier: &JobRecord) -> Option<DedupVerdict> {
        if !later.external_id.is_empty()
            && later.source == earlier.source
            && later.external_id == earlier.external_id
        {
            return Some(verdict(earlier.id, 1.0, MatchReason::ExactExternalIdMatch, Confidence::High));
        }
        if !later.url.is_empty() && later.url == earlier.url {
            return Some(verdict(earlier.id, 1.0, MatchReason::UrlExactMatch, Confidence::High));
        }
        if later.title_normalized == earlier.title_normalized
            && later.company_normalized == earlier.company_normalized
        {
            return Some(verdict(earlier.id, 0.95, MatchReason::TitleCompanyExactMatch, Confidence::High));
        }
        if later.content_hash == earlier.content_hash {
            return Some(verdict(earlier.id, 0.95, MatchReason::ContentHashMatch, Confidence::High));
        }
        let score = self.fuzzy_score(
            &later.title_normalized,
            &normalize_text(&later.description),
            &earlier.title_normalized,
            &normalize_text(&earlier.description),
        );
        if score >= self.config.match_threshold {
            let confidence = if score >= self.config.high_threshold {
                Confidence::High
            } else if score >= self.config.medium_threshold {
                Confidence::Medium
            } else {
                Confidence::Low
            };
            return Some(verdict(earlier.id, score, MatchReason::FuzzyTitleDescriptionMatch, confidence));
        }
        None
    }

    /// Sweep the existing corpus company by company: sort each group by
    /// creation time ascending, compare every later record against the
    /// kept earlier ones, and delete the later-created duplicates. The
    /// earliest-created record always survives.
    pub async fn find_and_remove_duplicates(&self) -> Result<CleanupReport, StoreError> {
        let all = self
            .store
            .find_top_n(&RecordFilter::default(), usize::MAX)
            .await?;
        let mut report = CleanupReport {
            scanned: all.len(),
            ..CleanupReport::default()
        };

        let mut by_company: BTreeMap<String, Vec<JobRecord>> = BTreeMap::new();
        for record in all {
            by_company
                .entry(record.company_normalized.clone())
                .or_default()
                .push(record);
        }
        report.companies = by_company.len();

        for (_, mut group) in by_company {
            group.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            let mut removed = vec![false; group.len()];
            for later_idx in 1..group.len() {
                for earlier_idx in 0..later_idx {
                    if removed[earlier_idx] {
                        continue;
                    }
                    if self
                        .compare_records(&group[later_idx], &group[earlier_idx])
                        .is_some()
                    {
                        removed[later_idx] = true;
                        break;
                    }
                }
            }
            for (idx, is_removed) in removed.iter().enumerate() {
                if *is_removed {
                    self.store.delete_by_id(group[idx].id).await?;
                    report.removed_duplicates += 1;
                }
            }
        }

        Ok(report)
    }
}

fn verdict(id: Uuid, score: f64, reason: MatchReason, confidence: Confidence) -> DedupVerdict {
    DedupVerdict {
        is_duplicate: true,
        matched_record_id: Some(id),
        similarity_score: score,
        reason,
        confidence,
    }
}

/// Terminal run summaries go to this port; formatting and delivery of
/// real notifications live outside the pipeline.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, summary: &str);
}

#[derive(Debug, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, summary: &str) {
        info!(%summary, "ingestion run finished");
    }
}

/// Captures summaries for assertions.
#[derive(Debug, Default)]
pub struct CollectingSink {
    summaries: std::sync::Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn messages(&self) -> Vec<String> {
        self.summaries.lock().expect("sink lock").clone()
    }
}

impl NotificationSink for CollectingSink {
    fn notify(&self, summary: &str) {
        self.summaries.lock().expect("sink lock").push(summary.to_string());
    }
}

/// Cooperative cancellation, honored at source-iteration boundaries: an
/// in-flight source finishes before the coordinator stops.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Environment-driven pipeline configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub ledger_path: PathBuf,
    pub registry_path: PathBuf,
    pub max_concurrency: usize,
    pub host_delay_ms: u64,
    pub fetch_limit: usize,
    pub scheduler_enabled: bool,
    pub ingest_cron: String,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self {
            user_agent: std::env::var("JOBGRID_USER_AGENT")
                .unwrap_or_else(|_| "jobgrid-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("JOBGRID_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            ledger_path: std::env::var("JOBGRID_LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./jobgrid_ledger.json")),
            registry_path: std::env::var("JOBGRID_REGISTRY")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./sources.yaml")),
            max_concurrency: std::env::var("JOBGRID_MAX_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            host_delay_ms: std::env::var("JOBGRID_HOST_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1500),
            fetch_limit: std::env::var("JOBGRID_FETCH_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            scheduler_enabled: std::env::var("JOBGRID_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            ingest_cron: std::env::var("JOBGRID_INGEST_CRON")
                .unwrap_or_else(|_| "0 0 6 * * *".to_string()),
        }
    }
}

/// Declarative source registry loaded from `sources.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub crawl_targets: Vec<CrawlTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub enabled: bool,
}

impl SourceRegistry {
    pub async fn load(path: &PathBuf) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Drives every configured source and crawl target through the
/// normalize → dedup → store pipeline and aggregates statistics.
pub struct IngestionCoordinator {
    sources: Vec<Arc<dyn SourceClient>>,
    crawler: PageCrawler,
    crawl_targets: Vec<CrawlTarget>,
    dedup: Arc<DeduplicationEngine>,
    notifier: Arc<dyn NotificationSink>,
    cancel: CancelFlag,
    fetch_limit: usize,
    max_concurrency: usize,
}

impl IngestionCoordinator {
    pub fn new(
        sources: Vec<Arc<dyn SourceClient>>,
        crawler: PageCrawler,
        crawl_targets: Vec<CrawlTarget>,
        dedup: Arc<DeduplicationEngine>,
        notifier: Arc<dyn NotificationSink>,
        fetch_limit: usize,
        max_concurrency: usize,
    ) -> Self {
        Self {
            sources,
            crawler,
            crawl_targets,
            dedup,
            notifier,
            cancel: CancelFlag::default(),
            fetch_limit,
            max_concurrency,
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// One full ingestion pass. Per-source failures are counted, never
    /// propagated; a summary is always emitted, all-zero counts included.
    pub async fn run(&self) -> Vec<RunStatistics> {
        let concurrency = self.max_concurrency.max(1);

        let source_futures: Vec<_> = self
            .sources
            .iter()
            .map(|source| self.process_source(source.as_ref()))
            .collect();
        let mut stats: Vec<RunStatistics> = stream::iter(source_futures)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let crawl_futures: Vec<_> = self
            .crawl_targets
            .iter()
            .map(|target| self.process_crawl_target(target))
            .collect();
        let crawl_stats: Vec<RunStatistics> = stream::iter(crawl_futures)
            .buffer_unordered(concurrency)
            .collect()
            .await;
        stats.extend(crawl_stats);

        self.notifier.notify(&render_summary(&stats));
        stats
    }

    async fn process_source(&self, source: &dyn SourceClient) -> RunStatistics {
        let mut stats = RunStatistics::empty(source.name());
        if self.cancel.is_cancelled() {
            return stats;
        }
        let started = Instant::now();

        match source.fetch(self.fetch_limit).await {
            Ok(candidates) => {
                stats.fetched_count = candidates.len();
                self.ingest_candidates(&candidates, &mut stats).await;
            }
            Err(err) => {
                warn!(source = source.name(), error = %err, "source fetch failed");
                stats.error_count += 1;
            }
        }

        stats.duration = started.elapsed();
        stats
    }

    async fn process_crawl_target(&self, target: &CrawlTarget) -> RunStatistics {
        let host = url_host(&target.url);
        let mut stats = RunStatistics::empty(format!("crawl:{host}"));
        if self.cancel.is_cancelled() {
            return stats;
        }
        let started = Instant::now();

        match self.crawler.crawl(target).await {
            Ok(candidates) => {
                stats.fetched_count = candidates.len();
                self.ingest_candidates(&candidates, &mut stats).await;
            }
            Err(err) => {
                warn!(url = %target.url, error = %err, "crawl target failed");
                stats.error_count += 1;
            }
        }

        stats.duration = started.elapsed();
        stats
    }

    async fn ingest_candidates(&self, candidates: &[JobCandidate], stats: &mut RunStatistics) {
        for candidate in candidates {
            match self.dedup.save(candidate).await {
                Ok((_, verdict)) if !verdict.is_duplicate => stats.new_count += 1,
                Ok((_, verdict)) => {
                    stats.duplicate_count += 1;
                    if verdict.confidence >= Confidence::Medium {
                        stats.updated_count += 1;
                    }
                }
                Err(err) => {
                    warn!(title = %candidate.title, error = %err, "store write failed");
                    stats.error_count += 1;
                }
            }
        }
    }

    /// Config-gated cron wiring; the trigger itself stays external.
    pub async fn maybe_build_scheduler(
        coordinator: Arc<Self>,
        config: &IngestConfig,
    ) -> Result<Option<JobScheduler>> {
        if !config.scheduler_enabled {
            return Ok(None);
        }

        let scheduler = JobScheduler::new().await.context("creating scheduler")?;
        let job = Job::new_async(config.ingest_cron.as_str(), move |_uuid, _lock| {
            Box::pin(run_scheduled(Arc::clone(&coordinator)))
        })
        .with_context(|| format!("creating scheduler job for cron {}", config.ingest_cron))?;
        scheduler.add(job).await.context("adding scheduler job")?;
        Ok(Some(scheduler))
    }
}

async fn run_scheduled(coordinator: Arc<IngestionCoordinator>) {
    let stats = coordinator.run().await;
    info!(sources = stats.len(), "scheduled ingestion run finished");
}

fn url_host(raw: &str) -> String {
    raw.split("//")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or(raw)
        .to_string()
}

fn render_summary(stats: &[RunStatistics]) -> String {
    let fetched: usize = stats.iter().map(|s| s.fetched_count).sum();
    let new: usize = stats.iter().map(|s| s.new_count).sum();
    let updated: usize = stats.iter().map(|s| s.updated_count).sum();
    let duplicates: usize = stats.iter().map(|s| s.duplicate_count).sum();
    let errors: usize = stats.iter().map(|s| s.error_count).sum();

    let mut lines = vec![format!(
        "Ingestion run: {} sources, {fetched} fetched, {new} new, {updated} updated, {duplicates} duplicates, {errors} errors",
        stats.len()
    )];
    for s in stats {
        lines.push(format!(
            "- {}: fetched={} new={} updated={} duplicates={} errors={} ({:?})",
            s.source, s.fetched_count, s.new_count, s.updated_count, s.duplicate_count,
            s.error_count, s.duration
        ));
    }
    lines.join("\n")
}

/// Wire a coordinator from env config and the YAML registry. The only
/// fatal failures here are configuration ones: an unreadable registry or
/// a missing credential for an enabled provider.
pub async fn build_coordinator_from_env(
    config: &IngestConfig,
    store: Arc<dyn JobStore>,
    notifier: Arc<dyn NotificationSink>,
) -> Result<(Arc<IngestionCoordinator>, Arc<QuotaLedger>)> {
    let registry = SourceRegistry::load(&config.registry_path).await?;

    let ledger = Arc::new(
        QuotaLedger::open(Arc::new(FileLedgerStore::new(config.ledger_path.clone())))
            .await
            .context("opening quota ledger")?,
    );
    let http = Arc::new(
        HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            global_concurrency: config.max_concurrency,
            host_delay: Duration::from_millis(config.host_delay_ms),
            ..HttpClientConfig::default()
        })
        .context("building http fetcher")?,
    );

    let mut sources: Vec<Arc<dyn SourceClient>> = Vec::new();
    for entry in registry.providers.iter().filter(|p| p.enabled) {
        let spec = provider_spec(&entry.name)
            .with_context(|| format!("unknown provider {} in registry", entry.name))?;
        let client = ApiSourceClient::new(spec, Arc::clone(&ledger), Arc::clone(&http))
            .await
            .with_context(|| format!("configuring provider {}", entry.name))?;
        sources.push(Arc::new(client));
    }

    let dedup = Arc::new(DeduplicationEngine::new(store, DedupConfig::default()));
    let coordinator = Arc::new(IngestionCoordinator::new(
        sources,
        PageCrawler::new(http),
        registry.crawl_targets,
        dedup,
        notifier,
        config.fetch_limit,
        config.max_concurrency,
    ));
    Ok((coordinator, ledger))
}
