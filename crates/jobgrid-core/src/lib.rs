//! Core domain model and text normalization for JobGrid.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobgrid-core";

/// A freshly extracted, not-yet-deduplicated job listing.
///
/// Produced by source clients and the page crawler; flows through the
/// normalizer and deduplication engine before anything is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCandidate {
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub url: String,
    pub apply_url: Option<String>,
    pub salary: Option<String>,
    pub job_type: Option<String>,
    pub posted_date: Option<NaiveDate>,
    pub requirements: Option<Vec<String>>,
    pub source: String,
    pub external_id: String,
}

/// Canonical persisted job listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub url: String,
    pub apply_url: Option<String>,
    pub salary: Option<String>,
    pub job_type: Option<String>,
    pub posted_date: Option<NaiveDate>,
    pub requirements: Option<Vec<String>>,
    pub source: String,
    pub external_id: String,
    pub content_hash: String,
    pub title_normalized: String,
    pub company_normalized: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

impl JobRecord {
    /// Build a persistable record from a candidate. Normalization and
    /// content hashing always happen here, before any store write.
    pub fn from_candidate(candidate: &JobCandidate, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: candidate.title.clone(),
            company: candidate.company.clone(),
            location: candidate.location.clone(),
            description: candidate.description.clone(),
            url: candidate.url.clone(),
            apply_url: candidate.apply_url.clone(),
            salary: candidate.salary.clone(),
            job_type: candidate.job_type.clone(),
            posted_date: candidate.posted_date,
            requirements: candidate.requirements.clone(),
            source: candidate.source.clone(),
            external_id: candidate.external_id.clone(),
            content_hash: content_hash(
                &candidate.title,
                &candidate.company,
                &candidate.description,
            ),
            title_normalized: normalize_text(&candidate.title),
            company_normalized: normalize_text(&candidate.company),
            created_at: now,
            updated_at: now,
            is_active: true,
        }
    }
}

/// Which strategy in the dedup cascade produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    ExactExternalIdMatch,
    UrlExactMatch,
    TitleCompanyExactMatch,
    ContentHashMatch,
    FuzzyTitleDescriptionMatch,
    NoMatch,
}

/// Qualitative strength of a dedup match; gates whether the matched
/// record is mutated on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Outcome of running one candidate through the dedup cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupVerdict {
    pub is_duplicate: bool,
    pub matched_record_id: Option<Uuid>,
    pub similarity_score: f64,
    pub reason: MatchReason,
    pub confidence: Confidence,
}

impl DedupVerdict {
    pub fn no_match() -> Self {
        Self {
            is_duplicate: false,
            matched_record_id: None,
            similarity_score: 0.0,
            reason: MatchReason::NoMatch,
            confidence: Confidence::Low,
        }
    }
}

/// Persisted quota state for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceQuota {
    pub source_name: String,
    pub window_length_days: i64,
    pub max_requests: usize,
    #[serde(default)]
    pub request_timestamps: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub disabled_endpoints: std::collections::BTreeSet<String>,
    /// Month keys ("YYYY-MM") in which the provider reported quota
    /// exhaustion. Stale months are pruned on read.
    #[serde(default)]
    pub quota_exceeded_months: std::collections::BTreeSet<String>,
}

impl SourceQuota {
    pub fn new(source_name: impl Into<String>, max_requests: usize, window_length_days: i64) -> Self {
        Self {
            source_name: source_name.into(),
            window_length_days,
            max_requests,
            request_timestamps: Vec::new(),
            disabled_endpoints: std::collections::BTreeSet::new(),
            quota_exceeded_months: std::collections::BTreeSet::new(),
        }
    }
}

/// Per-source counters aggregated over one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub source: String,
    pub fetched_count: usize,
    pub new_count: usize,
    pub updated_count: usize,
    pub duplicate_count: usize,
    pub error_count: usize,
    pub duration: std::time::Duration,
}

impl RunStatistics {
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fetched_count: 0,
            new_count: 0,
            updated_count: 0,
            duplicate_count: 0,
            error_count: 0,
            duration: std::time::Duration::ZERO,
        }
    }
}

/// Lowercase, trim, collapse whitespace, strip everything that is not
/// alphanumeric or a space.
pub fn normalize_text(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic content hash over the normalized identity fields.
pub fn content_hash(title: &str, company: &str, description: &str) -> String {
    let canonical = format!(
        "{}|{}|{}",
        normalize_text(title),
        normalize_text(company),
        normalize_text(description)
    );
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stable identifier for crawled candidates that carry no provider id.
pub fn derived_external_id(apply_url: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(apply_url.as_bytes());
    hasher.update(b"|");
    hasher.update(title.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}
