//! Source client framework: data-driven API provider clients that respect
//! the quota ledger and classify provider failures back into it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use jobgrid_core::{derived_external_id, JobCandidate};
use jobgrid_store::{FetchError, HttpFetcher, QuotaLedger};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "jobgrid-sources";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("missing credential {env_var} for provider {provider}")]
    MissingCredential {
        provider: String,
        env_var: String,
    },
    #[error("provider {provider} quota exceeded")]
    QuotaExceeded { provider: String },
    #[error("provider {provider} endpoint disabled: {detail}")]
    EndpointDisabled { provider: String, detail: String },
    #[error("provider {provider} returned malformed payload: {detail}")]
    Malformed { provider: String, detail: String },
    #[error("provider {provider} fetch failed: {source}")]
    Fetch {
        provider: String,
        source: FetchError,
    },
}

/// Ordered candidate field names per extracted attribute. First alias
/// present in the payload wins; new providers are described by data
/// rather than new parsing code.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub title: &'static [&'static str],
    pub company: &'static [&'static str],
    pub location: &'static [&'static str],
    pub description: &'static [&'static str],
    pub url: &'static [&'static str],
    pub apply_url: &'static [&'static str],
    pub salary: &'static [&'static str],
    pub job_type: &'static [&'static str],
    pub posted_date: &'static [&'static str],
    pub external_id: &'static [&'static str],
}

/// Everything that distinguishes one aggregator API from another.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub endpoint: String,
    /// JSON pointer to the listing array ("" when the payload root is the array).
    pub items_pointer: &'static str,
    pub limit_param: Option<&'static str>,
    /// Env var holding the API key, appended as `key=<value>`; None for
    /// keyless providers.
    pub api_key_env: Option<&'static str>,
    pub aliases: FieldAliases,
    pub max_requests: usize,
    pub window_length_days: i64,
}

const COMMON_ALIASES: FieldAliases = FieldAliases {
    title: &["title", "job_title", "name", "position"],
    company: &["company", "company_name", "employer"],
    location: &["location", "candidate_required_location", "place", "city"],
    description: &["description", "summary", "snippet"],
    url: &["url", "link", "redirect_url"],
    apply_url: &["apply_url", "application_url", "redirect_url", "url", "link"],
    salary: &["salary", "salary_range", "compensation"],
    job_type: &["job_type", "type", "contract_time"],
    posted_date: &["publication_date", "created", "updated", "date"],
    external_id: &["id", "job_id", "slug"],
};

pub fn remotive_spec() -> ProviderSpec {
    ProviderSpec {
        name: "remotive",
        endpoint: "https://remotive.com/api/remote-jobs".to_string(),
        items_pointer: "/jobs",
        limit_param: Some("limit"),
        api_key_env: None,
        aliases: COMMON_ALIASES,
        max_requests: 100,
        window_length_days: 1,
    }
}

pub fn adzuna_spec() -> ProviderSpec {
    ProviderSpec {
        name: "adzuna",
        endpoint: "https://api.adzuna.com/v1/api/jobs/us/search/1".to_string(),
        items_pointer: "/results",
        limit_param: Some("results_per_page"),
        api_key_env: Some("ADZUNA_APP_KEY"),
        aliases: FieldAliases {
            company: &["company.display_name", "company", "company_name"],
            location: &["location.display_name", "location", "place"],
            ..COMMON_ALIASES
        },
        max_requests: 250,
        window_length_days: 30,
    }
}

pub fn jooble_spec() -> ProviderSpec {
    ProviderSpec {
        name: "jooble",
        endpoint: "https://jooble.org/api".to_string(),
        items_pointer: "/jobs",
        limit_param: None,
        api_key_env: Some("JOOBLE_API_KEY"),
        aliases: COMMON_ALIASES,
        max_requests: 500,
        window_length_days: 30,
    }
}

pub fn provider_spec(name: &str) -> Option<ProviderSpec> {
    match name {
        "remotive" => Some(remotive_spec()),
        "adzuna" => Some(adzuna_spec()),
        "jooble" => Some(jooble_spec()),
        _ => None,
    }
}

/// A listing source the coordinator can drain. One implementation per
/// external provider family.
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, limit: usize) -> Result<Vec<JobCandidate>, ProviderError>;
}

/// What a provider failure means for the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    EndpointDisabled(String),
    QuotaExceeded,
    Other(String),
}

/// Map a fetch failure onto ledger state: "endpoint disabled" messages
/// disable permanently, 429 or "quota exceeded" flags the current month,
/// anything else is logged and retried next run.
pub fn classify_failure(err: &FetchError) -> FailureDisposition {
    let text = err.to_string().to_lowercase();
    if text.contains("endpoint disabled") {
        return FailureDisposition::EndpointDisabled(err.to_string());
    }
    if let FetchError::HttpStatus { status, .. } = err {
        if *status == 429 {
            return FailureDisposition::QuotaExceeded;
        }
    }
    if text.contains("quota exceeded") {
        return FailureDisposition::QuotaExceeded;
    }
    FailureDisposition::Other(err.to_string())
}

/// Aggregator API client driven entirely by a [`ProviderSpec`].
pub struct ApiSourceClient {
    spec: ProviderSpec,
    api_key: Option<String>,
    ledger: Arc<QuotaLedger>,
    http: Arc<HttpFetcher>,
}

impl ApiSourceClient {
    /// Resolve credentials and register the provider's fixed quota
    /// parameters. A missing credential for a configured provider is a
    /// startup error, the only fatal kind in the pipeline.
    pub async fn new(
        spec: ProviderSpec,
        ledger: Arc<QuotaLedger>,
        http: Arc<HttpFetcher>,
    ) -> Result<Self, ProviderError> {
        let api_key = match spec.api_key_env {
            Some(env_var) => match std::env::var(env_var) {
                Ok(value) if !value.trim().is_empty() => Some(value),
                _ => {
                    return Err(ProviderError::MissingCredential {
                        provider: spec.name.to_string(),
                        env_var: env_var.to_string(),
                    })
                }
            },
            None => None,
        };
        ledger
            .register_source(spec.name, spec.max_requests, spec.window_length_days)
            .await;
        Ok(Self {
            spec,
            api_key,
            ledger,
            http,
        })
    }

    fn request_url(&self, limit: usize) -> String {
        let mut pairs: Vec<String> = Vec::new();
        if let Some(param) = self.spec.limit_param {
            pairs.push(format!("{param}={limit}"));
        }
        if let Some(key) = &self.api_key {
            pairs.push(format!("key={key}"));
        }
        if pairs.is_empty() {
            self.spec.endpoint.clone()
        } else {
            let sep = if self.spec.endpoint.contains('?') { '&' } else { '?' };
            format!("{}{}{}", self.spec.endpoint, sep, pairs.join("&"))
        }
    }

    async fn apply_failure(&self, err: &FetchError) {
        match classify_failure(err) {
            FailureDisposition::EndpointDisabled(detail) => {
                self.ledger
                    .disable_endpoint(self.spec.name, &self.spec.endpoint, &detail)
                    .await;
            }
            FailureDisposition::QuotaExceeded => {
                let month = QuotaLedger::month_key(Utc::now());
                self.ledger
                    .mark_quota_exceeded(self.spec.name, &month)
                    .await;
            }
            FailureDisposition::Other(detail) => {
                warn!(source = self.spec.name, detail = %detail, "provider fetch failed");
            }
        }
    }
}

#[async_trait]
impl SourceClient for ApiSourceClient {
    fn name(&self) -> &str {
        self.spec.name
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<JobCandidate>, ProviderError> {
        // Atomic capacity check + request accounting before any network
        // I/O. Denial returns empty without counting a request.
        if !self.ledger.try_begin_request(self.spec.name).await {
            debug!(source = self.spec.name, "quota window full, skipping fetch");
            return Ok(Vec::new());
        }

        let request_url = self.request_url(limit);
        let response = match self.http.get(self.spec.name, &request_url, &[]).await {
            Ok(response) => response,
            Err(err) => {
                self.apply_failure(&err).await;
                return match classify_failure(&err) {
                    FailureDisposition::QuotaExceeded => Err(ProviderError::QuotaExceeded {
                        provider: self.spec.name.to_string(),
                    }),
                    FailureDisposition::EndpointDisabled(detail) => {
                        Err(ProviderError::EndpointDisabled {
                            provider: self.spec.name.to_string(),
                            detail,
                        })
                    }
                    FailureDisposition::Other(_) => Err(ProviderError::Fetch {
                        provider: self.spec.name.to_string(),
                        source: err,
                    }),
                };
            }
        };

        let payload: JsonValue =
            serde_json::from_slice(&response.body).map_err(|err| ProviderError::Malformed {
                provider: self.spec.name.to_string(),
                detail: err.to_string(),
            })?;
        Ok(parse_payload(&self.spec, &payload, limit))
    }
}

/// Walk the alias table over one payload. Items missing a usable title or
/// company are skipped rather than failing the batch.
pub fn parse_payload(spec: &ProviderSpec, payload: &JsonValue, limit: usize) -> Vec<JobCandidate> {
    let items = if spec.items_pointer.is_empty() {
        payload
    } else {
        match payload.pointer(spec.items_pointer) {
            Some(items) => items,
            None => payload,
        }
    };
    let Some(items) = items.as_array() else {
        warn!(
            source = spec.name,
            pointer = spec.items_pointer,
            "payload has no listing array"
        );
        return Vec::new();
    };

    items
        .iter()
        .take(limit)
        .filter_map(|item| candidate_from_item(spec, item))
        .collect()
}

fn candidate_from_item(spec: &ProviderSpec, item: &JsonValue) -> Option<JobCandidate> {
    let title = first_alias_string(item, spec.aliases.title)?;
    let company = first_alias_string(item, spec.aliases.company)?;
    let url = first_alias_string(item, spec.aliases.url).unwrap_or_default();
    let apply_url = first_alias_string(item, spec.aliases.apply_url);
    let external_id = first_alias_string(item, spec.aliases.external_id)
        .unwrap_or_else(|| derived_external_id(apply_url.as_deref().unwrap_or(&url), &title));

    Some(JobCandidate {
        location: first_alias_string(item, spec.aliases.location).unwrap_or_default(),
        description: first_alias_string(item, spec.aliases.description).unwrap_or_default(),
        salary: first_alias_string(item, spec.aliases.salary),
        job_type: first_alias_string(item, spec.aliases.job_type),
        posted_date: first_alias_string(item, spec.aliases.posted_date)
            .and_then(|raw| parse_posted_date(&raw)),
        requirements: None,
        source: spec.name.to_string(),
        title,
        company,
        url,
        apply_url,
        external_id,
    })
}

/// Aliases may be plain keys or dotted paths into nested objects
/// (`company.display_name`).
fn first_alias_string(item: &JsonValue, aliases: &[&str]) -> Option<String> {
    for alias in aliases {
        let mut cursor = item;
        let mut found = true;
        for segment in alias.split('.') {
            match cursor.get(segment) {
                Some(next) => cursor = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if !found {
            continue;
        }
        let text = match cursor {
            JsonValue::String(s) => s.trim().to_string(),
            JsonValue::Number(n) => n.to_string(),
            _ => continue,
        };
        if !text.is_empty() {
            return Some(text);
        }
    }
    None
}

fn parse_posted_date(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobgrid_store::{
        BackoffPolicy, HttpClientConfig, MemoryLedgerStore,
    };
    use serde_json::json;
    use std::time::Duration;

    fn remotive_payload() -> JsonValue {
        json!({
            "jobs": [
                {
                    "id": 91011,
                    "title": "Senior Backend Engineer",
                    "company_name": "Acme Corp",
                    "candidate_required_location": "Worldwide",
                    "description": "Own the ingestion stack end to end.",
                    "url": "https://remotive.com/jobs/91011",
                    "publication_date": "2026-07-30T08:00:00",
                    "salary": "$150k-$180k"
                },
                {
                    "id": 91012,
                    "title": "Data Analyst",
                    "company_name": "Beta Labs",
                    "url": "https://remotive.com/jobs/91012"
                },
                {
                    "id": 91013,
                    "title": "Orphaned Listing"
                }
            ]
        })
    }

    #[test]
    fn alias_table_first_match_wins() {
        let item = json!({
            "job_title": "Fallback Title",
            "title": "Primary Title",
            "employer": "Acme"
        });
        assert_eq!(
            first_alias_string(&item, COMMON_ALIASES.title).as_deref(),
            Some("Primary Title")
        );
        assert_eq!(
            first_alias_string(&item, COMMON_ALIASES.company).as_deref(),
            Some("Acme")
        );
    }

    #[test]
    fn dotted_aliases_reach_nested_objects() {
        let item = json!({
            "title": "Platform Engineer",
            "company": { "display_name": "Gamma Inc" },
            "location": { "display_name": "Austin, TX" }
        });
        let spec = adzuna_spec();
        assert_eq!(
            first_alias_string(&item, spec.aliases.company).as_deref(),
            Some("Gamma Inc")
        );
        assert_eq!(
            first_alias_string(&item, spec.aliases.location).as_deref(),
            Some("Austin, TX")
        );
    }

    #[test]
    fn payload_parsing_skips_items_without_identity() {
        let spec = remotive_spec();
        let candidates = parse_payload(&spec, &remotive_payload(), 50);
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.title, "Senior Backend Engineer");
        assert_eq!(first.company, "Acme Corp");
        assert_eq!(first.external_id, "91011");
        assert_eq!(first.source, "remotive");
        assert_eq!(
            first.posted_date,
            NaiveDate::from_ymd_opt(2026, 7, 30)
        );
        assert_eq!(first.salary.as_deref(), Some("$150k-$180k"));

        // No id field anywhere would fall back to the derived hash; the
        // second item still carries the provider id.
        assert_eq!(candidates[1].external_id, "91012");
    }

    #[test]
    fn payload_parsing_honors_limit_and_bad_shapes() {
        let spec = remotive_spec();
        assert_eq!(parse_payload(&spec, &remotive_payload(), 1).len(), 1);
        assert!(parse_payload(&spec, &json!({"jobs": "nope"}), 10).is_empty());
        assert!(parse_payload(&spec, &json!("not an object"), 10).is_empty());
    }

    #[test]
    fn failure_classification_matches_the_taxonomy() {
        let disabled = FetchError::HttpStatus {
            status: 403,
            url: "https://api.example/v1".to_string(),
            body_excerpt: "This endpoint disabled, contact support".to_string(),
        };
        assert!(matches!(
            classify_failure(&disabled),
            FailureDisposition::EndpointDisabled(_)
        ));

        let throttled = FetchError::HttpStatus {
            status: 429,
            url: "https://api.example/v1".to_string(),
            body_excerpt: String::new(),
        };
        assert_eq!(classify_failure(&throttled), FailureDisposition::QuotaExceeded);

        let quota_message = FetchError::HttpStatus {
            status: 400,
            url: "https://api.example/v1".to_string(),
            body_excerpt: "Monthly quota exceeded".to_string(),
        };
        assert_eq!(
            classify_failure(&quota_message),
            FailureDisposition::QuotaExceeded
        );

        let other = FetchError::HttpStatus {
            status: 500,
            url: "https://api.example/v1".to_string(),
            body_excerpt: "oops".to_string(),
        };
        assert!(matches!(classify_failure(&other), FailureDisposition::Other(_)));
    }

    async fn unreachable_client(max_requests: usize) -> ApiSourceClient {
        let ledger = Arc::new(
            QuotaLedger::open(Arc::new(MemoryLedgerStore::default()))
                .await
                .unwrap(),
        );
        let http = Arc::new(
            HttpFetcher::new(HttpClientConfig {
                timeout: Duration::from_millis(500),
                host_delay: Duration::ZERO,
                backoff: BackoffPolicy {
                    max_retries: 0,
                    ..BackoffPolicy::default()
                },
                ..HttpClientConfig::default()
            })
            .unwrap(),
        );
        let spec = ProviderSpec {
            // Nothing listens on port 9; connects fail fast.
            endpoint: "http://127.0.0.1:9/api".to_string(),
            max_requests,
            window_length_days: 1,
            ..remotive_spec()
        };
        ApiSourceClient::new(spec, ledger, http).await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn quota_window_gates_network_io() {
        let client = unreachable_client(2).await;

        // First two fetches attempt I/O and consume the window.
        assert!(client.fetch(10).await.is_err());
        assert!(client.fetch(10).await.is_err());
        assert_eq!(client.ledger.requests_remaining("remotive").await, 0);

        // Third same-day call short-circuits: empty, no I/O, nothing counted.
        let third = client.fetch(10).await.unwrap();
        assert!(third.is_empty());
        assert_eq!(client.ledger.requests_remaining("remotive").await, 0);
    }

    #[tokio::test]
    async fn missing_credential_is_a_startup_error() {
        std::env::remove_var("JOOBLE_API_KEY");
        let ledger = Arc::new(
            QuotaLedger::open(Arc::new(MemoryLedgerStore::default()))
                .await
                .unwrap(),
        );
        let http = Arc::new(HttpFetcher::new(HttpClientConfig::default()).unwrap());
        let err = ApiSourceClient::new(jooble_spec(), ledger, http)
            .await
            .err()
            .expect("credential error");
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
    }
}
