//! Career-page crawler: platform-specific extractors for known ATS hosts,
//! declarative locator resolution with best-effort XPath conversion, and a
//! generic keyword-driven fallback extractor.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use jobgrid_core::{derived_external_id, JobCandidate};
use jobgrid_store::{FetchError, HttpFetcher};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "jobgrid-crawl";

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("fetching {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// Declarative locator for job containers on a crawled page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorEntry {
    pub selector_type: SelectorType,
    pub expr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorType {
    Css,
    Xpath,
}

/// One employer career page to crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTarget {
    pub url: String,
    pub company: String,
    #[serde(default)]
    pub locators: Vec<LocatorEntry>,
}

/// Which tier of the two-tier selector strategy fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorResolution {
    /// The expression was usable as (or safely converted to) CSS.
    Converted(String),
    /// The expression could not be converted; the fixed generic selector
    /// set applies instead.
    Fallback { reason: String },
}

/// Generic selector set used whenever conversion falls back.
pub const FALLBACK_SELECTORS: &[&str] = &[
    ".job-listing",
    ".job-item",
    ".job",
    ".position",
    ".opening",
    ".vacancy",
    "li.listing",
    "article",
];

const ROLE_KEYWORDS: &[&str] = &[
    "engineer",
    "developer",
    "manager",
    "analyst",
    "designer",
    "specialist",
    "coordinator",
    "director",
    "lead",
    "scientist",
    "architect",
    "intern",
    "associate",
];

const CLASS_HINTS: &[&str] = &["job", "position", "opening", "vacancy", "posting", "career", "role"];

const STYLING_MARKERS: &[&str] = &["<script", "<style", "function(", "@media", "display:", "{"];

const MIN_TEXT_LEN: usize = 10;
const MAX_TEXT_LEN: usize = 500;

/// Fixed extractor for a known career-page platform, keyed by host
/// substring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformExtractor {
    pub host_hint: &'static str,
    pub name: &'static str,
    pub row_selector: &'static str,
    pub title_selector: &'static str,
    pub location_selector: &'static str,
    pub link_selector: &'static str,
}

pub const PLATFORMS: &[PlatformExtractor] = &[
    PlatformExtractor {
        host_hint: "greenhouse.io",
        name: "greenhouse",
        row_selector: "div.opening",
        title_selector: "a",
        location_selector: "span.location",
        link_selector: "a",
    },
    PlatformExtractor {
        host_hint: "lever.co",
        name: "lever",
        row_selector: "div.posting",
        title_selector: "h5",
        location_selector: "span.sort-by-location",
        link_selector: "a.posting-title",
    },
    PlatformExtractor {
        host_hint: "workable.com",
        name: "workable",
        row_selector: "li[data-ui=job]",
        title_selector: "h3",
        location_selector: "span[data-ui=job-location]",
        link_selector: "a",
    },
    PlatformExtractor {
        host_hint: "ashbyhq.com",
        name: "ashby",
        row_selector: "div.job-posting-brief",
        title_selector: "h3",
        location_selector: "p",
        link_selector: "a",
    },
    PlatformExtractor {
        host_hint: "breezy.hr",
        name: "breezy",
        row_selector: "li.position",
        title_selector: "h2",
        location_selector: "li.location",
        link_selector: "a",
    },
    PlatformExtractor {
        host_hint: "bamboohr.com",
        name: "bamboohr",
        row_selector: "div.BambooHR-ATS-Jobs-Item",
        title_selector: "a",
        location_selector: "span.BambooHR-ATS-Location",
        link_selector: "a",
    },
];

pub fn platform_for_host(host: &str) -> Option<&'static PlatformExtractor> {
    PLATFORMS.iter().find(|p| host.contains(p.host_hint))
}

/// Resolve one locator entry into the CSS tier or the fallback tier.
/// Resolution never errors; anything unsafe lands in `Fallback`.
pub fn resolve_selector(entry: &LocatorEntry) -> SelectorResolution {
    match entry.selector_type {
        SelectorType::Css => match Selector::parse(&entry.expr) {
            Ok(_) => SelectorResolution::Converted(entry.expr.clone()),
            Err(err) => SelectorResolution::Fallback {
                reason: format!("invalid css: {err}"),
            },
        },
        SelectorType::Xpath => match convert_xpath(&entry.expr) {
            Ok(css) => {
                match Selector::parse(&css).map_err(|err| format!("converted css did not parse: {err}")) {
                    Ok(_) => SelectorResolution::Converted(css),
                    Err(reason) => SelectorResolution::Fallback { reason },
                }
            }
            Err(reason) => SelectorResolution::Fallback {
                reason: reason.to_string(),
            },
        },
    }
}

/// Best-effort XPath-like to CSS conversion. Handles descendant/child
/// axes and the simple `[@attr='v']` / `contains(@class,'v')` predicate
/// forms; everything else is unsupported by design.
fn convert_xpath(expr: &str) -> Result<String, &'static str> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err("empty expression");
    }
    if expr.starts_with('(') {
        return Err("parenthesised indexed predicates are not convertible");
    }
    if expr.contains("position()") {
        return Err("position() is not convertible");
    }
    if expr.contains("text()") {
        return Err("text() predicates are not convertible");
    }

    let stripped = expr.strip_prefix("//").unwrap_or(expr);
    let mut css_steps = Vec::new();
    // A leading "//" marks the descendant axis; inner "//" keeps it
    // between steps, single "/" becomes the child combinator.
    for descendant_group in stripped.split("//") {
        let mut child_steps = Vec::new();
        for step in descendant_group.split('/') {
            if step.is_empty() {
                continue;
            }
            child_steps.push(convert_step(step)?);
        }
        if !child_steps.is_empty() {
            css_steps.push(child_steps.join(" > "));
        }
    }
    if css_steps.is_empty() {
        return Err("no convertible steps");
    }
    Ok(css_steps.join(" "))
}

fn convert_step(step: &str) -> Result<String, &'static str> {
    let (tag, rest) = match step.find('[') {
        Some(idx) => (&step[..idx], &step[idx..]),
        None => (step, ""),
    };
    let tag = if tag == "*" {
        "*".to_string()
    } else if tag.is_empty() {
        String::new()
    } else if tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        tag.to_string()
    } else {
        return Err("unsupported axis or node test");
    };

    let mut css = tag;
    let mut remaining = rest;
    while !remaining.is_empty() {
        let Some(close) = remaining.find(']') else {
            return Err("unbalanced predicate");
        };
        let predicate = &remaining[1..close];
        css.push_str(&convert_predicate(predicate)?);
        remaining = &remaining[close + 1..];
    }
    if css.is_empty() {
        css.push('*');
    }
    Ok(css)
}

fn convert_predicate(predicate: &str) -> Result<String, &'static str> {
    let predicate = predicate.trim();
    if predicate.chars().all(|c| c.is_ascii_digit()) {
        return Err("numeric index predicates are not convertible");
    }
    if let Some(inner) = predicate
        .strip_prefix("contains(@class,")
        .and_then(|s| s.strip_suffix(')'))
    {
        let class = inner.trim().trim_matches('\'').trim_matches('"');
        if class.is_empty() || class.contains(char::is_whitespace) {
            return Err("unsupported contains() argument");
        }
        return Ok(format!(".{class}"));
    }
    if let Some(rest) = predicate.strip_prefix('@') {
        let Some((attr, value)) = rest.split_once('=') else {
            return Ok(format!("[{rest}]"));
        };
        let value = value.trim().trim_matches('\'').trim_matches('"');
        return Ok(format!("[{}=\"{}\"]", attr.trim(), value));
    }
    Err("unsupported predicate")
}

/// Crawls one page into zero or more candidates. Malformed markup always
/// degrades to zero results; only the fetch itself can error.
pub struct PageCrawler {
    http: Arc<HttpFetcher>,
}

impl PageCrawler {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }

    pub async fn crawl(&self, target: &CrawlTarget) -> Result<Vec<JobCandidate>, CrawlError> {
        let response = self
            .http
            .get("crawl", &target.url, &[])
            .await
            .map_err(|source| CrawlError::Fetch {
                url: target.url.clone(),
                source,
            })?;
        Ok(extract_from_html(target, &response.body_text()))
    }
}

/// Pure extraction boundary: platform dispatch, locator resolution,
/// container splitting, generic extraction.
pub fn extract_from_html(target: &CrawlTarget, html: &str) -> Vec<JobCandidate> {
    let document = Html::parse_document(html);
    let host = url::Url::parse(&target.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    let mut candidates = if let Some(platform) = platform_for_host(&host) {
        debug!(host = %host, platform = platform.name, "using platform extractor");
        extract_with_platform(target, &document, platform)
    } else {
        extract_with_locators(target, &document)
    };

    // Within-page dedup on the stable id.
    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.external_id.clone()));
    candidates
}

fn extract_with_platform(
    target: &CrawlTarget,
    document: &Html,
    platform: &PlatformExtractor,
) -> Vec<JobCandidate> {
    let Ok(rows) = Selector::parse(platform.row_selector) else {
        return Vec::new();
    };
    let title_sel = Selector::parse(platform.title_selector).ok();
    let location_sel = Selector::parse(platform.location_selector).ok();
    let link_sel = Selector::parse(platform.link_selector).ok();

    document
        .select(&rows)
        .filter_map(|row| {
            let title = title_sel
                .as_ref()
                .and_then(|sel| row.select(sel).next())
                .map(element_text)
                .filter(|t| !t.is_empty())?;
            let location = location_sel
                .as_ref()
                .and_then(|sel| row.select(sel).next())
                .map(element_text)
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| "Remote".to_string());
            let link = link_sel
                .as_ref()
                .and_then(|sel| row.select(sel).next())
                .and_then(|el| el.value().attr("href"))
                .map(|href| absolutize(&target.url, href));
            let apply_url = link.clone().unwrap_or_else(|| target.url.clone());

            Some(JobCandidate {
                external_id: derived_external_id(&apply_url, &title),
                description: element_text(row),
                title,
                company: target.company.clone(),
                location,
                url: target.url.clone(),
                apply_url: Some(apply_url),
                salary: None,
                job_type: None,
                posted_date: None,
                requirements: None,
                source: "crawl".to_string(),
            })
        })
        .collect()
}

fn extract_with_locators(target: &CrawlTarget, document: &Html) -> Vec<JobCandidate> {
    for entry in &target.locators {
        let css_set: Vec<String> = match resolve_selector(entry) {
            SelectorResolution::Converted(css) => vec![css],
            SelectorResolution::Fallback { reason } => {
                debug!(expr = %entry.expr, reason = %reason, "locator fell back to generic selectors");
                FALLBACK_SELECTORS.iter().map(|s| s.to_string()).collect()
            }
        };
        let candidates = extract_with_selector_set(target, document, &css_set);
        if !candidates.is_empty() {
            return candidates;
        }
    }

    // No locators configured, or none of them selected anything.
    let fallback: Vec<String> = FALLBACK_SELECTORS.iter().map(|s| s.to_string()).collect();
    extract_with_selector_set(target, document, &fallback)
}

fn extract_with_selector_set(
    target: &CrawlTarget,
    document: &Html,
    selectors: &[String],
) -> Vec<JobCandidate> {
    let mut out = Vec::new();
    for css in selectors {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        for element in document.select(&selector) {
            let postings = split_container(element);
            if postings.is_empty() {
                out.extend(extract_single(target, element));
            } else {
                for posting in postings {
                    out.extend(extract_single(target, posting));
                }
            }
        }
        if !out.is_empty() {
            break;
        }
    }
    out
}

/// Containers holding several postings are split into their job-like
/// sub-elements; anything else is treated as a single posting.
fn split_container(container: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    static ALL: OnceLock<Selector> = OnceLock::new();
    let all = ALL.get_or_init(|| Selector::parse("*").expect("wildcard selector"));

    let matched: Vec<ElementRef<'_>> = container
        .select(all)
        .filter(|el| is_job_like(*el))
        .collect();

    // Keep only the outermost job-like elements so one posting is not
    // extracted once per nested match.
    let ids: HashSet<_> = matched.iter().map(|el| el.id()).collect();
    let outermost: Vec<ElementRef<'_>> = matched
        .into_iter()
        .filter(|el| {
            !el.ancestors()
                .take_while(|a| a.id() != container.id())
                .any(|a| ids.contains(&a.id()))
        })
        .collect();

    if outermost.len() >= 2 {
        outermost
    } else {
        Vec::new()
    }
}

fn is_job_like(element: ElementRef<'_>) -> bool {
    if let Some(class) = element.value().attr("class") {
        let class = class.to_lowercase();
        if CLASS_HINTS.iter().any(|hint| class.contains(hint)) {
            return true;
        }
    }
    let text = element_text(element);
    (MIN_TEXT_LEN..=MAX_TEXT_LEN).contains(&text.len()) && contains_role_keyword(&text)
}

/// Generic single-posting extraction with the length, marker, and
/// keyword gates. Returns None instead of guessing on anything dubious.
fn extract_single(target: &CrawlTarget, element: ElementRef<'_>) -> Option<JobCandidate> {
    let text = element_text(element);
    if !(MIN_TEXT_LEN..=MAX_TEXT_LEN).contains(&text.len()) {
        return None;
    }
    let lowered = text.to_lowercase();
    if STYLING_MARKERS.iter().any(|m| lowered.contains(m)) {
        return None;
    }
    if !contains_role_keyword(&text) {
        return None;
    }

    let title = extract_title(element).unwrap_or_else(|| first_line(&text));
    if title.is_empty() {
        return None;
    }
    let apply_url = extract_link(element)
        .map(|href| absolutize(&target.url, &href))
        .unwrap_or_else(|| target.url.clone());

    Some(JobCandidate {
        external_id: derived_external_id(&apply_url, &title),
        location: infer_location(&text),
        description: text,
        title,
        company: target.company.clone(),
        url: target.url.clone(),
        apply_url: Some(apply_url),
        salary: None,
        job_type: None,
        posted_date: None,
        requirements: None,
        source: "crawl".to_string(),
    })
}

fn contains_role_keyword(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ROLE_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

fn extract_title(element: ElementRef<'_>) -> Option<String> {
    static TITLE: OnceLock<Selector> = OnceLock::new();
    let selector = TITLE.get_or_init(|| {
        Selector::parse("h1, h2, h3, h4, h5, .title, .job-title, a").expect("title selector")
    });
    element
        .select(selector)
        .map(element_text)
        .find(|t| !t.is_empty() && t.len() <= 120)
}

fn extract_link(element: ElementRef<'_>) -> Option<String> {
    static LINK: OnceLock<Selector> = OnceLock::new();
    let selector = LINK.get_or_init(|| Selector::parse("a[href]").expect("link selector"));
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::to_string)
}

/// Location by regex proximity: an explicit "Location:" label wins, then
/// a "City, ST" shape, then a work-mode keyword. Defaults to Remote.
fn infer_location(text: &str) -> String {
    static LABELED: OnceLock<Regex> = OnceLock::new();
    static CITY_STATE: OnceLock<Regex> = OnceLock::new();
    static MODE: OnceLock<Regex> = OnceLock::new();

    let labeled = LABELED.get_or_init(|| {
        Regex::new(r"(?i)location[:\s]+([A-Za-z][A-Za-z ,-]{2,40})").expect("location regex")
    });
    if let Some(caps) = labeled.captures(text) {
        if let Some(m) = caps.get(1) {
            return m.as_str().trim().trim_end_matches([',', '.']).to_string();
        }
    }

    let city_state = CITY_STATE.get_or_init(|| {
        Regex::new(r"\b([A-Z][a-zA-Z]+(?: [A-Z][a-zA-Z]+)*,\s*[A-Z]{2})\b").expect("city regex")
    });
    if let Some(m) = city_state.find(text) {
        return m.as_str().to_string();
    }

    let mode = MODE.get_or_init(|| {
        Regex::new(r"(?i)\b(remote|hybrid|on-?site)\b").expect("mode regex")
    });
    if let Some(m) = mode.find(text) {
        let found = m.as_str().to_lowercase();
        let mut chars = found.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => "Remote".to_string(),
        };
    }

    "Remote".to_string()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_line(text: &str) -> String {
    text.chars().take(80).collect::<String>().trim().to_string()
}

fn absolutize(base: &str, href: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(joined) => joined.to_string(),
        Err(err) => {
            warn!(base, href, error = %err, "could not resolve link");
            href.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(url: &str) -> CrawlTarget {
        CrawlTarget {
            url: url.to_string(),
            company: "Acme Corp".to_string(),
            locators: Vec::new(),
        }
    }

    fn xpath(expr: &str) -> LocatorEntry {
        LocatorEntry {
            selector_type: SelectorType::Xpath,
            expr: expr.to_string(),
        }
    }

    #[test]
    fn simple_xpath_converts_to_css() {
        assert_eq!(
            resolve_selector(&xpath("//div[@class='jobs']/ul/li")),
            SelectorResolution::Converted("div[class=\"jobs\"] > ul > li".to_string())
        );
        assert_eq!(
            resolve_selector(&xpath("//div[contains(@class,'listing')]//a")),
            SelectorResolution::Converted("div.listing a".to_string())
        );
        assert_eq!(
            resolve_selector(&xpath("//*[@data-job='1']")),
            SelectorResolution::Converted("*[data-job=\"1\"]".to_string())
        );
    }

    #[test]
    fn unsupported_xpath_falls_back_instead_of_raising() {
        for expr in [
            "(//div[@class='a'])[2]",
            "//div[position()=1]",
            "//span[contains(text(),'Engineer')]",
            "//ul/li[3]",
            "//div[@class='a'",
        ] {
            match resolve_selector(&xpath(expr)) {
                SelectorResolution::Fallback { .. } => {}
                SelectorResolution::Converted(css) => {
                    panic!("{expr} unexpectedly converted to {css}")
                }
            }
        }
    }

    #[test]
    fn invalid_css_locator_falls_back() {
        let entry = LocatorEntry {
            selector_type: SelectorType::Css,
            expr: "div[[".to_string(),
        };
        assert!(matches!(
            resolve_selector(&entry),
            SelectorResolution::Fallback { .. }
        ));
    }

    #[test]
    fn platform_table_matches_by_host_substring() {
        assert_eq!(
            platform_for_host("boards.greenhouse.io").map(|p| p.name),
            Some("greenhouse")
        );
        assert_eq!(
            platform_for_host("jobs.lever.co").map(|p| p.name),
            Some("lever")
        );
        assert_eq!(platform_for_host("careers.acme.dev"), None);
    }

    #[test]
    fn greenhouse_pages_use_the_platform_extractor() {
        let html = r#"
            <div class="opening">
              <a href="/acme/jobs/101">Senior Backend Engineer</a>
              <span class="location">Berlin, Germany</span>
            </div>
            <div class="opening">
              <a href="/acme/jobs/102">Staff Data Scientist</a>
              <span class="location">Remote</span>
            </div>
        "#;
        let candidates =
            extract_from_html(&target("https://boards.greenhouse.io/acme"), html);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Senior Backend Engineer");
        assert_eq!(candidates[0].location, "Berlin, Germany");
        assert_eq!(
            candidates[0].apply_url.as_deref(),
            Some("https://boards.greenhouse.io/acme/jobs/101")
        );
        assert_eq!(candidates[0].company, "Acme Corp");
        assert_eq!(candidates[1].title, "Staff Data Scientist");
    }

    #[test]
    fn container_of_multiple_postings_is_split() {
        let html = r#"
            <section class="careers">
              <div class="job-card"><h3>Platform Engineer</h3><a href="/jobs/1">Apply</a> Remote</div>
              <div class="job-card"><h3>Product Designer</h3><a href="/jobs/2">Apply</a> Austin, TX</div>
              <div class="footer">About us and contact details for the team</div>
            </section>
        "#;
        let mut t = target("https://careers.acme.dev/");
        t.locators = vec![LocatorEntry {
            selector_type: SelectorType::Css,
            expr: "section.careers".to_string(),
        }];
        let candidates = extract_from_html(&t, html);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Platform Engineer");
        assert_eq!(candidates[1].title, "Product Designer");
        assert_eq!(candidates[1].location, "Austin, TX");
    }

    #[test]
    fn generic_extraction_rejects_noise() {
        let html = r#"
            <div class="job">tiny</div>
            <div class="job">function() { display: none; } engineer</div>
            <div class="job">We sell widgets and have an office dog named Biscuit.</div>
            <div class="job"><h3>Backend Engineer</h3><a href="/apply/9">Apply now</a> Hybrid role.</div>
        "#;
        let candidates = extract_from_html(&target("https://careers.acme.dev/"), html);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Backend Engineer");
        assert_eq!(candidates[0].location, "Hybrid");
    }

    #[test]
    fn location_defaults_to_remote() {
        let html = r#"<div class="job"><h3>QA Analyst</h3><a href="/q">Apply</a> Join the team.</div>"#;
        let candidates = extract_from_html(&target("https://careers.acme.dev/"), html);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].location, "Remote");
        assert_eq!(candidates[0].external_id.len(), 16);
    }

    #[test]
    fn labeled_location_wins_over_mode_keyword() {
        let html = r#"<div class="job"><h3>Support Specialist</h3>Location: Lisbon, Portugal. Remote friendly.</div>"#;
        let candidates = extract_from_html(&target("https://careers.acme.dev/"), html);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].location, "Lisbon, Portugal");
    }

    #[test]
    fn malformed_input_degrades_to_zero_results() {
        for html in [
            "",
            "<<<<>>>> not even close",
            "<div class=\"job\">",
            "\u{0000}\u{0001}",
        ] {
            let candidates = extract_from_html(&target("https://careers.acme.dev/"), html);
            assert!(candidates.is_empty(), "unexpected extraction from {html:?}");
        }
        // Unparseable target URL still cannot panic.
        let candidates = extract_from_html(&target("not a url"), "<div class='job'>x</div>");
        assert!(candidates.is_empty());
    }

    #[test]
    fn duplicate_postings_on_one_page_collapse() {
        let html = r#"
            <div class="job"><h3>Backend Engineer</h3><a href="/apply/9">Apply</a> Ship things.</div>
            <div class="job"><h3>Backend Engineer</h3><a href="/apply/9">Apply</a> Ship things.</div>
        "#;
        let candidates = extract_from_html(&target("https://careers.acme.dev/"), html);
        assert_eq!(candidates.len(), 1);
    }
}
