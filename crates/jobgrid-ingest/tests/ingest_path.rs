//! End-to-end single-record ingestion path: crawled HTML through the
//! dedup cascade into the store.

use std::sync::Arc;

use jobgrid_core::Confidence;
use jobgrid_crawl::{extract_from_html, CrawlTarget, LocatorEntry, SelectorType};
use jobgrid_ingest::{DedupConfig, DeduplicationEngine};
use jobgrid_store::{JobStore, MemoryJobStore};

const CAREERS_PAGE: &str = r#"
    <html><body>
      <div class="job"><h3>Senior Backend Engineer</h3><a href="/apply/be">Apply</a> Remote, ship the ingestion stack.</div>
      <div class="job"><h3>Product Designer</h3><a href="/apply/pd">Apply</a> Austin, TX studio team.</div>
    </body></html>
"#;

fn careers_target() -> CrawlTarget {
    CrawlTarget {
        url: "https://careers.acme.dev/jobs".to_string(),
        company: "Acme Corp".to_string(),
        locators: vec![LocatorEntry {
            selector_type: SelectorType::Xpath,
            // Unsupported construct: falls back to the generic selector
            // set and still finds the postings.
            expr: "(//div[@class='job'])[1]".to_string(),
        }],
    }
}

#[tokio::test]
async fn crawled_candidates_flow_through_dedup_into_the_store() {
    let store = Arc::new(MemoryJobStore::new());
    let engine = DeduplicationEngine::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        DedupConfig::default(),
    );

    let candidates = extract_from_html(&careers_target(), CAREERS_PAGE);
    assert_eq!(candidates.len(), 2);

    for candidate in &candidates {
        let (_, verdict) = engine.save(candidate).await.unwrap();
        assert!(!verdict.is_duplicate);
    }
    assert_eq!(store.snapshot().await.len(), 2);

    // Re-crawling the same page is idempotent: same external ids, high
    // confidence duplicates, no new rows.
    let recrawled = extract_from_html(&careers_target(), CAREERS_PAGE);
    for candidate in &recrawled {
        let (_, verdict) = engine.save(candidate).await.unwrap();
        assert!(verdict.is_duplicate);
        assert_eq!(verdict.confidence, Confidence::High);
    }
    assert_eq!(store.snapshot().await.len(), 2);

    let stored = store.snapshot().await;
    assert!(stored.iter().all(|r| !r.title_normalized.is_empty()));
    assert!(stored.iter().all(|r| !r.content_hash.is_empty()));
}
