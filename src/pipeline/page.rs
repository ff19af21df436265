//! Per-page indexing step.
//!
//! State machine per page: `unseen → processing → {completed, error}`.
//!
//! The record is upserted to `processing` *before* the gateway call so that
//! a crash mid-call leaves visible, queryable evidence of an incomplete page
//! rather than silence. Whatever happens afterwards, the page ends in a
//! terminal record: success writes `completed` with the extraction and
//! timestamp, any failure writes `error`. Failures are reported as data
//! ([`PageOutcome::Failed`]) — never as `Err` — so one bad page cannot
//! abort the document run.

use crate::error::{GatewayError, StoreError};
use crate::gateway::PageAnalyzer;
use crate::records::{Page, RecordStatus};
use crate::store::IndexStore;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// What happened to one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page already had a `completed` record; the gateway was not
    /// called. Re-runs of the coordinator resume through these.
    Skipped,
    /// Analyzed and persisted as `completed`.
    Completed,
    /// Persisted as `error`. `rate_limited` tells the coordinator to pause
    /// longer before the next page instead of aborting.
    Failed { rate_limited: bool },
}

impl PageOutcome {
    /// Skips count as successes in the run tally, as do completions.
    pub fn is_success(&self) -> bool {
        !matches!(self, PageOutcome::Failed { .. })
    }
}

#[derive(Debug, Error)]
enum PageFailure {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run the per-page state machine for one page.
///
/// Guarantee: regardless of outcome, the page's record is in a terminal
/// state when this returns — on failure the `error` upsert happens before
/// the outcome is reported, and a store failure while writing it is logged
/// rather than propagated (there is nowhere better to put it).
pub async fn index_page(
    store: &dyn IndexStore,
    analyzer: &dyn PageAnalyzer,
    book_id: &str,
    page: &Page,
) -> PageOutcome {
    match try_index_page(store, analyzer, book_id, page).await {
        Ok(outcome) => outcome,
        Err(failure) => {
            let rate_limited = matches!(failure, PageFailure::Gateway(GatewayError::RateLimited));
            warn!(
                "page {} of book {book_id} failed: {failure}",
                page.page_number
            );
            if let Err(e) = store.mark_error(book_id, page).await {
                error!(
                    "could not record error state for page {} of book {book_id}: {e}",
                    page.page_number
                );
            }
            PageOutcome::Failed { rate_limited }
        }
    }
}

async fn try_index_page(
    store: &dyn IndexStore,
    analyzer: &dyn PageAnalyzer,
    book_id: &str,
    page: &Page,
) -> Result<PageOutcome, PageFailure> {
    // Idempotence: completed pages are never re-sent to the gateway.
    if let Some(existing) = store.record(book_id, &page.id).await? {
        if existing.index_status == RecordStatus::Completed {
            debug!(
                "page {} of book {book_id} already indexed, skipping",
                page.page_number
            );
            return Ok(PageOutcome::Skipped);
        }
    }

    store.mark_processing(book_id, page).await?;

    let extraction = analyzer.analyze_page(page.analysis_url()).await?;

    store
        .save_extraction(book_id, page, &extraction, Utc::now())
        .await?;
    debug!(
        "page {} of book {book_id} indexed ({} chars extracted)",
        page.page_number,
        extraction.extracted_text.len()
    );
    Ok(PageOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{DocumentStatus, PageExtraction};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted analyzer: counts calls and answers from a fixed result.
    struct ScriptedAnalyzer {
        calls: AtomicUsize,
        response: Result<PageExtraction, fn() -> GatewayError>,
    }

    impl ScriptedAnalyzer {
        fn ok(extraction: PageExtraction) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: Ok(extraction),
            }
        }

        fn failing(make: fn() -> GatewayError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: Err(make),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageAnalyzer for ScriptedAnalyzer {
        async fn analyze_page(&self, _url: &str) -> Result<PageExtraction, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(e) => Ok(e.clone()),
                Err(make) => Err(make()),
            }
        }

        async fn classify_page(
            &self,
            _url: &str,
            page_index: usize,
        ) -> Result<crate::records::DetectionResult, GatewayError> {
            Ok(crate::records::DetectionResult::unknown(page_index))
        }
    }

    fn page(n: u32) -> Page {
        Page {
            id: format!("p{n}"),
            book_id: "b".into(),
            page_number: n,
            image_url: format!("https://cdn/{n}.jpg"),
            thumbnail_url: None,
        }
    }

    fn store_with_page(n: u32) -> MemoryStore {
        let store = MemoryStore::new();
        store.add_book("b", DocumentStatus::NotIndexed);
        store.add_page(page(n));
        store
    }

    #[tokio::test]
    async fn success_writes_completed_record() {
        let store = store_with_page(1);
        let analyzer = ScriptedAnalyzer::ok(PageExtraction {
            extracted_text: "text".into(),
            ..Default::default()
        });

        let outcome = index_page(&store, &analyzer, "b", &page(1)).await;
        assert_eq!(outcome, PageOutcome::Completed);

        let rec = store.record("b", "p1").await.unwrap().unwrap();
        assert_eq!(rec.index_status, RecordStatus::Completed);
        assert!(rec.indexed_at.is_some());
        assert_eq!(rec.extraction.extracted_text, "text");
    }

    #[tokio::test]
    async fn completed_page_is_skipped_without_a_gateway_call() {
        let store = store_with_page(1);
        let analyzer = ScriptedAnalyzer::ok(PageExtraction::default());
        let p = page(1);

        assert_eq!(index_page(&store, &analyzer, "b", &p).await, PageOutcome::Completed);
        assert_eq!(index_page(&store, &analyzer, "b", &p).await, PageOutcome::Skipped);
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test]
    async fn gateway_failure_leaves_terminal_error_record() {
        let store = store_with_page(1);
        let analyzer = ScriptedAnalyzer::failing(|| GatewayError::Api {
            status: 500,
            detail: "boom".into(),
        });

        let outcome = index_page(&store, &analyzer, "b", &page(1)).await;
        assert_eq!(outcome, PageOutcome::Failed { rate_limited: false });

        let rec = store.record("b", "p1").await.unwrap().unwrap();
        assert_eq!(rec.index_status, RecordStatus::Error);
        assert!(rec.index_status.is_terminal());
    }

    #[tokio::test]
    async fn rate_limit_is_signalled_upward() {
        let store = store_with_page(1);
        let analyzer = ScriptedAnalyzer::failing(|| GatewayError::RateLimited);

        let outcome = index_page(&store, &analyzer, "b", &page(1)).await;
        assert_eq!(outcome, PageOutcome::Failed { rate_limited: true });
    }

    #[tokio::test]
    async fn error_record_is_retried_on_rerun() {
        // Only `completed` blocks a re-run; `error` pages get another shot.
        let store = store_with_page(1);
        let failing = ScriptedAnalyzer::failing(|| GatewayError::RateLimited);
        let p = page(1);
        index_page(&store, &failing, "b", &p).await;

        let succeeding = ScriptedAnalyzer::ok(PageExtraction::default());
        let outcome = index_page(&store, &succeeding, "b", &p).await;
        assert_eq!(outcome, PageOutcome::Completed);
        assert_eq!(succeeding.calls(), 1);
    }
}
