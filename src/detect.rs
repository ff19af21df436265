//! Interactive page-classification pipeline.
//!
//! The sibling of the server-side indexing run: classify a reader's pages
//! as numbered/cover/blank so the UI can hide covers and show printed page
//! labels. It differs from the indexing pipeline in exactly the ways user
//! interaction demands — results are cached per session instead of
//! persisted, the batch is cancelable between pages, and progress is
//! reported as it happens.
//!
//! ## Cancellation
//!
//! Cooperative: the flag is checked before each page's request starts. A
//! request already in flight is never interrupted, but no further pages are
//! started, and `is_detecting` drops to false the instant
//! [`DetectionSession::cancel`] is called regardless of in-flight work.
//!
//! ## Cache lifetime
//!
//! The cache belongs to the session object, which belongs to one book. Drop
//! the session (reader navigated away) and the cache goes with it — there
//! is deliberately no process-global detection state.

use crate::config::IndexerConfig;
use crate::error::GatewayError;
use crate::gateway::PageAnalyzer;
use crate::records::{DetectionResult, PageDisplayInfo, PageType};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// One page the reader wants classified.
#[derive(Debug, Clone)]
pub struct PageRef {
    /// 0-based position in the reader's page list.
    pub page_index: usize,
    pub image_url: String,
}

/// Counts surfaced to the user when a batch finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionSummary {
    pub numbered: usize,
    pub cover: usize,
    pub blank: usize,
}

/// Callback for detection events. All methods default to no-ops so callers
/// only override what they care about; implementations must be `Send + Sync`.
pub trait DetectionObserver: Send + Sync {
    /// A page was freshly classified. Cache hits do not fire this.
    fn on_page_detected(&self, result: &DetectionResult) {
        let _ = result;
    }

    /// Batch progress advanced, in whole percent (0–100).
    fn on_progress(&self, percent: u8) {
        let _ = percent;
    }

    /// The batch finished (or was cancelled part-way).
    fn on_complete(&self, summary: &DetectionSummary) {
        let _ = summary;
    }
}

/// The default observer: silence.
pub struct NoopObserver;

impl DetectionObserver for NoopObserver {}

/// Cancels a running batch from outside the session, e.g. a UI button.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    detecting: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Stop starting new pages. Takes effect at the next page boundary;
    /// `is_detecting` turns false immediately.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.detecting.store(false, Ordering::SeqCst);
    }
}

/// A per-book detection session: cache, cancellation, progress, and the
/// detected-pages map that display info derives from.
pub struct DetectionSession {
    analyzer: Arc<dyn PageAnalyzer>,
    config: IndexerConfig,
    book_id: String,
    observer: Arc<dyn DetectionObserver>,
    cache: Mutex<HashMap<usize, DetectionResult>>,
    detected: Mutex<HashMap<usize, DetectionResult>>,
    cancelled: Arc<AtomicBool>,
    detecting: Arc<AtomicBool>,
    progress: AtomicU8,
}

impl DetectionSession {
    pub fn new(
        analyzer: Arc<dyn PageAnalyzer>,
        config: IndexerConfig,
        book_id: impl Into<String>,
    ) -> Self {
        Self::with_observer(analyzer, config, book_id, Arc::new(NoopObserver))
    }

    pub fn with_observer(
        analyzer: Arc<dyn PageAnalyzer>,
        config: IndexerConfig,
        book_id: impl Into<String>,
        observer: Arc<dyn DetectionObserver>,
    ) -> Self {
        Self {
            analyzer,
            config,
            book_id: book_id.into(),
            observer,
            cache: Mutex::new(HashMap::new()),
            detected: Mutex::new(HashMap::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            detecting: Arc::new(AtomicBool::new(false)),
            progress: AtomicU8::new(0),
        }
    }

    /// A handle that can cancel this session's running batch.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
            detecting: Arc::clone(&self.detecting),
        }
    }

    /// Classify one page, consulting the session cache first.
    ///
    /// Gateway failures propagate typed, so a caller can still tell a 429
    /// from a 402 from anything else. Nothing is cached on failure; the next
    /// call hits the gateway again.
    pub async fn classify_page(
        &self,
        image_url: &str,
        page_index: usize,
    ) -> Result<DetectionResult, GatewayError> {
        if let Some(hit) = lock(&self.cache).get(&page_index) {
            debug!("detection cache hit for page index {page_index}");
            return Ok(hit.clone());
        }

        let result = self.analyzer.classify_page(image_url, page_index).await?;
        lock(&self.cache).insert(page_index, result.clone());
        lock(&self.detected).insert(page_index, result.clone());
        self.observer.on_page_detected(&result);
        Ok(result)
    }

    /// Batch-mode wrapper over [`classify_page`](Self::classify_page):
    /// failures are swallowed, the page is simply absent from the detected
    /// map (and retried on the next visit), which is all the batch loop
    /// needs to know.
    pub async fn detect_page(
        &self,
        image_url: &str,
        page_index: usize,
    ) -> Option<DetectionResult> {
        match self.classify_page(image_url, page_index).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(
                    "page detection failed for book {} index {page_index}: {e}",
                    self.book_id
                );
                None
            }
        }
    }

    /// Classify `pages` strictly in list order, one request in flight at a
    /// time, with a courtesy pause between pages (skipped after the last).
    ///
    /// Returns the summary of *this batch*; the session-wide detected map
    /// keeps accumulating across batches.
    pub async fn detect_pages_sequentially(&self, pages: &[PageRef]) -> DetectionSummary {
        if pages.is_empty() {
            return DetectionSummary::default();
        }

        self.detecting.store(true, Ordering::SeqCst);
        self.cancelled.store(false, Ordering::SeqCst);
        self.progress.store(0, Ordering::SeqCst);

        let total = pages.len();
        let mut batch: Vec<DetectionResult> = Vec::new();
        let mut completed = 0usize;

        for page in pages {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("detection cancelled after {completed}/{total} pages");
                break;
            }

            if let Some(result) = self.detect_page(&page.image_url, page.page_index).await {
                batch.push(result);
            }

            completed += 1;
            let percent = ((completed * 100) as f64 / total as f64).round() as u8;
            self.progress.store(percent, Ordering::SeqCst);
            self.observer.on_progress(percent);

            if completed < total {
                sleep(self.config.detection_delay()).await;
            }
        }

        self.detecting.store(false, Ordering::SeqCst);

        let summary = DetectionSummary {
            numbered: count_type(&batch, PageType::Numbered),
            cover: count_type(&batch, PageType::Cover),
            blank: count_type(&batch, PageType::Blank),
        };
        info!(
            "detection summary for book {}: {} numbered, {} cover, {} blank",
            self.book_id, summary.numbered, summary.cover, summary.blank
        );
        self.observer.on_complete(&summary);
        summary
    }

    /// Stop starting new pages; see [`CancelHandle::cancel`].
    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    pub fn is_detecting(&self) -> bool {
        self.detecting.load(Ordering::SeqCst)
    }

    /// Batch progress in whole percent.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    /// The cached classification for a page, if one exists.
    pub fn detection(&self, page_index: usize) -> Option<DetectionResult> {
        lock(&self.detected).get(&page_index).cloned()
    }

    /// Number of pages classified so far in this session.
    pub fn detected_count(&self) -> usize {
        lock(&self.detected).len()
    }

    /// How the reader should present one page. Pure over the detected map:
    /// unseen pages get their 1-based position and are never hidden.
    pub fn page_display_info(&self, page_index: usize) -> PageDisplayInfo {
        PageDisplayInfo::derive(page_index, self.detection(page_index).as_ref())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn count_type(results: &[DetectionResult], ty: PageType) -> usize {
    results.iter().filter(|r| r.page_type == ty).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::records::PageExtraction;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Classifies even indices as numbered and odd as cover; counts calls.
    struct AlternatingAnalyzer {
        calls: AtomicUsize,
    }

    impl AlternatingAnalyzer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PageAnalyzer for AlternatingAnalyzer {
        async fn analyze_page(&self, _url: &str) -> Result<PageExtraction, GatewayError> {
            Ok(PageExtraction::default())
        }

        async fn classify_page(
            &self,
            _url: &str,
            page_index: usize,
        ) -> Result<DetectionResult, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DetectionResult {
                page_index,
                detected_page_number: Some((page_index + 1).to_string()),
                page_type: if page_index % 2 == 0 {
                    PageType::Numbered
                } else {
                    PageType::Cover
                },
                confidence: 1.0,
            })
        }
    }

    fn fast_config() -> IndexerConfig {
        IndexerConfig::builder()
            .api_key("test")
            .detection_delay_ms(0)
            .build()
            .unwrap()
    }

    fn pages(n: usize) -> Vec<PageRef> {
        (0..n)
            .map(|i| PageRef {
                page_index: i,
                image_url: format!("https://cdn/{i}.jpg"),
            })
            .collect()
    }

    #[tokio::test]
    async fn batch_summarizes_and_caches() {
        let analyzer = AlternatingAnalyzer::new();
        let session = DetectionSession::new(analyzer.clone(), fast_config(), "b");

        let summary = session.detect_pages_sequentially(&pages(4)).await;
        assert_eq!(
            summary,
            DetectionSummary {
                numbered: 2,
                cover: 2,
                blank: 0
            }
        );
        assert_eq!(session.detected_count(), 4);
        assert_eq!(session.progress(), 100);
        assert!(!session.is_detecting());

        // Revisiting the same pages costs no further gateway calls.
        session.detect_pages_sequentially(&pages(4)).await;
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn cancel_stops_at_the_next_page_boundary() {
        struct CancelAfterFirst {
            handle: Mutex<Option<CancelHandle>>,
        }
        impl DetectionObserver for CancelAfterFirst {
            fn on_page_detected(&self, _result: &DetectionResult) {
                if let Some(handle) = self.handle.lock().unwrap().as_ref() {
                    handle.cancel();
                }
            }
        }

        let observer = Arc::new(CancelAfterFirst {
            handle: Mutex::new(None),
        });
        let session = DetectionSession::with_observer(
            AlternatingAnalyzer::new(),
            fast_config(),
            "b",
            observer.clone(),
        );
        *observer.handle.lock().unwrap() = Some(session.cancel_handle());

        session.detect_pages_sequentially(&pages(3)).await;

        // Exactly one entry: pages 2 and 3 were never started.
        assert_eq!(session.detected_count(), 1);
        assert!(!session.is_detecting());
    }

    #[tokio::test]
    async fn cancel_flips_is_detecting_immediately() {
        let session = DetectionSession::new(AlternatingAnalyzer::new(), fast_config(), "b");
        session.detecting.store(true, Ordering::SeqCst);
        session.cancel();
        assert!(!session.is_detecting());
    }

    #[tokio::test]
    async fn failures_are_omitted_from_the_map() {
        struct FailingAnalyzer;
        #[async_trait]
        impl PageAnalyzer for FailingAnalyzer {
            async fn analyze_page(&self, _url: &str) -> Result<PageExtraction, GatewayError> {
                Ok(PageExtraction::default())
            }
            async fn classify_page(
                &self,
                _url: &str,
                _page_index: usize,
            ) -> Result<DetectionResult, GatewayError> {
                Err(GatewayError::RateLimited)
            }
        }

        let session = DetectionSession::new(Arc::new(FailingAnalyzer), fast_config(), "b");
        let summary = session.detect_pages_sequentially(&pages(2)).await;
        assert_eq!(summary, DetectionSummary::default());
        assert_eq!(session.detected_count(), 0);
        // Progress still advanced: the batch completed, just with misses.
        assert_eq!(session.progress(), 100);
    }

    #[tokio::test]
    async fn classify_page_propagates_gateway_errors() {
        struct RateLimitedAnalyzer;
        #[async_trait]
        impl PageAnalyzer for RateLimitedAnalyzer {
            async fn analyze_page(&self, _url: &str) -> Result<PageExtraction, GatewayError> {
                Ok(PageExtraction::default())
            }
            async fn classify_page(
                &self,
                _url: &str,
                _page_index: usize,
            ) -> Result<DetectionResult, GatewayError> {
                Err(GatewayError::RateLimited)
            }
        }

        let session = DetectionSession::new(Arc::new(RateLimitedAnalyzer), fast_config(), "b");
        let err = session
            .classify_page("https://cdn/1.jpg", 0)
            .await
            .unwrap_err();
        assert!(err.is_rate_limit());
        // Failures are not cached; the map stays empty.
        assert_eq!(session.detected_count(), 0);
    }

    #[tokio::test]
    async fn display_info_defaults_then_updates() {
        let session = DetectionSession::new(AlternatingAnalyzer::new(), fast_config(), "b");

        let before = session.page_display_info(4);
        assert_eq!(before.display_number, "5");
        assert!(!before.should_hide);
        assert!(!before.is_detected);
        assert_eq!(before.page_type, PageType::Unknown);

        session.detect_page("https://cdn/4.jpg", 4).await;
        let after = session.page_display_info(4);
        assert!(after.is_detected);
        assert_eq!(after.display_number, "5");
        assert_eq!(after.page_type, PageType::Numbered);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let session = DetectionSession::new(AlternatingAnalyzer::new(), fast_config(), "b");
        let summary = session.detect_pages_sequentially(&[]).await;
        assert_eq!(summary, DetectionSummary::default());
        assert!(!session.is_detecting());
    }
}
