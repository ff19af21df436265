//! Whole-document indexing coordinator.
//!
//! A run is split in two halves on purpose:
//!
//! * [`IndexingRun::prepare`] does everything the triggering request needs
//!   an answer for — flips the document to `indexing` and loads the ordered
//!   page list — and fails loudly if it cannot.
//! * [`IndexingRun::execute`] is the long half. The trigger handler spawns
//!   it fire-and-forget and answers immediately with the page count; the
//!   run outlives the request and callers poll record status to observe it.
//!
//! If `prepare` fails after the status flip, the document stays `indexing`
//! with no records progressing. That stuck state is deliberate: it is
//! queryable evidence, and re-triggering the run is the recovery path.

use crate::config::IndexerConfig;
use crate::error::IndexError;
use crate::gateway::PageAnalyzer;
use crate::pipeline::page::{index_page, PageOutcome};
use crate::records::{DocumentStatus, Page};
use crate::store::IndexStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Inclusive page-number bounds for a partial or resumed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
}

impl PageRange {
    /// The whole book.
    pub fn all() -> Self {
        Self::default()
    }
}

/// Tally of one finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// A prepared whole-document run: pages loaded, document flagged
/// `indexing`, ready to [`execute`](IndexingRun::execute).
pub struct IndexingRun {
    store: Arc<dyn IndexStore>,
    analyzer: Arc<dyn PageAnalyzer>,
    config: IndexerConfig,
    book_id: String,
    pages: Vec<Page>,
}

impl IndexingRun {
    /// Flag the document `indexing` and load its pages within `range`,
    /// ordered by page number ascending.
    ///
    /// Nothing guards against a second concurrent run over the same book —
    /// the existing `indexing` status is logged so operators can spot a
    /// double-trigger, but the run proceeds.
    pub async fn prepare(
        store: Arc<dyn IndexStore>,
        analyzer: Arc<dyn PageAnalyzer>,
        config: IndexerConfig,
        book_id: impl Into<String>,
        range: PageRange,
    ) -> Result<Self, IndexError> {
        let book_id = book_id.into();
        info!("starting OCR indexing for book {book_id}");

        if store.index_status(&book_id).await? == Some(DocumentStatus::Indexing) {
            warn!("book {book_id} is already flagged indexing; possible concurrent run");
        }
        store
            .set_index_status(&book_id, DocumentStatus::Indexing)
            .await?;

        let pages = store
            .pages_in_range(&book_id, range.start_page, range.end_page)
            .await
            .map_err(|source| IndexError::PageLoadFailed {
                book_id: book_id.clone(),
                source,
            })?;
        info!("found {} pages to process for book {book_id}", pages.len());

        Ok(Self {
            store,
            analyzer,
            config,
            book_id,
            pages,
        })
    }

    /// Number of pages this run will touch. Reported to the trigger caller
    /// before the run is spawned.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    /// Detach the run from the request lifecycle. The returned handle may
    /// be dropped; the task keeps running.
    pub fn spawn(self) -> tokio::task::JoinHandle<RunSummary> {
        tokio::spawn(self.execute())
    }

    /// Process every loaded page strictly sequentially, then finalize the
    /// document status.
    ///
    /// Pacing: a short pause after each gateway call keeps the run under
    /// the rate limit proactively; a detected 429 stretches the pause
    /// instead of aborting. Skipped pages cost no pause (no call was made),
    /// and neither does the last page.
    pub async fn execute(self) -> RunSummary {
        let total = self.pages.len();
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for (i, page) in self.pages.iter().enumerate() {
            info!(
                "processing page {} ({}/{}) of book {}",
                page.page_number,
                i + 1,
                total,
                self.book_id
            );

            let outcome =
                index_page(self.store.as_ref(), self.analyzer.as_ref(), &self.book_id, page).await;

            let pause = match outcome {
                PageOutcome::Skipped => None,
                PageOutcome::Completed => Some(self.config.page_delay()),
                PageOutcome::Failed { rate_limited: true } => {
                    warn!("rate limited, waiting {:?} before the next page", self.config.rate_limit_delay());
                    Some(self.config.rate_limit_delay())
                }
                PageOutcome::Failed { rate_limited: false } => None,
            };

            if outcome.is_success() {
                succeeded += 1;
            } else {
                failed += 1;
            }

            let is_last = i + 1 == total;
            if !is_last {
                if let Some(pause) = pause {
                    self.pause(pause).await;
                }
            }
        }

        let final_status = if failed == total {
            DocumentStatus::Error
        } else {
            DocumentStatus::Indexed
        };
        if let Err(e) = self
            .store
            .set_index_status(&self.book_id, final_status)
            .await
        {
            error!("could not finalize status for book {}: {e}", self.book_id);
        }

        info!(
            "indexing complete for book {}. success: {succeeded}, errors: {failed}",
            self.book_id
        );
        RunSummary {
            total,
            succeeded,
            failed,
        }
    }

    async fn pause(&self, duration: Duration) {
        sleep(duration).await;
    }
}
