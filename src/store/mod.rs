//! Persistence seams for the pipeline.
//!
//! The pipeline talks to storage through the [`IndexStore`] trait so the
//! coordinator and page indexer never know which backend holds the
//! catalogue. Two implementations ship:
//!
//! * [`SqliteStore`] — the production backend; a single bundled-sqlite file
//!   with a UNIQUE constraint on `(book_id, page_id)` and native upserts.
//! * [`MemoryStore`] — an in-process map for tests and embedders.
//!
//! ## Contract
//!
//! * `pages_in_range` returns pages ordered by `page_number` ascending —
//!   that ordering *is* the processing order guarantee.
//! * All record writes upsert on `(book_id, page_id)`: at most one record
//!   per page, ever.
//! * `mark_processing` and `mark_error` must leave previously-extracted
//!   fields untouched so a failed re-run does not wipe an earlier partial
//!   extraction.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::records::{Document, DocumentStatus, IndexRecord, Page, PageExtraction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage operations the indexing pipeline needs. Object-safe; the server
/// holds an `Arc<dyn IndexStore>`.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Set the document-level indexing status. Unknown books are a no-op,
    /// matching a keyed UPDATE.
    async fn set_index_status(
        &self,
        book_id: &str,
        status: DocumentStatus,
    ) -> Result<(), StoreError>;

    /// Current document-level status, `None` for an unknown book.
    async fn index_status(&self, book_id: &str) -> Result<Option<DocumentStatus>, StoreError>;

    /// The catalogue row for one book (title and status), `None` for an
    /// unknown book.
    async fn book(&self, book_id: &str) -> Result<Option<Document>, StoreError>;

    /// Pages of a book with `start_page <= page_number <= end_page`
    /// (either bound optional), ordered by `page_number` ascending.
    async fn pages_in_range(
        &self,
        book_id: &str,
        start_page: Option<u32>,
        end_page: Option<u32>,
    ) -> Result<Vec<Page>, StoreError>;

    /// The index record for one page, if any exists yet.
    async fn record(&self, book_id: &str, page_id: &str)
        -> Result<Option<IndexRecord>, StoreError>;

    /// Upsert the record into `processing` before the gateway call, so a
    /// crash mid-call leaves queryable evidence rather than silence.
    async fn mark_processing(&self, book_id: &str, page: &Page) -> Result<(), StoreError>;

    /// Upsert the completed extraction; sets `indexed_at`.
    async fn save_extraction(
        &self,
        book_id: &str,
        page: &Page,
        extraction: &PageExtraction,
        indexed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Upsert the record into `error`, leaving extraction fields as they
    /// were.
    async fn mark_error(&self, book_id: &str, page: &Page) -> Result<(), StoreError>;

    /// All records for a book, ordered by `page_number` ascending.
    async fn records_for_book(&self, book_id: &str) -> Result<Vec<IndexRecord>, StoreError>;
}
