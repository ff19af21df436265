//! In-process store for tests and embedders.

use crate::error::StoreError;
use crate::records::{Document, DocumentStatus, IndexRecord, Page, PageExtraction, RecordStatus};
use crate::store::IndexStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    documents: HashMap<String, Document>,
    pages: Vec<Page>,
    /// Keyed by (book_id, page_id) — the same uniqueness the sqlite schema
    /// enforces with its primary key.
    records: HashMap<(String, String), IndexRecord>,
}

/// A `HashMap`-backed [`IndexStore`]. Cheap to construct, no I/O, fully
/// deterministic — the integration suite runs the whole pipeline against it.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a book with the given status.
    pub fn add_book(&self, book_id: impl Into<String>, status: DocumentStatus) {
        let id = book_id.into();
        self.lock().documents.insert(
            id.clone(),
            Document {
                id,
                title: None,
                index_status: status,
            },
        );
    }

    /// Seed a page. Pages may be added in any order; reads sort.
    pub fn add_page(&self, page: Page) {
        self.lock().pages.push(page);
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn set_index_status(
        &self,
        book_id: &str,
        status: DocumentStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.documents.get_mut(book_id) {
            existing.index_status = status;
        }
        Ok(())
    }

    async fn index_status(&self, book_id: &str) -> Result<Option<DocumentStatus>, StoreError> {
        Ok(self.lock().documents.get(book_id).map(|d| d.index_status))
    }

    async fn book(&self, book_id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.lock().documents.get(book_id).cloned())
    }

    async fn pages_in_range(
        &self,
        book_id: &str,
        start_page: Option<u32>,
        end_page: Option<u32>,
    ) -> Result<Vec<Page>, StoreError> {
        let inner = self.lock();
        let mut pages: Vec<Page> = inner
            .pages
            .iter()
            .filter(|p| p.book_id == book_id)
            .filter(|p| start_page.is_none_or(|s| p.page_number >= s))
            .filter(|p| end_page.is_none_or(|e| p.page_number <= e))
            .cloned()
            .collect();
        pages.sort_by_key(|p| p.page_number);
        Ok(pages)
    }

    async fn record(
        &self,
        book_id: &str,
        page_id: &str,
    ) -> Result<Option<IndexRecord>, StoreError> {
        Ok(self
            .lock()
            .records
            .get(&(book_id.to_string(), page_id.to_string()))
            .cloned())
    }

    async fn mark_processing(&self, book_id: &str, page: &Page) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let key = (book_id.to_string(), page.id.clone());
        inner
            .records
            .entry(key)
            .and_modify(|r| {
                r.page_number = page.page_number;
                r.index_status = RecordStatus::Processing;
            })
            .or_insert_with(|| IndexRecord {
                book_id: book_id.to_string(),
                page_id: page.id.clone(),
                page_number: page.page_number,
                extraction: PageExtraction::default(),
                index_status: RecordStatus::Processing,
                indexed_at: None,
            });
        Ok(())
    }

    async fn save_extraction(
        &self,
        book_id: &str,
        page: &Page,
        extraction: &PageExtraction,
        indexed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let key = (book_id.to_string(), page.id.clone());
        inner.records.insert(
            key,
            IndexRecord {
                book_id: book_id.to_string(),
                page_id: page.id.clone(),
                page_number: page.page_number,
                extraction: extraction.clone(),
                index_status: RecordStatus::Completed,
                indexed_at: Some(indexed_at),
            },
        );
        Ok(())
    }

    async fn mark_error(&self, book_id: &str, page: &Page) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let key = (book_id.to_string(), page.id.clone());
        inner
            .records
            .entry(key)
            .and_modify(|r| {
                r.page_number = page.page_number;
                r.index_status = RecordStatus::Error;
            })
            .or_insert_with(|| IndexRecord {
                book_id: book_id.to_string(),
                page_id: page.id.clone(),
                page_number: page.page_number,
                extraction: PageExtraction::default(),
                index_status: RecordStatus::Error,
                indexed_at: None,
            });
        Ok(())
    }

    async fn records_for_book(&self, book_id: &str) -> Result<Vec<IndexRecord>, StoreError> {
        let inner = self.lock();
        let mut records: Vec<IndexRecord> = inner
            .records
            .values()
            .filter(|r| r.book_id == book_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.page_number);
        Ok(records)
    }
}
