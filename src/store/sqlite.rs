//! SQLite-backed [`IndexStore`].
//!
//! One bundled-sqlite file holds the whole catalogue: `books`,
//! `book_pages`, and the `book_page_index` results table whose primary key
//! `(book_id, page_id)` carries the at-most-one-record-per-page invariant.
//! Upserts use native `ON CONFLICT ... DO UPDATE` so partial writes
//! (`mark_processing`, `mark_error`) only touch the status column and leave
//! earlier extractions in place.
//!
//! The connection sits behind a `std::sync::Mutex`: the pipeline is strictly
//! sequential by design, every statement here is point-sized, and sqlite
//! itself serialises writers anyway, so a pool would buy nothing.

use crate::error::StoreError;
use crate::records::{Document, DocumentStatus, IndexRecord, Page, PageExtraction, RecordStatus};
use crate::store::IndexStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS books (
    id           TEXT PRIMARY KEY,
    title        TEXT,
    index_status TEXT NOT NULL DEFAULT 'not_indexed'
);

CREATE TABLE IF NOT EXISTS book_pages (
    id            TEXT PRIMARY KEY,
    book_id       TEXT NOT NULL REFERENCES books(id),
    page_number   INTEGER NOT NULL,
    image_url     TEXT NOT NULL,
    thumbnail_url TEXT,
    UNIQUE (book_id, page_number)
);

CREATE TABLE IF NOT EXISTS book_page_index (
    book_id        TEXT NOT NULL,
    page_id        TEXT NOT NULL,
    page_number    INTEGER NOT NULL,
    extracted_text TEXT NOT NULL DEFAULT '',
    topics         TEXT NOT NULL DEFAULT '[]',
    keywords       TEXT NOT NULL DEFAULT '[]',
    chapter_title  TEXT,
    summary        TEXT NOT NULL DEFAULT '',
    index_status   TEXT NOT NULL,
    indexed_at     TEXT,
    PRIMARY KEY (book_id, page_id)
);

CREATE INDEX IF NOT EXISTS idx_book_pages_order
    ON book_pages (book_id, page_number);
"#;

/// File-backed catalogue store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or update a catalogue book. Seeding helper for operators and
    /// tests; the pipeline itself only ever updates `index_status`.
    pub fn upsert_book(&self, book_id: &str, title: Option<&str>) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO books (id, title) VALUES (?1, ?2)
             ON CONFLICT (id) DO UPDATE SET title = excluded.title",
            params![book_id, title],
        )?;
        Ok(())
    }

    /// Insert or replace a page row.
    pub fn upsert_page(&self, page: &Page) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO book_pages (id, book_id, page_number, image_url, thumbnail_url)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (id) DO UPDATE SET
                 page_number   = excluded.page_number,
                 image_url     = excluded.image_url,
                 thumbnail_url = excluded.thumbnail_url",
            params![
                page.id,
                page.book_id,
                page.page_number,
                page.image_url,
                page.thumbnail_url
            ],
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means a panic mid-statement; continuing is safe
        // because every statement here is a single autocommit write.
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<IndexRecord> {
    let topics_json: String = row.get("topics")?;
    let keywords_json: String = row.get("keywords")?;
    let status: String = row.get("index_status")?;
    let indexed_at: Option<String> = row.get("indexed_at")?;
    Ok(IndexRecord {
        book_id: row.get("book_id")?,
        page_id: row.get("page_id")?,
        page_number: row.get("page_number")?,
        extraction: PageExtraction {
            extracted_text: row.get("extracted_text")?,
            topics: decode_list(&topics_json, "topics"),
            keywords: decode_list(&keywords_json, "keywords"),
            chapter_title: row.get("chapter_title")?,
            summary: row.get("summary")?,
        },
        index_status: RecordStatus::parse(&status).unwrap_or(RecordStatus::Error),
        indexed_at: indexed_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        }),
    })
}

/// Decode a JSON string-list column, logging and skipping garbage rather
/// than failing the whole row.
fn decode_list(json: &str, column: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_else(|e| {
        warn!("undecodable {column} column ({e}), treating as empty");
        Vec::new()
    })
}

fn row_to_page(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        id: row.get("id")?,
        book_id: row.get("book_id")?,
        page_number: row.get("page_number")?,
        image_url: row.get("image_url")?,
        thumbnail_url: row.get("thumbnail_url")?,
    })
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn set_index_status(
        &self,
        book_id: &str,
        status: DocumentStatus,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE books SET index_status = ?2 WHERE id = ?1",
            params![book_id, status.as_str()],
        )?;
        Ok(())
    }

    async fn index_status(&self, book_id: &str) -> Result<Option<DocumentStatus>, StoreError> {
        let conn = self.lock();
        let status: Option<String> = conn
            .query_row(
                "SELECT index_status FROM books WHERE id = ?1",
                params![book_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status.as_deref().and_then(DocumentStatus::parse))
    }

    async fn book(&self, book_id: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.lock();
        let doc = conn
            .query_row(
                "SELECT id, title, index_status FROM books WHERE id = ?1",
                params![book_id],
                |row| {
                    let status: String = row.get(2)?;
                    Ok(Document {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        index_status: DocumentStatus::parse(&status).unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(doc)
    }

    async fn pages_in_range(
        &self,
        book_id: &str,
        start_page: Option<u32>,
        end_page: Option<u32>,
    ) -> Result<Vec<Page>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, book_id, page_number, image_url, thumbnail_url
             FROM book_pages
             WHERE book_id = ?1
               AND (?2 IS NULL OR page_number >= ?2)
               AND (?3 IS NULL OR page_number <= ?3)
             ORDER BY page_number ASC",
        )?;
        let pages = stmt
            .query_map(params![book_id, start_page, end_page], row_to_page)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pages)
    }

    async fn record(
        &self,
        book_id: &str,
        page_id: &str,
    ) -> Result<Option<IndexRecord>, StoreError> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT * FROM book_page_index WHERE book_id = ?1 AND page_id = ?2",
                params![book_id, page_id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    async fn mark_processing(&self, book_id: &str, page: &Page) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO book_page_index (book_id, page_id, page_number, index_status)
             VALUES (?1, ?2, ?3, 'processing')
             ON CONFLICT (book_id, page_id) DO UPDATE SET
                 page_number  = excluded.page_number,
                 index_status = 'processing'",
            params![book_id, page.id, page.page_number],
        )?;
        Ok(())
    }

    async fn save_extraction(
        &self,
        book_id: &str,
        page: &Page,
        extraction: &PageExtraction,
        indexed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let topics = serde_json::to_string(&extraction.topics)
            .map_err(|e| StoreError::Other(format!("encoding topics: {e}")))?;
        let keywords = serde_json::to_string(&extraction.keywords)
            .map_err(|e| StoreError::Other(format!("encoding keywords: {e}")))?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO book_page_index
                 (book_id, page_id, page_number, extracted_text, topics, keywords,
                  chapter_title, summary, index_status, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'completed', ?9)
             ON CONFLICT (book_id, page_id) DO UPDATE SET
                 page_number    = excluded.page_number,
                 extracted_text = excluded.extracted_text,
                 topics         = excluded.topics,
                 keywords       = excluded.keywords,
                 chapter_title  = excluded.chapter_title,
                 summary        = excluded.summary,
                 index_status   = 'completed',
                 indexed_at     = excluded.indexed_at",
            params![
                book_id,
                page.id,
                page.page_number,
                extraction.extracted_text,
                topics,
                keywords,
                extraction.chapter_title,
                extraction.summary,
                indexed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn mark_error(&self, book_id: &str, page: &Page) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO book_page_index (book_id, page_id, page_number, index_status)
             VALUES (?1, ?2, ?3, 'error')
             ON CONFLICT (book_id, page_id) DO UPDATE SET
                 page_number  = excluded.page_number,
                 index_status = 'error'",
            params![book_id, page.id, page.page_number],
        )?;
        Ok(())
    }

    async fn records_for_book(&self, book_id: &str) -> Result<Vec<IndexRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM book_page_index WHERE book_id = ?1 ORDER BY page_number ASC",
        )?;
        let records = stmt
            .query_map(params![book_id], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(book: &str, n: u32) -> Page {
        Page {
            id: format!("{book}-p{n}"),
            book_id: book.to_string(),
            page_number: n,
            image_url: format!("https://cdn/{book}/{n}.jpg"),
            thumbnail_url: Some(format!("https://cdn/{book}/{n}-thumb.jpg")),
        }
    }

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_book("b1", Some("Biology 101")).unwrap();
        for n in 1..=5 {
            store.upsert_page(&page("b1", n)).unwrap();
        }
        store
    }

    #[tokio::test]
    async fn status_round_trip() {
        let store = seeded_store();
        assert_eq!(
            store.index_status("b1").await.unwrap(),
            Some(DocumentStatus::NotIndexed)
        );
        store
            .set_index_status("b1", DocumentStatus::Indexing)
            .await
            .unwrap();
        assert_eq!(
            store.index_status("b1").await.unwrap(),
            Some(DocumentStatus::Indexing)
        );
        assert_eq!(store.index_status("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn book_lookup_carries_title_and_status() {
        let store = seeded_store();
        let doc = store.book("b1").await.unwrap().unwrap();
        assert_eq!(doc.id, "b1");
        assert_eq!(doc.title.as_deref(), Some("Biology 101"));
        assert_eq!(doc.index_status, DocumentStatus::NotIndexed);
        assert!(store.book("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pages_in_range_honours_bounds_and_order() {
        let store = seeded_store();
        let all = store.pages_in_range("b1", None, None).await.unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].page_number < w[1].page_number));

        let mid = store
            .pages_in_range("b1", Some(2), Some(4))
            .await
            .unwrap();
        let numbers: Vec<u32> = mid.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![2, 3, 4]);

        let tail = store.pages_in_range("b1", Some(4), None).await.unwrap();
        assert_eq!(tail.len(), 2);
    }

    #[tokio::test]
    async fn upsert_keeps_one_record_per_page() {
        let store = seeded_store();
        let p = page("b1", 1);
        store.mark_processing("b1", &p).await.unwrap();
        let extraction = PageExtraction {
            extracted_text: "photosynthesis".into(),
            topics: vec!["Biology".into()],
            keywords: vec!["chlorophyll".into(), "light".into()],
            chapter_title: Some("Chapter 1".into()),
            summary: "Plants make food.".into(),
        };
        store
            .save_extraction("b1", &p, &extraction, Utc::now())
            .await
            .unwrap();

        let records = store.records_for_book("b1").await.unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.index_status, RecordStatus::Completed);
        assert_eq!(rec.extraction, extraction);
        assert!(rec.indexed_at.is_some());
    }

    #[tokio::test]
    async fn mark_error_preserves_extraction_fields() {
        let store = seeded_store();
        let p = page("b1", 2);
        let extraction = PageExtraction {
            extracted_text: "kept".into(),
            ..Default::default()
        };
        store
            .save_extraction("b1", &p, &extraction, Utc::now())
            .await
            .unwrap();
        store.mark_error("b1", &p).await.unwrap();

        let rec = store.record("b1", &p.id).await.unwrap().unwrap();
        assert_eq!(rec.index_status, RecordStatus::Error);
        assert_eq!(rec.extraction.extracted_text, "kept");
    }

    #[tokio::test]
    async fn records_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.db");
        let p = page("b1", 1);
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert_book("b1", None).unwrap();
            store.upsert_page(&p).unwrap();
            store
                .save_extraction(
                    "b1",
                    &p,
                    &PageExtraction {
                        extracted_text: "persisted".into(),
                        ..Default::default()
                    },
                    Utc::now(),
                )
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let rec = store.record("b1", &p.id).await.unwrap().unwrap();
        assert_eq!(rec.extraction.extracted_text, "persisted");
        assert_eq!(rec.index_status, RecordStatus::Completed);
    }

    #[tokio::test]
    async fn indexed_at_survives_the_round_trip() {
        let store = seeded_store();
        let p = page("b1", 3);
        let when = Utc::now();
        store
            .save_extraction("b1", &p, &PageExtraction::default(), when)
            .await
            .unwrap();
        let rec = store.record("b1", &p.id).await.unwrap().unwrap();
        let stored = rec.indexed_at.unwrap();
        assert!((stored - when).num_seconds().abs() < 1);
    }
}
