//! # folio-index
//!
//! Resumable, rate-limit-aware OCR indexing for scanned-book pages using
//! vision language models (VLMs).
//!
//! ## Why this crate?
//!
//! Digitised books arrive as page images with no searchable text. This crate
//! walks a book's pages, has a VLM read each image as a human would, and
//! persists a structured index record per page — extracted text, topics,
//! keywords, chapter title, summary. Runs are idempotent and resumable:
//! completed pages are never re-billed, failed pages are retried on the next
//! trigger, and a crash mid-run leaves queryable evidence instead of silence.
//!
//! ## Pipeline Overview
//!
//! ```text
//! trigger
//!  │
//!  ├─ 1. Prepare   flag the book `indexing`, load ordered pages
//!  ├─ 2. Spawn     detach the run; answer the caller with the page count
//!  ├─ 3. Per page  skip-if-completed → processing → VLM call → record
//!  ├─ 4. Pace      800 ms between calls, 5 s after a 429
//!  └─ 5. Finalize  `indexed`, or `error` when every page failed
//! ```
//!
//! A second, interactive pipeline ([`detect`]) classifies pages for a reader
//! UI (printed page number, cover, blank) with per-session caching and
//! cooperative cancellation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folio_index::{
//!     GatewayClient, IndexerConfig, IndexingRun, MemoryStore, PageRange,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IndexerConfig::from_env()?; // AI_GATEWAY_API_KEY
//!     let store = Arc::new(MemoryStore::new());
//!     let analyzer = Arc::new(GatewayClient::new(config.clone())?);
//!
//!     let run = IndexingRun::prepare(store, analyzer, config, "book-1", PageRange::all()).await?;
//!     println!("indexing {} pages", run.page_count());
//!     let summary = run.execute().await;
//!     println!("done: {}/{} succeeded", summary.succeeded, summary.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | HTTP service and the `folio-indexd` binary (axum + clap + anyhow + tracing-subscriber) |
//!
//! Disable `server` when using only the library:
//! ```toml
//! folio-index = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod detect;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod prompts;
pub mod records;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IndexerConfig, IndexerConfigBuilder, DEFAULT_GATEWAY_URL, DEFAULT_MODEL};
pub use detect::{
    CancelHandle, DetectionObserver, DetectionSession, DetectionSummary, NoopObserver, PageRef,
};
pub use error::{GatewayError, IndexError, StoreError};
pub use gateway::{GatewayClient, PageAnalyzer};
pub use pipeline::{index_page, IndexingRun, PageOutcome, PageRange, RunSummary};
pub use records::{
    DetectionResult, Document, DocumentStatus, IndexRecord, Page, PageDisplayInfo, PageExtraction,
    PageType, RecordStatus,
};
pub use store::{IndexStore, MemoryStore, SqliteStore};
