//! Core data model for the indexing and detection pipelines.
//!
//! Three kinds of state live here:
//!
//! * **Catalogue input** — [`Page`] rows are read-only input for the pipeline;
//!   they carry the image URLs the gateway analyses.
//! * **Indexing output** — [`IndexRecord`] is the persisted per-page result.
//!   Exactly one record exists per `(book_id, page_id)`; the store enforces
//!   that pair as its upsert key.
//! * **Detection output** — [`DetectionResult`] is transient, cached only for
//!   the lifetime of a [`crate::detect::DetectionSession`], never persisted.
//!
//! Wire casing is part of the contract: indexing fields are snake_case,
//! detection fields are camelCase (the reader UI consumes them directly).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Document ─────────────────────────────────────────────────────────────

/// Document-level indexing status, mutated only by the coordinator at the
/// start and end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// No indexing run has ever been started.
    #[default]
    NotIndexed,
    /// A run is (or appears to be) in progress.
    ///
    /// A document stuck in this state with no progressing records is the
    /// soft-failure signature of a run that died while loading its page
    /// list; re-triggering the run is the recovery path.
    Indexing,
    /// At least one targeted page reached a terminal record state and not
    /// every page failed.
    Indexed,
    /// Every targeted page ended in error.
    Error,
}

impl DocumentStatus {
    /// Stable string form used in the database and in API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::NotIndexed => "not_indexed",
            DocumentStatus::Indexing => "indexing",
            DocumentStatus::Indexed => "indexed",
            DocumentStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_indexed" => Some(DocumentStatus::NotIndexed),
            "indexing" => Some(DocumentStatus::Indexing),
            "indexed" => Some(DocumentStatus::Indexed),
            "error" => Some(DocumentStatus::Error),
            _ => None,
        }
    }
}

/// A scanned book in the catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: Option<String>,
    pub index_status: DocumentStatus,
}

// ── Page ─────────────────────────────────────────────────────────────────

/// One scanned page of a document. Read-only input for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub book_id: String,
    /// 1-based, unique within a book; defines processing order.
    pub page_number: u32,
    pub image_url: String,
    pub thumbnail_url: Option<String>,
}

impl Page {
    /// URL handed to the gateway: the thumbnail when one exists (smaller,
    /// faster for the remote fetch), the full image otherwise.
    pub fn analysis_url(&self) -> &str {
        self.thumbnail_url.as_deref().unwrap_or(&self.image_url)
    }
}

// ── Index records ────────────────────────────────────────────────────────

/// Per-page record status: `processing → {completed, error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Processing,
    Completed,
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Processing => "processing",
            RecordStatus::Completed => "completed",
            RecordStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(RecordStatus::Processing),
            "completed" => Some(RecordStatus::Completed),
            "error" => Some(RecordStatus::Error),
            _ => None,
        }
    }

    /// Terminal states survive re-runs; `processing` does not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecordStatus::Processing)
    }
}

/// Structured OCR output for one page, as extracted by the gateway.
///
/// Every field tolerates absence: a degraded parse produces an extraction
/// with only `extracted_text` populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageExtraction {
    #[serde(default)]
    pub extracted_text: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub chapter_title: Option<String>,
    #[serde(default)]
    pub summary: String,
}

/// The persisted per-page indexing result.
///
/// Invariant: at most one record exists per `(book_id, page_id)` — the store
/// upserts on that pair. `indexed_at` is set only when the record reaches
/// `completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub book_id: String,
    pub page_id: String,
    /// Denormalised copy of the page number for sorting and reporting.
    pub page_number: u32,
    #[serde(flatten)]
    pub extraction: PageExtraction,
    pub index_status: RecordStatus,
    pub indexed_at: Option<DateTime<Utc>>,
}

// ── Detection results ────────────────────────────────────────────────────

/// Classification of a page image by the detection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
    Numbered,
    Cover,
    Blank,
    #[default]
    Unknown,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Numbered => "numbered",
            PageType::Cover => "cover",
            PageType::Blank => "blank",
            PageType::Unknown => "unknown",
        }
    }
}

/// Result of classifying a single page image.
///
/// Transient: cached in a session, never written to the store. CamelCase on
/// the wire — the reader UI consumes this object verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    /// 0-based position in the reader's page list, echoed back from the
    /// request so out-of-order consumers can correlate.
    pub page_index: usize,
    /// The printed page number as it appears on the page ("1", "iv", …).
    pub detected_page_number: Option<String>,
    pub page_type: PageType,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
}

impl DetectionResult {
    /// The all-unknown fallback returned when the model output cannot be
    /// parsed. Parsing failure is never an error at this layer.
    pub fn unknown(page_index: usize) -> Self {
        Self {
            page_index,
            detected_page_number: None,
            page_type: PageType::Unknown,
            confidence: 0.0,
        }
    }
}

/// How the reader should present one page, derived from a cached
/// [`DetectionResult`] or its absence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDisplayInfo {
    /// Human-readable page label; the printed number when detected, the
    /// 1-based position otherwise.
    pub display_number: String,
    /// Cover and blank pages are hidden from the main reading view.
    pub should_hide: bool,
    pub is_detected: bool,
    pub page_type: PageType,
}

impl PageDisplayInfo {
    /// Pure derivation: unseen pages default to their 1-based position and
    /// are never hidden.
    pub fn derive(page_index: usize, detection: Option<&DetectionResult>) -> Self {
        match detection {
            None => Self {
                display_number: (page_index + 1).to_string(),
                should_hide: false,
                is_detected: false,
                page_type: PageType::Unknown,
            },
            Some(d) => Self {
                display_number: d
                    .detected_page_number
                    .clone()
                    .unwrap_or_else(|| (page_index + 1).to_string()),
                should_hide: matches!(d.page_type, PageType::Cover | PageType::Blank),
                is_detected: true,
                page_type: d.page_type,
            },
        }
    }
}
