//! The document indexing pipeline.
//!
//! Two layers, one job: walk a book's pages and leave a terminal
//! [`crate::records::IndexRecord`] behind for every one of them.
//!
//! ```text
//! trigger ──▶ IndexingRun::prepare ──▶ execute ──▶ index_page ──▶ gateway
//! (HTTP)      (status=indexing,        (sequential  (per-page      (one VLM
//!              ordered page load)       loop+delays)  state machine)  call)
//! ```
//!
//! * [`page`] — the per-page unit of work: skip-if-completed, mark
//!   processing, call the gateway, write the terminal record. A page can
//!   fail; it can never abort the run.
//! * [`run`]  — the whole-document coordinator: strictly sequential
//!   processing in `page_number` order, proactive inter-page pacing,
//!   longer pauses after rate limits, and the final document status.
//!
//! Sequential on purpose: the gateway is rate-limited and each call is
//! billed, so predictable backpressure beats throughput here.

pub mod page;
pub mod run;

pub use page::{index_page, PageOutcome};
pub use run::{IndexingRun, PageRange, RunSummary};
