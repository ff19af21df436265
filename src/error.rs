//! Error types for the folio-index library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`IndexError`] — **Fatal**: a run cannot start or continue at all
//!   (missing API key, invalid configuration, the page list could not be
//!   loaded). Returned as `Err(IndexError)` from the top-level entry points.
//!
//! * [`GatewayError`] — **Per-call**: one request to the AI gateway failed.
//!   The page indexer converts these into `error` records and keeps the run
//!   moving; only the *kind* of failure matters upward (a 429 lengthens the
//!   coordinator's inter-page delay, everything else does not).
//!
//! Malformed model output is deliberately absent from both: the gateway
//! client degrades it to an all-default result instead of erroring, so a
//! chatty model never stalls a run.

use thiserror::Error;

/// A failed call to the AI gateway, classified by upstream HTTP status.
///
/// The 429/402 variants exist because callers apply different policy to
/// them: rate limits trigger a longer pause, exhausted credits are mapped to
/// a distinct client-facing status.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Upstream answered HTTP 429 — back off before the next page.
    #[error("AI gateway rate limit exceeded (HTTP 429)")]
    RateLimited,

    /// Upstream answered HTTP 402 — the account is out of credits.
    #[error("AI gateway credits exhausted (HTTP 402)")]
    CreditsExhausted,

    /// Any other non-2xx upstream response.
    #[error("AI gateway returned HTTP {status}: {detail}")]
    Api { status: u16, detail: String },

    /// The request never produced an HTTP response (DNS, TLS, timeout…).
    #[error("request to AI gateway failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl GatewayError {
    /// Classify a non-success upstream status.
    pub fn from_status(status: u16, detail: String) -> Self {
        match status {
            429 => GatewayError::RateLimited,
            402 => GatewayError::CreditsExhausted,
            _ => GatewayError::Api { status, detail },
        }
    }

    /// True when the coordinator should lengthen its inter-page delay.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, GatewayError::RateLimited)
    }

    /// The upstream HTTP status, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::RateLimited => Some(429),
            GatewayError::CreditsExhausted => Some(402),
            GatewayError::Api { status, .. } => Some(*status),
            GatewayError::Request(_) => None,
        }
    }
}

/// A failure inside an [`crate::store::IndexStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Unknown book, missing page, or any backend-specific condition.
    #[error("store error: {0}")]
    Other(String),
}

/// All fatal errors returned by the folio-index library.
///
/// Per-page failures never surface here — they are recorded as `error`
/// index records and tallied by the coordinator instead.
#[derive(Debug, Error)]
pub enum IndexError {
    /// No gateway API key was configured.
    #[error(
        "AI gateway API key is not configured.\n\
         Set AI_GATEWAY_API_KEY or supply a key via IndexerConfig::builder()."
    )]
    MissingApiKey,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The page list for a run could not be loaded. The document is left in
    /// `indexing`; re-triggering the run is the recovery path.
    #[error("Failed to load pages for book '{book_id}': {source}")]
    PageLoadFailed {
        book_id: String,
        #[source]
        source: StoreError,
    },

    /// A store operation outside the per-page loop failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_classifies_backoff_variants() {
        assert!(GatewayError::from_status(429, String::new()).is_rate_limit());
        assert!(matches!(
            GatewayError::from_status(402, String::new()),
            GatewayError::CreditsExhausted
        ));
        match GatewayError::from_status(503, "overloaded".into()) {
            GatewayError::Api { status, detail } => {
                assert_eq!(status, 503);
                assert_eq!(detail, "overloaded");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn status_is_preserved() {
        assert_eq!(GatewayError::RateLimited.status(), Some(429));
        assert_eq!(GatewayError::CreditsExhausted.status(), Some(402));
        assert_eq!(
            GatewayError::Api {
                status: 500,
                detail: String::new()
            }
            .status(),
            Some(500)
        );
    }

    #[test]
    fn missing_key_message_names_the_env_var() {
        let msg = IndexError::MissingApiKey.to_string();
        assert!(msg.contains("AI_GATEWAY_API_KEY"), "got: {msg}");
    }

    #[test]
    fn page_load_failure_names_the_book() {
        let e = IndexError::PageLoadFailed {
            book_id: "b-42".into(),
            source: StoreError::Other("boom".into()),
        };
        assert!(e.to_string().contains("b-42"));
    }
}
