//! Shared application state.

use crate::config::IndexerConfig;
use crate::detect::DetectionSession;
use crate::gateway::PageAnalyzer;
use crate::store::IndexStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Everything a request handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Record and status persistence.
    pub store: Arc<dyn IndexStore>,
    /// Vision gateway client (or a test double).
    pub analyzer: Arc<dyn PageAnalyzer>,
    /// Pacing and gateway configuration shared by every run.
    pub config: IndexerConfig,
    /// One detection session per book, created lazily on the first
    /// `/detect` call and kept for the life of the process.
    sessions: Arc<Mutex<HashMap<String, Arc<DetectionSession>>>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IndexStore>,
        analyzer: Arc<dyn PageAnalyzer>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            store,
            analyzer,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The detection session for `book_id`, creating it on first use.
    pub fn detection_session(&self, book_id: &str) -> Arc<DetectionSession> {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(sessions.entry(book_id.to_string()).or_insert_with(|| {
            Arc::new(DetectionSession::new(
                Arc::clone(&self.analyzer),
                self.config.clone(),
                book_id,
            ))
        }))
    }
}
