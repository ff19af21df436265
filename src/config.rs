//! Configuration for the indexing and detection pipelines.
//!
//! All pipeline behaviour is controlled through [`IndexerConfig`], built via
//! its [`IndexerConfigBuilder`] or from the environment. Keeping every knob
//! in one struct makes it trivial to share configs across tasks and to speed
//! the pipeline up in tests (the integration suite sets the delays to a few
//! milliseconds so a full run finishes instantly).

use crate::error::IndexError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default chat-completions gateway. Any OpenAI-compatible endpoint works.
pub const DEFAULT_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev";

/// Default vision model identifier sent to the gateway.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Configuration for gateway access and pipeline pacing.
///
/// # Example
/// ```rust
/// use folio_index::IndexerConfig;
///
/// let config = IndexerConfig::builder()
///     .api_key("sk-test")
///     .model("google/gemini-2.5-flash")
///     .page_delay_ms(800)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Base URL of the OpenAI-compatible gateway (no trailing slash, no
    /// `/v1/...` suffix). Default: [`DEFAULT_GATEWAY_URL`].
    pub gateway_url: String,

    /// Bearer token for the gateway. Required — there is no anonymous tier.
    pub api_key: String,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Maximum tokens the model may generate per page. Default: 4000.
    ///
    /// Dense textbook pages routinely need 2 000+ output tokens for the full
    /// extraction JSON; 4 000 covers them without letting a runaway response
    /// blow the per-page cost budget.
    pub max_tokens: u32,

    /// Per-call timeout in seconds. Default: 90.
    pub api_timeout_secs: u64,

    /// Normal-path pause between consecutive page calls. Default: 800 ms.
    ///
    /// The pipeline is strictly sequential by design, and this pause keeps
    /// it proactively under the gateway's rate limit instead of reactively
    /// eating 429s.
    pub page_delay_ms: u64,

    /// Pause after a detected rate-limit failure. Default: 5000 ms.
    pub rate_limit_delay_ms: u64,

    /// Pause between detection calls in a sequential batch. Default: 500 ms.
    pub detection_delay_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4000,
            api_timeout_secs: 90,
            page_delay_ms: 800,
            rate_limit_delay_ms: 5000,
            detection_delay_ms: 500,
        }
    }
}

// Manual Debug so the API key never lands in logs.
impl fmt::Debug for IndexerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexerConfig")
            .field("gateway_url", &self.gateway_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("page_delay_ms", &self.page_delay_ms)
            .field("rate_limit_delay_ms", &self.rate_limit_delay_ms)
            .field("detection_delay_ms", &self.detection_delay_ms)
            .finish()
    }
}

impl IndexerConfig {
    /// Create a new builder.
    pub fn builder() -> IndexerConfigBuilder {
        IndexerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a configuration from the environment.
    ///
    /// Reads `AI_GATEWAY_API_KEY` (required), `AI_GATEWAY_URL` and
    /// `FOLIO_MODEL` (optional overrides).
    pub fn from_env() -> Result<Self, IndexError> {
        let api_key = std::env::var("AI_GATEWAY_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(IndexError::MissingApiKey)?;

        let mut builder = Self::builder().api_key(api_key);
        if let Ok(url) = std::env::var("AI_GATEWAY_URL") {
            if !url.is_empty() {
                builder = builder.gateway_url(url);
            }
        }
        if let Ok(model) = std::env::var("FOLIO_MODEL") {
            if !model.is_empty() {
                builder = builder.model(model);
            }
        }
        builder.build()
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn detection_delay(&self) -> Duration {
        Duration::from_millis(self.detection_delay_ms)
    }
}

/// Builder for [`IndexerConfig`].
#[derive(Debug)]
pub struct IndexerConfigBuilder {
    config: IndexerConfig,
}

impl IndexerConfigBuilder {
    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.config.gateway_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.page_delay_ms = ms;
        self
    }

    pub fn rate_limit_delay_ms(mut self, ms: u64) -> Self {
        self.config.rate_limit_delay_ms = ms;
        self
    }

    pub fn detection_delay_ms(mut self, ms: u64) -> Self {
        self.config.detection_delay_ms = ms;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IndexerConfig, IndexError> {
        let c = &self.config;
        if c.api_key.is_empty() {
            return Err(IndexError::MissingApiKey);
        }
        if c.gateway_url.is_empty() {
            return Err(IndexError::InvalidConfig(
                "gateway_url must not be empty".into(),
            ));
        }
        if c.model.is_empty() {
            return Err(IndexError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}
