//! Browser automation adapter
//!
//! The rest of the crate sees three object-safe seams: a [`BrowserLauncher`]
//! that opens an isolated [`BrowserContext`] per supplier, and the
//! [`PageHandle`] primitives extractors and the login flow are written against.
//! The adapter never retries; callers decide.

pub mod chromium;
pub mod stealth;

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

use crate::domain::{ExtractionFailure, PriceWatchError, PriceWatchResult, Supplier};
use crate::infrastructure::config::{BrowserSettings, JitterRange};

/// Serializable cookie as persisted in the credential vault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Seconds since the Unix epoch; session cookies have none
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("navigation timed out after {0} ms")]
    Timeout(u64),
    #[error("navigation failed: {0}")]
    Failed(String),
}

impl NavigationError {
    pub fn timeout(limit: Duration) -> Self {
        Self::Timeout(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX))
    }
}

impl From<NavigationError> for ExtractionFailure {
    fn from(err: NavigationError) -> Self {
        match err {
            NavigationError::Timeout(timeout_ms) => Self::NavigationTimeout { timeout_ms },
            NavigationError::Failed(message) => Self::navigation(message),
        }
    }
}

impl From<NavigationError> for PriceWatchError {
    fn from(err: NavigationError) -> Self {
        Self::browser(err)
    }
}

/// Opens one isolated browsing context per supplier
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, supplier: Supplier) -> PriceWatchResult<Arc<dyn BrowserContext>>;
}

/// An isolated cookie jar plus the pages opened in it
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> PriceWatchResult<Box<dyn PageHandle>>;
    async fn cookies(&self) -> PriceWatchResult<Vec<StoredCookie>>;
    async fn add_cookies(&self, cookies: &[StoredCookie]) -> PriceWatchResult<()>;
    async fn close(&self) -> PriceWatchResult<()>;
}

/// Page-level primitives
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and wait for the load to finish, bounded by `timeout`
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), NavigationError>;

    /// Wait for a navigation triggered by the last action. `false` on timeout.
    async fn wait_for_navigation(&self, timeout: Duration) -> PriceWatchResult<bool>;

    async fn current_url(&self) -> PriceWatchResult<String>;

    /// Serialized DOM of the current document
    async fn content(&self) -> PriceWatchResult<String>;

    async fn evaluate(&self, script: &str) -> PriceWatchResult<serde_json::Value>;

    async fn fill(&self, selector: &str, text: &str) -> PriceWatchResult<()>;

    async fn click(&self, selector: &str) -> PriceWatchResult<()>;

    /// Poll until `selector` matches. `false` on timeout.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> PriceWatchResult<bool>;

    async fn has_element(&self, selector: &str) -> PriceWatchResult<bool>;

    async fn screenshot(&self, path: &Path) -> PriceWatchResult<()>;

    async fn close(&self) -> PriceWatchResult<()>;
}

/// Randomized delays between browser actions
#[derive(Debug, Clone, Copy)]
pub struct HumanPacer {
    action: JitterRange,
    settle: JitterRange,
    submit: JitterRange,
    scrolls: bool,
}

impl HumanPacer {
    pub const fn new(settings: &BrowserSettings) -> Self {
        Self {
            action: settings.action_delay,
            settle: settings.settle_delay,
            submit: settings.submit_delay,
            scrolls: settings.human_scrolls,
        }
    }

    async fn pause(range: JitterRange) {
        let delay = range.sample();
        if !delay.is_zero() {
            trace!("Pausing {} ms", delay.as_millis());
            tokio::time::sleep(delay).await;
        }
    }

    /// Between two interactions on the same page
    pub async fn between_actions(&self) {
        Self::pause(self.action).await;
    }

    /// After a navigation completes, before reading the page
    pub async fn settle(&self) {
        Self::pause(self.settle).await;
    }

    /// After submitting a form
    pub async fn after_submit(&self) {
        Self::pause(self.submit).await;
    }

    /// A few random scrolls, when enabled. Failures are ignored.
    pub async fn wander(&self, page: &dyn PageHandle) {
        if !self.scrolls {
            return;
        }
        for _ in 0..fastrand::u32(1..=3) {
            let offset = fastrand::u32(100..=600);
            if let Err(e) = page.evaluate(&format!("window.scrollBy(0, {offset})")).await {
                debug!("Scroll skipped: {e}");
            }
            self.between_actions().await;
        }
    }
}

/// Per-supplier navigation quota
pub struct NavigationLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl NavigationLimiter {
    pub fn per_minute(navigations: u32) -> PriceWatchResult<Self> {
        let rate = NonZeroU32::new(navigations).ok_or_else(|| {
            PriceWatchError::configuration("browser.navigations_per_minute", "must be greater than 0")
        })?;
        Ok(Self {
            limiter: RateLimiter::direct(Quota::per_minute(rate)),
        })
    }

    pub async fn until_ready(&self) {
        self.limiter.until_ready().await;
    }
}
