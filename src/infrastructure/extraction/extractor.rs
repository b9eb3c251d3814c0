//! Supplier extractor: one product page in, one scrape result out

use chrono::Utc;
use scraper::Html;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::strategy::{PriceStrategy, run_chain};
use crate::domain::{ExtractionFailure, PriceWatchError, PriceWatchResult, ScrapeResult, Supplier};
use crate::infrastructure::browser::{BrowserContext, HumanPacer, NavigationLimiter, PageHandle};
use crate::infrastructure::config::BrowserSettings;
use crate::infrastructure::portals::{self, PortalProfile};

/// Screenshot path for a failed page: `<dir>/<supplier>-<reason>-<timestamp>.png`
pub fn diagnostic_path(dir: &Path, supplier: Supplier, reason: &str) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S%3f");
    dir.join(format!("{}-{reason}-{stamp}.png", supplier.slug()))
}

/// Parse the snapshot and run the chain. Kept synchronous: the DOM is not `Send`.
fn extract_from_snapshot(chain: &[PriceStrategy], html: &str) -> Option<(f64, &'static str)> {
    let document = Html::parse_document(html);
    run_chain(chain, &document)
}

pub struct SupplierExtractor {
    portal: &'static PortalProfile,
    settings: BrowserSettings,
    pacer: HumanPacer,
    limiter: NavigationLimiter,
}

impl SupplierExtractor {
    pub fn new(supplier: Supplier, settings: &BrowserSettings) -> PriceWatchResult<Self> {
        Ok(Self {
            portal: portals::profile(supplier),
            settings: settings.clone(),
            pacer: HumanPacer::new(settings),
            limiter: NavigationLimiter::per_minute(settings.navigations_per_minute)?,
        })
    }

    pub const fn supplier(&self) -> Supplier {
        self.portal.supplier
    }

    /// Scrape one product page.
    ///
    /// Per-item problems come back as a failed [`ScrapeResult`]. The only error
    /// is [`PriceWatchError::SessionExpired`], when the page shows the portal's
    /// login form instead of the product.
    pub async fn scrape(&self, context: &dyn BrowserContext, row: u32, url: &str) -> PriceWatchResult<ScrapeResult> {
        let supplier = self.supplier();
        let page = match context.new_page().await {
            Ok(page) => page,
            Err(e) => return Ok(ScrapeResult::failed(row, supplier, url, ExtractionFailure::browser(e))),
        };

        let outcome = self.scrape_on_page(page.as_ref(), row, url).await;

        if let Err(e) = page.close().await {
            warn!("Failed to close {} page: {}", supplier, e);
        }
        outcome
    }

    async fn scrape_on_page(&self, page: &dyn PageHandle, row: u32, url: &str) -> PriceWatchResult<ScrapeResult> {
        let supplier = self.supplier();
        let failed = |failure: ExtractionFailure| -> PriceWatchResult<ScrapeResult> {
            Ok(ScrapeResult::failed(row, supplier, url, failure))
        };

        self.limiter.until_ready().await;
        debug!("Navigating to {} product page {}", supplier, url);
        if let Err(e) = page.goto(url, self.settings.navigation_timeout()).await {
            warn!("{} navigation failed for row {}: {}", supplier, row, e);
            return failed(e.into());
        }
        self.pacer.settle().await;

        match self.is_logged_out(page).await {
            Ok(true) => {
                warn!("🔒 {} session is no longer authenticated (row {})", supplier, row);
                self.capture(page, "logged-out").await;
                return Err(PriceWatchError::SessionExpired(supplier));
            }
            Ok(false) => {}
            Err(e) => return failed(ExtractionFailure::browser(e)),
        }

        self.pacer.wander(page).await;
        match page
            .wait_for_selector(self.portal.price_ready_selector, self.settings.price_wait_timeout())
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!("No price element visible on {} yet, running the chain anyway", url),
            Err(e) => return failed(ExtractionFailure::browser(e)),
        }

        let html = match page.content().await {
            Ok(html) => html,
            Err(e) => return failed(ExtractionFailure::browser(e)),
        };

        if let Some((price, strategy)) = extract_from_snapshot(self.portal.extraction_chain, &html) {
            info!("💶 {} row {}: {:.2} € ({})", supplier, row, price, strategy);
            return Ok(ScrapeResult::priced(row, supplier, url, price));
        }

        warn!("{} row {}: no strategy found a price on {}", supplier, row, url);
        self.capture(page, "price-not-found").await;
        failed(ExtractionFailure::PriceNotFound {
            strategies_tried: self.portal.extraction_chain.len(),
        })
    }

    /// Login form on the page, or a redirect into the login flow
    async fn is_logged_out(&self, page: &dyn PageHandle) -> PriceWatchResult<bool> {
        if page.has_element(self.portal.logged_out_marker).await? {
            return Ok(true);
        }
        let current = page.current_url().await?;
        Ok(self.portal.is_login_url(&current))
    }

    async fn capture(&self, page: &dyn PageHandle, reason: &str) {
        let Some(dir) = &self.settings.diagnostics_dir else {
            return;
        };
        let path = diagnostic_path(dir, self.supplier(), reason);
        match page.screenshot(&path).await {
            Ok(()) => info!("📸 Saved diagnostic screenshot {:?}", path),
            Err(e) => warn!("Failed to save diagnostic screenshot: {}", e),
        }
    }
}
