//! Batch orchestration: scrape every product on both suppliers, reconcile, and
//! stop cleanly on cancellation or session loss.

use futures::future;
use futures::stream::{FuturesOrdered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::reconciliation::reconcile;
use super::session_manager::SessionManager;
use crate::domain::{Comparison, ExtractionFailure, PriceWatchResult, Product, ScrapeResult, Supplier};
use crate::infrastructure::config::{BrowserSettings, defaults};
use crate::infrastructure::extraction::SupplierExtractor;

/// Result of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOutcome {
    /// Completed comparisons in catalog order
    pub comparisons: Vec<Comparison>,
    pub aborted: bool,
    /// Supplier whose session was lost, when that is why the run stopped
    pub aborted_by: Option<Supplier>,
}

impl ScrapeOutcome {
    pub fn with_changes(&self) -> usize {
        self.comparisons.iter().filter(|c| c.has_changes).count()
    }
}

pub struct Orchestrator {
    sessions: Arc<SessionManager>,
    lca: SupplierExtractor,
    kmls: SupplierExtractor,
    workers: usize,
}

impl Orchestrator {
    pub fn new(sessions: Arc<SessionManager>, settings: &BrowserSettings, workers: usize) -> PriceWatchResult<Self> {
        Ok(Self {
            sessions,
            lca: SupplierExtractor::new(Supplier::Lca, settings)?,
            kmls: SupplierExtractor::new(Supplier::Kmls, settings)?,
            workers: workers.clamp(1, defaults::MAX_WORKERS),
        })
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    const fn extractor(&self, supplier: Supplier) -> &SupplierExtractor {
        match supplier {
            Supplier::Lca => &self.lca,
            Supplier::Kmls => &self.kmls,
        }
    }

    /// Scrape one supplier's page for a product.
    ///
    /// `Ok(None)` when the catalog has no link for this supplier. The only
    /// errors are session losses; everything else is recorded on the result.
    async fn scrape_supplier(&self, supplier: Supplier, product: &Product) -> PriceWatchResult<Option<ScrapeResult>> {
        let Some(url) = product.url_for(supplier) else {
            return Ok(None);
        };

        let _turn = self.sessions.scrape_turn(supplier).await?;
        let context = match self.sessions.context(supplier).await {
            Ok(context) => context,
            Err(e) if e.is_session_loss() => return Err(e),
            Err(e) => {
                warn!("{} context unavailable for {}: {}", supplier, product.label(), e);
                return Ok(Some(ScrapeResult::failed(
                    product.row,
                    supplier,
                    url,
                    ExtractionFailure::browser(e),
                )));
            }
        };

        match self.extractor(supplier).scrape(context.as_ref(), product.row, url).await {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                if let Some(lost) = e.lost_session_supplier() {
                    if let Err(invalidate) = self.sessions.report_logged_out(lost).await {
                        error!("Failed to expire {} session: {}", lost, invalidate);
                    }
                }
                Err(e)
            }
        }
    }

    /// Scrape both suppliers for one product and reconcile.
    ///
    /// Fails only with a session-loss error; the LCA error wins when both are lost.
    pub async fn scrape_one(&self, product: &Product) -> PriceWatchResult<Comparison> {
        let (lca, kmls) = future::join(
            self.scrape_supplier(Supplier::Lca, product),
            self.scrape_supplier(Supplier::Kmls, product),
        )
        .await;
        let (lca, kmls) = (lca?, kmls?);
        Ok(reconcile(product, lca.as_ref(), kmls.as_ref()))
    }

    /// Scrape a whole catalog with a bounded pool, keeping catalog order.
    ///
    /// Cancellation is checked before each product is scheduled; products already
    /// in flight still complete. A session loss on product k keeps only the
    /// comparisons before k.
    pub async fn scrape_all(&self, catalog: &[Product], cancel: &CancellationToken) -> ScrapeOutcome {
        let started = Instant::now();
        info!("🚀 Scraping {} product(s) with {} worker(s)", catalog.len(), self.workers);

        let mut queue = catalog.iter().peekable();
        let mut in_flight = FuturesOrdered::new();
        let mut comparisons = Vec::with_capacity(catalog.len());
        let mut cancelled = false;
        let mut halted = false;
        let mut aborted_by = None;

        loop {
            while !halted && !cancelled && in_flight.len() < self.workers && queue.peek().is_some() {
                if cancel.is_cancelled() {
                    warn!("⏹️ Scrape cancelled after {} product(s)", comparisons.len() + in_flight.len());
                    cancelled = true;
                    break;
                }
                if let Some(product) = queue.next() {
                    in_flight.push_back(self.scrape_one(product));
                }
            }

            let Some(result) = in_flight.next().await else {
                break;
            };
            if halted {
                // Draining so every page is released; results past the loss are discarded
                continue;
            }
            match result {
                Ok(comparison) => comparisons.push(comparison),
                Err(e) => {
                    error!("🛑 Batch aborted: {}", e);
                    halted = true;
                    aborted_by = e.lost_session_supplier();
                }
            }
        }

        let outcome = ScrapeOutcome {
            aborted: cancelled || halted,
            aborted_by,
            comparisons,
        };
        info!(
            "🏁 Scrape finished in {:.1}s: {} comparison(s), {} with changes{}",
            started.elapsed().as_secs_f64(),
            outcome.comparisons.len(),
            outcome.with_changes(),
            if outcome.aborted { " (aborted)" } else { "" }
        );
        debug!("Aborted by: {:?}", outcome.aborted_by);
        outcome
    }
}
