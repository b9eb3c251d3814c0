//! Catalog loading, scraping, write-back and report commands

use tracing::{debug, error, info, warn};

use crate::application::dto::{ApplyUpdatesResponseDto, ReportResponseDto, ScrapeAllResponseDto};
use crate::application::ports::{self, CatalogSink, CatalogSource};
use crate::application::{AppState, calculate_stats};
use crate::domain::{Comparison, PriceWatchError, Product};

/// Read the catalog and map its rows to products
pub async fn load_products(state: &AppState, source: &dyn CatalogSource) -> Result<Vec<Product>, String> {
    let rows = source.read_catalog().await.map_err(|e| e.to_string())?;
    let products = ports::products_from_rows(&rows, &state.mapping);
    info!("Catalog holds {} product(s) in {} row(s)", products.len(), rows.len());
    Ok(products)
}

/// Scrape every product. Returns `{total, withChanges, comparisons, aborted, abortedBy}`.
pub async fn scrape_all(state: &AppState, products: Vec<Product>) -> Result<ScrapeAllResponseDto, String> {
    let cancel = state.begin_scrape().await.map_err(|e| e.to_string())?;
    let outcome = state.orchestrator.scrape_all(&products, &cancel).await;
    state.finish_scrape(&outcome).await;

    if let Some(supplier) = outcome.aborted_by {
        error!("Scrape aborted: {} session lost, re-authentication required", supplier);
    }
    Ok(ScrapeAllResponseDto::from(outcome))
}

pub async fn scrape_one(state: &AppState, product: Product) -> Result<Comparison, String> {
    state.orchestrator.scrape_one(&product).await.map_err(|e| e.to_string())
}

/// Stop the running scrape after the products already in flight
pub async fn cancel_scrape(state: &AppState) -> Result<bool, String> {
    let cancelled = state.cancel_scrape().await;
    if !cancelled {
        warn!("Cancel requested but no scrape is running");
    }
    Ok(cancelled)
}

/// Write scraped prices, and resolved price/link for changed products, back to the catalog
pub async fn apply_updates(
    state: &AppState,
    sink: &dyn CatalogSink,
    comparisons: &[Comparison],
) -> Result<ApplyUpdatesResponseDto, String> {
    let updates = ports::build_updates(comparisons, &state.mapping);
    for update in &updates {
        debug!("{} <- {}", update.a1(&state.config.catalog.sheet_name), update.value);
    }
    let cells_written = sink.write_updates(&updates).await.map_err(|e| e.to_string())?;
    Ok(ApplyUpdatesResponseDto {
        cells_written,
        products_changed: comparisons.iter().filter(|c| c.has_changes).count(),
    })
}

/// Write the change report and, when asked, the summary
pub async fn generate_report(
    state: &AppState,
    comparisons: &[Comparison],
    include_summary: bool,
) -> Result<ReportResponseDto, String> {
    let statistics = calculate_stats(comparisons);

    let report_path = match state.reports.generate_report(comparisons).await {
        Ok(path) => Some(path),
        Err(PriceWatchError::NothingToReport) => {
            info!("No price changes, no report file written");
            None
        }
        Err(e) => return Err(e.to_string()),
    };

    let summary_path = if include_summary {
        Some(
            state
                .reports
                .generate_summary(comparisons, &statistics)
                .await
                .map_err(|e| e.to_string())?,
        )
    } else {
        None
    };

    Ok(ReportResponseDto {
        report_path,
        summary_path,
        statistics,
    })
}
