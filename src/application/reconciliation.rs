//! Reconciliation of per-supplier scrape results against the catalog baseline

use chrono::Utc;
use tracing::debug;

use crate::domain::{
    Comparison, ComparisonStats, PriceDelta, Product, ProductRef, Resolved, ScrapeResult, Supplier,
    SupplierFailure, SupplierOfRecord, SupplierPrices,
};

/// Smallest price movement that counts as a change, in currency units
pub const CHANGE_EPSILON: f64 = 0.01;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Lowest candidate wins; equal prices go to the higher-priority supplier
fn select(candidates: &[(Supplier, f64)]) -> Option<(Supplier, f64)> {
    candidates.iter().copied().min_by(|(sa, pa), (sb, pb)| {
        pa.total_cmp(pb).then_with(|| sa.priority().cmp(&sb.priority()))
    })
}

/// Combine both suppliers' results with the product baseline.
///
/// A result carrying an error contributes no candidate. Raw prices are kept on
/// the comparison whichever supplier is selected.
pub fn reconcile(product: &Product, lca: Option<&ScrapeResult>, kmls: Option<&ScrapeResult>) -> Comparison {
    let mut prices = SupplierPrices::default();
    let mut failures = Vec::new();
    let mut candidates = Vec::with_capacity(2);

    for (supplier, result) in [(Supplier::Lca, lca), (Supplier::Kmls, kmls)] {
        let Some(result) = result else {
            continue;
        };
        if let Some(error) = &result.error {
            failures.push(SupplierFailure {
                supplier,
                error: error.clone(),
            });
        }
        let candidate = result.candidate();
        prices.set(supplier, candidate);
        if let Some(price) = candidate {
            candidates.push((supplier, price));
        }
    }

    let baseline = product.baseline.clone();
    let (resolved, delta, supplier_changed) = match select(&candidates) {
        Some((supplier, price)) => {
            let absolute = round_to(price - baseline.price, 6);
            let percent = if baseline.price == 0.0 {
                0.0
            } else {
                round_to(absolute / baseline.price * 100.0, 2)
            };
            let resolved = Resolved {
                price: Some(price),
                supplier: Some(supplier),
                url: product.url_for(supplier).map(str::to_string),
            };
            let changed = baseline.supplier != SupplierOfRecord::Known(supplier);
            (resolved, Some(PriceDelta { absolute, percent }), changed)
        }
        None => (Resolved::default(), None, false),
    };

    let has_changes = delta.is_some_and(|d| d.absolute.abs() > CHANGE_EPSILON) || supplier_changed;
    debug!(
        "Reconciled {}: resolved={:?} has_changes={}",
        product.label(),
        resolved.supplier,
        has_changes
    );

    Comparison {
        product: ProductRef::from(product),
        baseline,
        resolved,
        delta,
        supplier_changed,
        has_changes,
        prices,
        failures,
        compared_at: Utc::now(),
    }
}

/// Aggregate figures over the comparisons that carry changes
pub fn calculate_stats(comparisons: &[Comparison]) -> ComparisonStats {
    let mut stats = ComparisonStats {
        total: comparisons.len(),
        ..ComparisonStats::default()
    };
    let mut total_change = 0.0;

    for comparison in comparisons.iter().filter(|c| c.has_changes) {
        stats.with_changes += 1;
        let change = comparison.price_change();
        if change > 0.0 {
            stats.price_increases += 1;
        } else if change < 0.0 {
            stats.price_decreases += 1;
            stats.total_savings += change.abs();
        }
        if comparison.supplier_changed {
            stats.supplier_changes += 1;
        }
        total_change += change;
    }

    stats.total_savings = round_to(stats.total_savings, 6);
    if stats.with_changes > 0 {
        stats.average_change = round_to(total_change / stats.with_changes as f64, 2);
    }
    stats
}
