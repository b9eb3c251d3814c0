//! Scrape outcomes and reconciled comparison records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ExtractionFailure;
use super::product::{Baseline, Product};
use super::supplier::Supplier;

/// Outcome of one extraction for one product on one supplier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    /// Sheet row of the product this result belongs to
    pub row: u32,
    pub supplier: Supplier,
    pub url: String,
    pub price: Option<f64>,
    pub error: Option<ExtractionFailure>,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapeResult {
    pub fn priced(row: u32, supplier: Supplier, url: impl Into<String>, price: f64) -> Self {
        Self {
            row,
            supplier,
            url: url.into(),
            price: Some(price),
            error: None,
            scraped_at: Utc::now(),
        }
    }

    pub fn failed(row: u32, supplier: Supplier, url: impl Into<String>, error: ExtractionFailure) -> Self {
        Self {
            row,
            supplier,
            url: url.into(),
            price: None,
            error: Some(error),
            scraped_at: Utc::now(),
        }
    }

    /// Price this result contributes to reconciliation.
    ///
    /// A result carrying an error contributes nothing, whatever its price field says.
    pub fn candidate(&self) -> Option<f64> {
        if self.error.is_some() {
            return None;
        }
        self.price.filter(|p| p.is_finite() && *p > 0.0)
    }
}

/// Minimal product identity carried on a comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRef {
    pub row: u32,
    pub brand: String,
    pub name: String,
}

impl From<&Product> for ProductRef {
    fn from(product: &Product) -> Self {
        Self {
            row: product.row,
            brand: product.brand.clone(),
            name: product.name.clone(),
        }
    }
}

/// What the catalog should say after this run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolved {
    pub price: Option<f64>,
    pub supplier: Option<Supplier>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceDelta {
    /// Resolved minus baseline price
    pub absolute: f64,
    /// Percent of the baseline price, rounded to 2 decimals; 0 when the baseline is 0
    pub percent: f64,
}

impl PriceDelta {
    /// Percent formatted with two decimals, e.g. `-10.00`
    pub fn percent_display(&self) -> String {
        format!("{:.2}", self.percent)
    }
}

/// Raw per-supplier prices, kept regardless of which one was selected
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierPrices {
    pub lca: Option<f64>,
    pub kmls: Option<f64>,
}

impl SupplierPrices {
    pub const fn get(&self, supplier: Supplier) -> Option<f64> {
        match supplier {
            Supplier::Lca => self.lca,
            Supplier::Kmls => self.kmls,
        }
    }

    pub fn set(&mut self, supplier: Supplier, price: Option<f64>) {
        match supplier {
            Supplier::Lca => self.lca = price,
            Supplier::Kmls => self.kmls = price,
        }
    }
}

/// A supplier that could not be read for this product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierFailure {
    pub supplier: Supplier,
    pub error: ExtractionFailure,
}

/// Reconciled outcome for one product. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub product: ProductRef,
    pub baseline: Baseline,
    pub resolved: Resolved,
    pub delta: Option<PriceDelta>,
    pub supplier_changed: bool,
    pub has_changes: bool,
    pub prices: SupplierPrices,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SupplierFailure>,
    pub compared_at: DateTime<Utc>,
}

impl Comparison {
    /// Absolute delta, or 0 when nothing was resolved
    pub fn price_change(&self) -> f64 {
        self.delta.map_or(0.0, |d| d.absolute)
    }
}

/// Aggregate figures over a set of comparisons
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonStats {
    pub total: usize,
    pub with_changes: usize,
    pub price_increases: usize,
    pub price_decreases: usize,
    pub supplier_changes: usize,
    pub total_savings: f64,
    pub average_change: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errored_result_contributes_no_candidate() {
        let mut result = ScrapeResult::priced(3, Supplier::Lca, "https://lca", 12.0);
        assert_eq!(result.candidate(), Some(12.0));

        result.error = Some(ExtractionFailure::PriceNotFound { strategies_tried: 3 });
        assert_eq!(result.candidate(), None);
    }

    #[test]
    fn non_positive_prices_are_not_candidates() {
        let zero = ScrapeResult::priced(3, Supplier::Kmls, "https://kmls", 0.0);
        let nan = ScrapeResult::priced(3, Supplier::Kmls, "https://kmls", f64::NAN);
        assert_eq!(zero.candidate(), None);
        assert_eq!(nan.candidate(), None);
    }

    #[test]
    fn percent_display_keeps_two_decimals() {
        let delta = PriceDelta { absolute: -10.0, percent: -10.0 };
        assert_eq!(delta.percent_display(), "-10.00");
    }
}
