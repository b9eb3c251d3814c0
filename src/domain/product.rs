use serde::{Deserialize, Serialize};

use super::supplier::{Supplier, SupplierOfRecord};

/// Price, supplier and link currently recorded in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    pub price: f64,
    pub supplier: SupplierOfRecord,
    pub url: String,
}

impl Baseline {
    /// Build a baseline, inferring the supplier of record from the link
    pub fn from_link(price: f64, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            price,
            supplier: SupplierOfRecord::from_url(&url),
            url,
        }
    }
}

/// One catalog entry, sourced from the external spreadsheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// 1-based sheet row the entry was read from
    pub row: u32,
    pub brand: String,
    pub name: String,
    pub baseline: Baseline,
    #[serde(default)]
    pub lca_url: Option<String>,
    #[serde(default)]
    pub kmls_url: Option<String>,
    #[serde(default)]
    pub estimated_sale_price: Option<f64>,
    #[serde(default)]
    pub actual_sale_price: Option<f64>,
}

impl Product {
    pub fn new(row: u32, brand: impl Into<String>, name: impl Into<String>, baseline: Baseline) -> Self {
        Self {
            row,
            brand: brand.into(),
            name: name.into(),
            baseline,
            lca_url: None,
            kmls_url: None,
            estimated_sale_price: None,
            actual_sale_price: None,
        }
    }

    #[must_use]
    pub fn with_url(mut self, supplier: Supplier, url: impl Into<String>) -> Self {
        let url = Some(url.into());
        match supplier {
            Supplier::Lca => self.lca_url = url,
            Supplier::Kmls => self.kmls_url = url,
        }
        self
    }

    /// Product page for a supplier, if the catalog lists one
    pub fn url_for(&self, supplier: Supplier) -> Option<&str> {
        let url = match supplier {
            Supplier::Lca => self.lca_url.as_deref(),
            Supplier::Kmls => self.kmls_url.as_deref(),
        };
        url.map(str::trim).filter(|u| !u.is_empty())
    }

    /// Suppliers this product can be scraped from, in priority order
    pub fn scrape_targets(&self) -> Vec<(Supplier, &str)> {
        Supplier::ALL
            .iter()
            .filter_map(|s| self.url_for(*s).map(|url| (*s, url)))
            .collect()
    }

    /// Short label for logs
    pub fn label(&self) -> String {
        if self.brand.is_empty() {
            format!("row {} {}", self.row, self.name)
        } else {
            format!("row {} {} {}", self.row, self.brand, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_urls_are_not_scrape_targets() {
        let product = Product::new(2, "Acme", "Widget", Baseline::from_link(10.0, ""))
            .with_url(Supplier::Lca, "   ")
            .with_url(Supplier::Kmls, "https://www.kmls.fr/fr/p/1");

        assert_eq!(product.url_for(Supplier::Lca), None);
        assert_eq!(
            product.scrape_targets(),
            vec![(Supplier::Kmls, "https://www.kmls.fr/fr/p/1")]
        );
    }

    #[test]
    fn baseline_infers_supplier_from_link() {
        let baseline = Baseline::from_link(12.5, "https://www.lca-distribution.com/p/9");
        assert_eq!(baseline.supplier, SupplierOfRecord::Known(Supplier::Lca));
    }
}
