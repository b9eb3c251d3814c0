//! Seams to the external catalog (spreadsheet) and report writer, plus the
//! column mapping that turns sheet rows into products and comparisons back
//! into cell updates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::{
    Baseline, Comparison, ComparisonStats, PriceWatchError, PriceWatchResult, Product, Supplier,
};
use crate::infrastructure::config::ColumnLetters;
use crate::infrastructure::extraction::parse_amount;

/// One sheet cell: what is displayed, and the link behind it if any
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetCell {
    pub text: String,
    pub hyperlink: Option<String>,
}

impl SheetCell {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            hyperlink: None,
        }
    }

    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            hyperlink: Some(url.into()),
        }
    }

    /// Hyperlink target in preference to display text
    pub fn url(&self) -> &str {
        self.hyperlink
            .as_deref()
            .filter(|link| !link.trim().is_empty())
            .unwrap_or(&self.text)
            .trim()
    }
}

/// One raw catalog row with its 1-based sheet row number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub row: u32,
    pub cells: Vec<SheetCell>,
}

impl CatalogRow {
    pub fn cell(&self, column: usize) -> Option<&SheetCell> {
        self.cells.get(column)
    }

    fn text(&self, column: usize) -> &str {
        self.cell(column).map_or("", |c| c.text.trim())
    }

    fn url(&self, column: usize) -> &str {
        self.cell(column).map_or("", SheetCell::url)
    }
}

/// A single cell write. Values are strings; the destination infers types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellUpdate {
    pub row: u32,
    pub column: usize,
    pub value: String,
}

impl CellUpdate {
    /// A1 notation, e.g. `Feuille1!D12`
    pub fn a1(&self, sheet: &str) -> String {
        format!("{sheet}!{}{}", column_letter(self.column), self.row)
    }
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Rows in sheet order, header rows excluded
    async fn read_catalog(&self) -> PriceWatchResult<Vec<CatalogRow>>;
}

#[async_trait]
pub trait CatalogSink: Send + Sync {
    /// Apply all updates; returns the number of cells written
    async fn write_updates(&self, updates: &[CellUpdate]) -> PriceWatchResult<usize>;
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Write only the comparisons with changes. Fails with `NothingToReport` when none changed.
    async fn generate_report(&self, comparisons: &[Comparison]) -> PriceWatchResult<PathBuf>;

    /// Statistics over all comparisons plus the details of those with changes
    async fn generate_summary(
        &self,
        comparisons: &[Comparison],
        stats: &ComparisonStats,
    ) -> PriceWatchResult<PathBuf>;
}

/// Zero-based column index of a column letter: `A` = 0, `Z` = 25, `AA` = 26
pub fn column_index(letter: &str) -> Option<usize> {
    let letter = letter.trim();
    if letter.is_empty() || letter.len() > 3 {
        return None;
    }
    let mut index = 0usize;
    for c in letter.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        index = index * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    Some(index - 1)
}

/// Inverse of [`column_index`]
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Resolved column positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    pub brand: usize,
    pub product_name: usize,
    pub current_link: usize,
    pub current_price: usize,
    pub lca_link: usize,
    pub kmls_link: usize,
    pub estimated_sale_price: Option<usize>,
    pub actual_sale_price: Option<usize>,
    pub lca_price: usize,
    pub kmls_price: usize,
}

fn required(field: &str, letter: Option<&String>) -> PriceWatchResult<usize> {
    let letter = letter
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| PriceWatchError::configuration(field, "column letter is required"))?;
    column_index(letter)
        .ok_or_else(|| PriceWatchError::configuration(field, format!("'{letter}' is not a column letter")))
}

fn optional(field: &str, letter: Option<&String>) -> PriceWatchResult<Option<usize>> {
    match letter.map(|l| l.trim()).filter(|l| !l.is_empty()) {
        None => Ok(None),
        Some(letter) => column_index(letter).map(Some).ok_or_else(|| {
            PriceWatchError::configuration(field, format!("'{letter}' is not a column letter"))
        }),
    }
}

impl ColumnMapping {
    /// Validate configured letters. Missing required columns stop the run here.
    pub fn from_letters(letters: &ColumnLetters) -> PriceWatchResult<Self> {
        Ok(Self {
            brand: required("catalog.columns.brand", letters.brand.as_ref())?,
            product_name: required("catalog.columns.productName", letters.product_name.as_ref())?,
            current_link: required("catalog.columns.currentLink", letters.current_link.as_ref())?,
            current_price: required("catalog.columns.currentPrice", letters.current_price.as_ref())?,
            lca_link: required("catalog.columns.lcaLink", letters.lca_link.as_ref())?,
            kmls_link: required("catalog.columns.kmlsLink", letters.kmls_link.as_ref())?,
            estimated_sale_price: optional(
                "catalog.columns.estimatedSalePrice",
                letters.estimated_sale_price.as_ref(),
            )?,
            actual_sale_price: optional("catalog.columns.actualSalePrice", letters.actual_sale_price.as_ref())?,
            lca_price: optional("catalog.columns.lcaPrice", letters.lca_price.as_ref())?
                .unwrap_or(8),
            kmls_price: optional("catalog.columns.kmlsPrice", letters.kmls_price.as_ref())?
                .unwrap_or(9),
        })
    }

    pub const fn supplier_price_column(&self, supplier: Supplier) -> usize {
        match supplier {
            Supplier::Lca => self.lca_price,
            Supplier::Kmls => self.kmls_price,
        }
    }
}

impl Product {
    /// Build a product from a sheet row. Rows without a product name are skipped.
    pub fn from_row(row: &CatalogRow, mapping: &ColumnMapping) -> Option<Self> {
        let name = row.text(mapping.product_name);
        if name.is_empty() {
            return None;
        }

        let baseline_price = parse_amount(row.text(mapping.current_price)).unwrap_or(0.0);
        let baseline = Baseline::from_link(baseline_price, row.url(mapping.current_link));
        let optional_price = |column: Option<usize>| column.and_then(|c| parse_amount(row.text(c)));

        let mut product = Self::new(row.row, row.text(mapping.brand), name, baseline);
        for (supplier, column) in [(Supplier::Lca, mapping.lca_link), (Supplier::Kmls, mapping.kmls_link)] {
            let url = row.url(column);
            if !url.is_empty() {
                product = product.with_url(supplier, url);
            }
        }
        product.estimated_sale_price = optional_price(mapping.estimated_sale_price);
        product.actual_sale_price = optional_price(mapping.actual_sale_price);
        Some(product)
    }
}

/// Products of a catalog, in sheet order
pub fn products_from_rows(rows: &[CatalogRow], mapping: &ColumnMapping) -> Vec<Product> {
    rows.iter().filter_map(|row| Product::from_row(row, mapping)).collect()
}

/// Cell writes for a finished run.
///
/// Scraped supplier prices are always written back; the current price and link
/// only change for comparisons with changes.
pub fn build_updates(comparisons: &[Comparison], mapping: &ColumnMapping) -> Vec<CellUpdate> {
    let mut updates = Vec::new();
    for comparison in comparisons {
        let row = comparison.product.row;
        for supplier in Supplier::ALL {
            if let Some(price) = comparison.prices.get(supplier) {
                updates.push(CellUpdate {
                    row,
                    column: mapping.supplier_price_column(supplier),
                    value: price.to_string(),
                });
            }
        }

        if !comparison.has_changes {
            continue;
        }
        if let (Some(price), Some(url)) = (comparison.resolved.price, &comparison.resolved.url) {
            updates.push(CellUpdate {
                row,
                column: mapping.current_price,
                value: price.to_string(),
            });
            updates.push(CellUpdate {
                row,
                column: mapping.current_link,
                value: url.clone(),
            });
        }
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SupplierOfRecord;
    use rstest::rstest;

    fn mapping() -> ColumnMapping {
        ColumnMapping::from_letters(&ColumnLetters::default()).unwrap()
    }

    fn row(row: u32, cells: Vec<SheetCell>) -> CatalogRow {
        CatalogRow { row, cells }
    }

    #[rstest]
    #[case("A", Some(0))]
    #[case("z", Some(25))]
    #[case("AA", Some(26))]
    #[case("AZ", Some(51))]
    #[case(" J ", Some(9))]
    #[case("", None)]
    #[case("1", None)]
    #[case("A-", None)]
    fn column_letters_map_to_indices(#[case] letter: &str, #[case] expected: Option<usize>) {
        assert_eq!(column_index(letter), expected);
    }

    #[test]
    fn column_letter_inverts_index() {
        for index in [0, 8, 25, 26, 51, 701, 702] {
            assert_eq!(column_index(&column_letter(index)), Some(index));
        }
        assert_eq!(column_letter(26), "AA");
    }

    #[test]
    fn missing_required_column_is_a_configuration_error() {
        let letters = ColumnLetters {
            lca_link: None,
            ..ColumnLetters::default()
        };
        let err = ColumnMapping::from_letters(&letters).unwrap_err();
        assert!(matches!(err, PriceWatchError::ConfigurationError { ref field, .. } if field == "catalog.columns.lcaLink"));

        let letters = ColumnLetters {
            brand: Some("#".into()),
            ..ColumnLetters::default()
        };
        assert!(ColumnMapping::from_letters(&letters).is_err());
    }

    #[test]
    fn supplier_price_columns_default_to_i_and_j() {
        let letters = ColumnLetters {
            lca_price: None,
            kmls_price: None,
            ..ColumnLetters::default()
        };
        let mapping = ColumnMapping::from_letters(&letters).unwrap();
        assert_eq!(column_letter(mapping.lca_price), "I");
        assert_eq!(column_letter(mapping.kmls_price), "J");
    }

    #[test]
    fn product_prefers_hyperlinks_and_infers_supplier() {
        let sheet_row = row(
            7,
            vec![
                SheetCell::text("Acme"),
                SheetCell::text("Widget 3000"),
                SheetCell::link("LCA", "https://www.lca-distribution.com/p/1"),
                SheetCell::text("1 234,50 €"),
                SheetCell::link("voir", "https://www.lca-distribution.com/p/1"),
                SheetCell::text("https://www.kmls.fr/fr/p/9"),
                SheetCell::text("1500"),
                SheetCell::text(""),
            ],
        );

        let product = Product::from_row(&sheet_row, &mapping()).unwrap();
        assert_eq!(product.row, 7);
        assert_eq!(product.baseline.price, 1234.5);
        assert_eq!(product.baseline.supplier, SupplierOfRecord::Known(Supplier::Lca));
        assert_eq!(product.url_for(Supplier::Lca), Some("https://www.lca-distribution.com/p/1"));
        assert_eq!(product.url_for(Supplier::Kmls), Some("https://www.kmls.fr/fr/p/9"));
        assert_eq!(product.estimated_sale_price, Some(1500.0));
        assert_eq!(product.actual_sale_price, None);
    }

    #[test]
    fn lenient_baseline_and_skipped_rows() {
        let no_price = row(3, vec![SheetCell::text("B"), SheetCell::text("Thing"), SheetCell::text("")]);
        let product = Product::from_row(&no_price, &mapping()).unwrap();
        assert_eq!(product.baseline.price, 0.0);
        assert_eq!(product.baseline.supplier, SupplierOfRecord::Unknown);
        assert!(product.scrape_targets().is_empty());

        let nameless = row(4, vec![SheetCell::text("Brand only")]);
        assert!(Product::from_row(&nameless, &mapping()).is_none());
        assert_eq!(products_from_rows(&[no_price, nameless], &mapping()).len(), 1);
    }

    #[test]
    fn a1_notation_uses_letters() {
        let update = CellUpdate {
            row: 12,
            column: 3,
            value: "9.5".into(),
        };
        assert_eq!(update.a1("Feuille1"), "Feuille1!D12");
    }
}
