//! Report files: a CSV of the products whose price or supplier should change,
//! and a JSON summary with the same details plus aggregate statistics.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::application::ports::ReportSink;
use crate::domain::{Comparison, ComparisonStats, PriceWatchError, PriceWatchResult};

const REPORT_HEADERS: [&str; 10] = [
    "Brand",
    "Product",
    "Old price (EUR)",
    "New price (EUR)",
    "Change (EUR)",
    "Change (%)",
    "Supplier before",
    "Supplier after",
    "LCA price",
    "KMLS price",
];

fn money(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}"))
}

/// One changed product as it appears in both report files
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportLine {
    row: u32,
    brand: String,
    name: String,
    old_price: String,
    new_price: String,
    change: String,
    change_percent: String,
    supplier_before: String,
    supplier_after: String,
    lca_price: String,
    kmls_price: String,
}

impl From<&Comparison> for ReportLine {
    fn from(comparison: &Comparison) -> Self {
        Self {
            row: comparison.product.row,
            brand: comparison.product.brand.clone(),
            name: comparison.product.name.clone(),
            old_price: format!("{:.2}", comparison.baseline.price),
            new_price: money(comparison.resolved.price),
            change: format!("{:.2}", comparison.price_change()),
            change_percent: comparison
                .delta
                .map_or_else(|| "N/A".to_string(), |d| format!("{}%", d.percent_display())),
            supplier_before: comparison.baseline.supplier.to_string(),
            supplier_after: comparison
                .resolved
                .supplier
                .map_or_else(|| "N/A".to_string(), |s| s.to_string()),
            lca_price: money(comparison.prices.lca),
            kmls_price: money(comparison.prices.kmls),
        }
    }
}

impl ReportLine {
    fn record(&self) -> [&str; 10] {
        [
            &self.brand,
            &self.name,
            &self.old_price,
            &self.new_price,
            &self.change,
            &self.change_percent,
            &self.supplier_before,
            &self.supplier_after,
            &self.lca_price,
            &self.kmls_price,
        ]
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDocument<'a> {
    generated_at: DateTime<Utc>,
    statistics: &'a ComparisonStats,
    details: Vec<ReportLine>,
}

fn changed_lines(comparisons: &[Comparison]) -> Vec<ReportLine> {
    comparisons.iter().filter(|c| c.has_changes).map(ReportLine::from).collect()
}

/// Millisecond timestamp plus a short random tag, unique per generated file
fn file_stamp() -> String {
    let tag = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y-%m-%dT%H-%M-%S%.3f"), &tag[..8])
}

fn write_report_csv(path: &Path, lines: &[ReportLine]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("cannot create {}", path.display()))?;
    writer.write_record(REPORT_HEADERS)?;
    for line in lines {
        writer.write_record(line.record())?;
    }
    writer.flush()?;
    Ok(())
}

fn report_error(err: &anyhow::Error) -> PriceWatchError {
    PriceWatchError::Report(format!("{err:#}"))
}

/// Writes report files into one output directory
pub struct CsvReportWriter {
    output_dir: PathBuf,
}

impl CsvReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn ensure_dir(&self) -> PriceWatchResult<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }
}

#[async_trait]
impl ReportSink for CsvReportWriter {
    async fn generate_report(&self, comparisons: &[Comparison]) -> PriceWatchResult<PathBuf> {
        let lines = changed_lines(comparisons);
        if lines.is_empty() {
            return Err(PriceWatchError::NothingToReport);
        }
        self.ensure_dir().await?;

        let path = self.output_dir.join(format!("price-report-{}.csv", file_stamp()));
        let target = path.clone();
        let count = lines.len();
        tokio::task::spawn_blocking(move || write_report_csv(&target, &lines))
            .await
            .map_err(|e| PriceWatchError::Report(e.to_string()))?
            .map_err(|e| report_error(&e))?;

        info!("📊 Price report with {} change(s) written to {}", count, path.display());
        Ok(path)
    }

    async fn generate_summary(
        &self,
        comparisons: &[Comparison],
        stats: &ComparisonStats,
    ) -> PriceWatchResult<PathBuf> {
        self.ensure_dir().await?;
        let document = SummaryDocument {
            generated_at: Utc::now(),
            statistics: stats,
            details: changed_lines(comparisons),
        };
        let path = self.output_dir.join(format!("price-summary-{}.json", file_stamp()));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&document)?).await?;

        info!("📊 Summary written to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::reconciliation::{calculate_stats, reconcile};
    use crate::domain::{Baseline, Product, ScrapeResult, Supplier};
    use tempfile::TempDir;

    fn comparison(lca: f64, kmls: Option<f64>) -> Comparison {
        let product = Product::new(
            4,
            "Acme",
            "Widget",
            Baseline::from_link(100.0, "https://www.lca-distribution.com/p/1"),
        )
        .with_url(Supplier::Lca, "https://www.lca-distribution.com/p/1")
        .with_url(Supplier::Kmls, "https://www.kmls.fr/fr/p/1");
        let lca = ScrapeResult::priced(4, Supplier::Lca, "https://www.lca-distribution.com/p/1", lca);
        let kmls = kmls.map(|p| ScrapeResult::priced(4, Supplier::Kmls, "https://www.kmls.fr/fr/p/1", p));
        reconcile(&product, Some(&lca), kmls.as_ref())
    }

    #[tokio::test]
    async fn report_lists_only_changes() {
        let dir = TempDir::new().unwrap();
        let writer = CsvReportWriter::new(dir.path());
        let comparisons = vec![comparison(90.0, Some(95.0)), comparison(100.0, None)];

        let path = writer.generate_report(&comparisons).await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("price-report-") && name.ends_with(".csv"));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Brand,Product"));
        assert_eq!(lines[1], "Acme,Widget,100.00,90.00,-10.00,-10.00%,LCA,LCA,90.00,95.00");
    }

    #[tokio::test]
    async fn nothing_changed_is_an_error() {
        let dir = TempDir::new().unwrap();
        let writer = CsvReportWriter::new(dir.path());
        let err = writer.generate_report(&[comparison(100.0, None)]).await.unwrap_err();
        assert!(matches!(err, PriceWatchError::NothingToReport));
    }

    #[tokio::test]
    async fn summary_carries_statistics_and_details() {
        let dir = TempDir::new().unwrap();
        let writer = CsvReportWriter::new(dir.path().join("reports"));
        let comparisons = vec![comparison(90.0, None), comparison(100.0, Some(120.0))];
        let stats = calculate_stats(&comparisons);

        let path = writer.generate_summary(&comparisons, &stats).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(json["statistics"]["total"], 2);
        assert_eq!(json["statistics"]["withChanges"], 1);
        assert_eq!(json["details"].as_array().unwrap().len(), 1);
        assert_eq!(json["details"][0]["kmlsPrice"], "N/A");
    }

    #[tokio::test]
    async fn back_to_back_reports_do_not_overwrite_each_other() {
        let dir = TempDir::new().unwrap();
        let writer = CsvReportWriter::new(dir.path());
        let comparisons = vec![comparison(90.0, None)];
        let stats = calculate_stats(&comparisons);

        let first = writer.generate_report(&comparisons).await.unwrap();
        let second = writer.generate_report(&comparisons).await.unwrap();
        let first_summary = writer.generate_summary(&comparisons, &stats).await.unwrap();
        let second_summary = writer.generate_summary(&comparisons, &stats).await.unwrap();

        assert_ne!(first, second);
        assert_ne!(first_summary, second_summary);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
    }
}
