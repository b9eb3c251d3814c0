//! CSV export of the catalog spreadsheet
//!
//! Rows are addressed by their 1-based record number, like sheet rows; a
//! quoted cell spanning several lines still belongs to one row. Link
//! columns may hold `=HYPERLINK("url";"label")` formulas, in which case the
//! hyperlink is kept apart from the display text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::application::ports::{CatalogRow, CatalogSink, CatalogSource, CellUpdate, SheetCell};
use crate::domain::{PriceWatchError, PriceWatchResult};

static HYPERLINK_FORMULA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^=HYPERLINK\(\s*"((?:[^"]|"")*)"\s*(?:[;,]\s*"((?:[^"]|"")*)"\s*)?\)$"#)
        .expect("hyperlink pattern is a valid regex")
});

fn unescape(text: &str) -> String {
    text.replace("\"\"", "\"")
}

/// Split a raw cell into display text and hyperlink
pub fn parse_cell(raw: &str) -> SheetCell {
    let trimmed = raw.trim();
    match HYPERLINK_FORMULA.captures(trimmed) {
        Some(captures) => {
            let url = captures.get(1).map_or(String::new(), |m| unescape(m.as_str()));
            let label = captures.get(2).map_or_else(|| url.clone(), |m| unescape(m.as_str()));
            SheetCell::link(label, url)
        }
        None => SheetCell::text(trimmed),
    }
}

fn read_records(path: &Path) -> Result<Vec<Vec<String>>> {
    let file = File::open(path).with_context(|| format!("cannot open catalog {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    reader
        .records()
        .enumerate()
        .map(|(i, record)| {
            let record = record.with_context(|| format!("malformed catalog line {}", i + 1))?;
            Ok(record.iter().map(str::to_string).collect())
        })
        .collect()
}

fn write_records(path: &Path, records: &[Vec<String>]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_path(&tmp)?;
        for record in records {
            writer.write_record(record)?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("cannot replace catalog {}", path.display()))
}

fn apply_updates(records: &mut Vec<Vec<String>>, updates: &[CellUpdate]) -> usize {
    let mut written = 0;
    for update in updates {
        let Some(index) = (update.row as usize).checked_sub(1) else {
            continue;
        };
        if records.len() <= index {
            records.resize_with(index + 1, Vec::new);
        }
        let record = &mut records[index];
        if record.len() <= update.column {
            record.resize(update.column + 1, String::new());
        }
        record[update.column].clone_from(&update.value);
        written += 1;
    }
    written
}

fn catalog_error(err: &anyhow::Error) -> PriceWatchError {
    PriceWatchError::Catalog(format!("{err:#}"))
}

async fn blocking<T, F>(job: F) -> PriceWatchResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| PriceWatchError::Catalog(e.to_string()))?
        .map_err(|e| catalog_error(&e))
}

pub struct CsvCatalog {
    path: PathBuf,
    first_data_row: u32,
    io: Mutex<()>,
}

impl CsvCatalog {
    pub fn new(path: impl Into<PathBuf>, first_data_row: u32) -> Self {
        Self {
            path: path.into(),
            first_data_row: first_data_row.max(1),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CatalogSource for CsvCatalog {
    async fn read_catalog(&self) -> PriceWatchResult<Vec<CatalogRow>> {
        let _io = self.io.lock().await;
        let path = self.path.clone();
        let records = blocking(move || read_records(&path)).await?;

        let rows: Vec<CatalogRow> = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| CatalogRow {
                row: u32::try_from(i + 1).unwrap_or(u32::MAX),
                cells: record.iter().map(|raw| parse_cell(raw)).collect(),
            })
            .filter(|row| row.row >= self.first_data_row)
            .collect();

        info!("📄 Read {} catalog row(s) from {}", rows.len(), self.path.display());
        Ok(rows)
    }
}

#[async_trait]
impl CatalogSink for CsvCatalog {
    async fn write_updates(&self, updates: &[CellUpdate]) -> PriceWatchResult<usize> {
        if updates.is_empty() {
            debug!("No catalog updates to write");
            return Ok(0);
        }

        let _io = self.io.lock().await;
        let path = self.path.clone();
        let updates = updates.to_vec();
        let written = blocking(move || {
            let mut records = read_records(&path)?;
            let written = apply_updates(&mut records, &updates);
            write_records(&path, &records)?;
            Ok(written)
        })
        .await?;

        info!("✏️ Wrote {} cell(s) to {}", written, self.path.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CATALOG: &str = "\
Marque,Produit,Lien,Prix,LCA,KMLS,Estimé,Réel,Prix LCA,Prix KMLS
Acme,Widget,\"=HYPERLINK(\"\"https://www.lca-distribution.com/p/1\"\";\"\"LCA\"\")\",\"12,50\",https://www.lca-distribution.com/p/1,https://www.kmls.fr/fr/p/1
Bolt,Gadget,,,\"=HYPERLINK(\"\"https://www.lca-distribution.com/p/2\"\",\"\"voir\"\")\"
";

    fn catalog_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("catalog.csv");
        std::fs::write(&path, CATALOG).unwrap();
        path
    }

    #[test]
    fn hyperlink_formulas_are_split() {
        let cell = parse_cell(r#"=HYPERLINK("https://x.test/a";"Lien")"#);
        assert_eq!(cell.text, "Lien");
        assert_eq!(cell.hyperlink.as_deref(), Some("https://x.test/a"));

        let cell = parse_cell(r#"=hyperlink("https://x.test/b")"#);
        assert_eq!(cell.text, "https://x.test/b");

        let cell = parse_cell(" 12,50 ");
        assert_eq!(cell, SheetCell::text("12,50"));
    }

    #[tokio::test]
    async fn reads_rows_after_header() {
        let dir = TempDir::new().unwrap();
        let catalog = CsvCatalog::new(catalog_file(&dir), 2);

        let rows = catalog.read_catalog().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row, 2);
        assert_eq!(rows[0].cells[2].hyperlink.as_deref(), Some("https://www.lca-distribution.com/p/1"));
        assert_eq!(rows[0].cells[3].text, "12,50");
        assert_eq!(rows[1].row, 3);
        assert_eq!(rows[1].cells[4].text, "voir");
    }

    #[tokio::test]
    async fn updates_rewrite_cells_and_grow_rows() {
        let dir = TempDir::new().unwrap();
        let catalog = CsvCatalog::new(catalog_file(&dir), 2);

        let updates = vec![
            CellUpdate { row: 2, column: 3, value: "11.9".into() },
            CellUpdate { row: 3, column: 9, value: "8.5".into() },
        ];
        assert_eq!(catalog.write_updates(&updates).await.unwrap(), 2);

        let rows = catalog.read_catalog().await.unwrap();
        assert_eq!(rows[0].cells[3].text, "11.9");
        assert_eq!(rows[0].cells[0].text, "Acme");
        assert_eq!(rows[1].cells.len(), 10);
        assert_eq!(rows[1].cells[9].text, "8.5");
    }

    #[tokio::test]
    async fn multi_line_cells_keep_sheet_row_numbers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.csv");
        std::fs::write(
            &path,
            "Marque,Produit,Lien,Prix\nAcme,\"Widget\nédition 2\",,10\nBolt,Gadget,,20\n",
        )
        .unwrap();
        let catalog = CsvCatalog::new(&path, 2);

        let rows = catalog.read_catalog().await.unwrap();
        assert_eq!(rows[1].row, 3);
        assert_eq!(rows[1].cells[1].text, "Gadget");

        let update = CellUpdate { row: 3, column: 3, value: "19.5".into() };
        catalog.write_updates(&[update]).await.unwrap();

        let rows = catalog.read_catalog().await.unwrap();
        assert_eq!(rows[0].cells[1].text, "Widget\nédition 2");
        assert_eq!(rows[0].cells[3].text, "10");
        assert_eq!(rows[1].cells[3].text, "19.5");
    }

    #[tokio::test]
    async fn missing_file_is_a_catalog_error() {
        let catalog = CsvCatalog::new("/nonexistent/catalog.csv", 2);
        let err = catalog.read_catalog().await.unwrap_err();
        assert!(matches!(err, PriceWatchError::Catalog(_)));
    }
}
