//! Price extraction: text normalization, strategy chains and the per-supplier extractor

pub mod extractor;
pub mod price_text;
pub mod strategy;

pub use extractor::{SupplierExtractor, diagnostic_path};
pub use price_text::{normalize_price, parse_amount};
pub use strategy::{PriceStrategy, StrategyOutcome, run_chain};
