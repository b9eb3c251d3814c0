//! Domain module - suppliers, catalog products, comparisons and session states
//!
//! Everything here is pure: no I/O, no browser, no clock except timestamps on
//! produced records.

pub mod comparison;
pub mod errors;
pub mod product;
pub mod session;
pub mod supplier;

pub use comparison::{
    Comparison, ComparisonStats, PriceDelta, ProductRef, Resolved, ScrapeResult, SupplierFailure,
    SupplierPrices,
};
pub use errors::{ExtractionFailure, PriceWatchError, PriceWatchResult};
pub use product::{Baseline, Product};
pub use session::{InvalidTransition, LoginOutcome, SessionEvent, SessionState};
pub use supplier::{Supplier, SupplierOfRecord};
