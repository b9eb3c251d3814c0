//! Price Sentinel - supplier portal price monitoring
//!
//! Keeps authenticated sessions on two supplier portals, scrapes the price of
//! every catalog product on both, and reconciles the results against the
//! price and supplier currently recorded in the catalog.

// Module declarations
pub mod application;
pub mod cli;
pub mod commands;
pub mod domain;
pub mod infrastructure;

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_utils;

// Re-export commands for easier access
pub use commands::*;
