//! Application layer module
//!
//! Session management, reconciliation and batch orchestration built on the
//! domain types, plus the ports to the catalog and report collaborators.

pub mod dto;
pub mod orchestrator;
pub mod ports;
pub mod reconciliation;
pub mod session_manager;
pub mod state;

pub use orchestrator::{Orchestrator, ScrapeOutcome};
pub use ports::{CatalogRow, CatalogSink, CatalogSource, CellUpdate, ColumnMapping, ReportSink, SheetCell};
pub use reconciliation::{calculate_stats, reconcile};
pub use session_manager::SessionManager;
pub use state::AppState;
