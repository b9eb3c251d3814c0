//! Infrastructure layer for configuration, logging, the credential vault,
//! browser automation, price extraction and file-based collaborators.

pub mod browser;
pub mod catalog_csv;
pub mod config;
pub mod extraction;
pub mod logging;
pub mod portals;
pub mod report;
pub mod vault;

// Re-export commonly used items
pub use browser::{BrowserContext, BrowserLauncher, PageHandle, StoredCookie};
pub use catalog_csv::CsvCatalog;
pub use config::AppConfig;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use report::CsvReportWriter;
pub use vault::CredentialVault;
