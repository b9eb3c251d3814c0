//! Application state shared by the commands
//!
//! Built once per process from [`AppConfig`]: one vault, one session manager,
//! one orchestrator and one report sink, all passed by reference.

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::orchestrator::{Orchestrator, ScrapeOutcome};
use super::ports::{ColumnMapping, ReportSink};
use super::session_manager::SessionManager;
use crate::domain::{PriceWatchError, PriceWatchResult};
use crate::infrastructure::browser::BrowserLauncher;
use crate::infrastructure::browser::chromium::ChromiumLauncher;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::report::CsvReportWriter;
use crate::infrastructure::vault::CredentialVault;

pub struct AppState {
    pub config: AppConfig,
    pub mapping: ColumnMapping,
    pub sessions: Arc<SessionManager>,
    pub orchestrator: Orchestrator,
    pub reports: Arc<dyn ReportSink>,

    /// Cancellation handle of the running batch, if any
    current_scrape: RwLock<Option<CancellationToken>>,

    /// Outcome of the last finished batch
    last_outcome: RwLock<Option<ScrapeOutcome>>,
}

impl AppState {
    /// State backed by a real Chromium browser
    pub fn from_config(config: AppConfig) -> PriceWatchResult<Self> {
        let launcher = Arc::new(ChromiumLauncher::new(config.browser.clone()));
        let reports = Arc::new(CsvReportWriter::new(config.report.output_dir.clone()));
        Self::new(config, launcher, reports)
    }

    /// Validates the configuration before anything is launched
    pub fn new(
        config: AppConfig,
        launcher: Arc<dyn BrowserLauncher>,
        reports: Arc<dyn ReportSink>,
    ) -> PriceWatchResult<Self> {
        config.validate()?;
        let mapping = ColumnMapping::from_letters(&config.catalog.columns)?;
        let key = config.resolve_vault_key()?;

        let vault = Arc::new(CredentialVault::new(config.vault.directory.clone(), &key));
        let sessions = Arc::new(SessionManager::new(launcher, vault, config.browser.clone()));
        let orchestrator = Orchestrator::new(Arc::clone(&sessions), &config.browser, config.scraping.workers)?;

        info!("Application state ready (vault: {})", config.vault.directory.display());
        Ok(Self {
            config,
            mapping,
            sessions,
            orchestrator,
            reports,
            current_scrape: RwLock::new(None),
            last_outcome: RwLock::new(None),
        })
    }

    /// Register a new batch. Only one batch runs at a time.
    pub async fn begin_scrape(&self) -> PriceWatchResult<CancellationToken> {
        let mut current = self.current_scrape.write().await;
        if current.is_some() {
            return Err(PriceWatchError::configuration("scrape", "a scrape is already running"));
        }
        let token = CancellationToken::new();
        *current = Some(token.clone());
        Ok(token)
    }

    pub async fn finish_scrape(&self, outcome: &ScrapeOutcome) {
        *self.current_scrape.write().await = None;
        *self.last_outcome.write().await = Some(outcome.clone());
    }

    /// Signal the running batch to stop. `false` when nothing is running.
    pub async fn cancel_scrape(&self) -> bool {
        match self.current_scrape.read().await.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn last_outcome(&self) -> Option<ScrapeOutcome> {
        self.last_outcome.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeLauncher, FakeSite, test_config};
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok, block_on};

    fn state(dir: &TempDir) -> PriceWatchResult<AppState> {
        let config = test_config(dir.path());
        let reports = Arc::new(CsvReportWriter::new(config.report.output_dir.clone()));
        AppState::new(config, Arc::new(FakeLauncher::new(FakeSite::new())), reports)
    }

    #[test]
    fn second_scrape_is_refused_until_the_first_finishes() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).unwrap();

        block_on(async {
            let token = assert_ok!(state.begin_scrape().await);
            assert_err!(state.begin_scrape().await);

            assert!(state.cancel_scrape().await);
            assert!(token.is_cancelled());

            let outcome = ScrapeOutcome {
                comparisons: Vec::new(),
                aborted: true,
                aborted_by: None,
            };
            state.finish_scrape(&outcome).await;
            assert!(!state.cancel_scrape().await);
            assert!(state.last_outcome().await.is_some_and(|o| o.aborted));
            assert_ok!(state.begin_scrape().await);
        });
    }

    #[test]
    fn invalid_configuration_is_rejected_before_launch() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        config.catalog.columns.lca_link = Some("1".to_string());
        let reports = Arc::new(CsvReportWriter::new(dir.path()));
        let site = FakeSite::new();

        let result = AppState::new(config, Arc::new(FakeLauncher::new(Arc::clone(&site))), reports);

        assert!(matches!(result, Err(PriceWatchError::ConfigurationError { .. })));
        assert!(site.launches().is_empty());
    }

    #[test]
    fn short_vault_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        config.vault.key = Some("too-short".to_string());
        let reports = Arc::new(CsvReportWriter::new(dir.path()));

        let result = AppState::new(config, Arc::new(FakeLauncher::new(FakeSite::new())), reports);

        assert!(result.is_err());
    }
}
