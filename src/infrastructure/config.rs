//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate:
//! 1. Built-in defaults (every section is `#[serde(default)]`)
//! 2. An optional TOML/JSON file
//! 3. `PRICE_SENTINEL__<SECTION>__<KEY>` environment variables
//!
//! The merged result is validated before anything touches a browser.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::errors::{PriceWatchError, PriceWatchResult};

/// Prefix for environment overrides, e.g. `PRICE_SENTINEL__SCRAPING__WORKERS=3`
pub const ENV_PREFIX: &str = "PRICE_SENTINEL";
pub const ENV_SEPARATOR: &str = "__";

/// Environment variable read for the vault key when none is set in the file
pub const DEFAULT_VAULT_KEY_ENV: &str = "PRICE_SENTINEL_VAULT_KEY";

/// Shortest vault key accepted
pub const MIN_VAULT_KEY_LEN: usize = 16;

fn environment_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

/// Default values for all configuration sections
pub mod defaults {
    pub const HEADLESS: bool = true;
    pub const NAVIGATION_TIMEOUT_MS: u64 = 30_000;
    pub const PRICE_WAIT_TIMEOUT_MS: u64 = 10_000;
    pub const SECOND_FACTOR_TIMEOUT_MS: u64 = 15_000;
    pub const ACTION_DELAY_MS: (u64, u64) = (500, 1_000);
    pub const SETTLE_DELAY_MS: (u64, u64) = (1_500, 2_500);
    pub const SUBMIT_DELAY_MS: (u64, u64) = (2_000, 3_000);
    pub const NAVIGATIONS_PER_MINUTE: u32 = 30;
    pub const HUMAN_SCROLLS: bool = true;
    pub const LOCALE: &str = "fr-FR";
    pub const TIMEZONE: &str = "Europe/Paris";
    pub const ACCEPT_LANGUAGE: &str = "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7";

    pub const WORKERS: usize = 2;
    pub const MAX_WORKERS: usize = 8;

    pub const SHEET_NAME: &str = "Feuille1";
    pub const FIRST_DATA_ROW: u32 = 2;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_FILE_NAME: &str = "price-sentinel.log";
    pub const LOG_MAX_FILES: u32 = 10;
    pub const LOG_AUTO_CLEANUP: bool = true;
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub vault: VaultConfig,
    pub browser: BrowserSettings,
    pub scraping: ScrapingConfig,
    pub catalog: CatalogConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

/// Where credential bundles live and how the encryption key is found
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub directory: PathBuf,
    /// Key material given directly. Prefer `key_env` outside of tests.
    pub key: Option<String>,
    /// Name of the environment variable holding the key
    pub key_env: String,
}

/// Inclusive bounds of a randomized delay, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitterRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl JitterRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn is_valid(&self) -> bool {
        self.min_ms <= self.max_ms
    }

    /// Draw a delay inside the bounds
    pub fn sample(&self) -> Duration {
        if self.min_ms >= self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(fastrand::u64(self.min_ms..=self.max_ms))
    }
}

/// Browser launch, fingerprint and pacing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Chromium executable; autodetected when unset
    pub executable: Option<PathBuf>,
    pub navigation_timeout_ms: u64,
    /// How long to wait for a price-bearing element before running the chain anyway
    pub price_wait_timeout_ms: u64,
    /// How long to wait for the portal to react to a second-factor code
    pub second_factor_timeout_ms: u64,
    pub action_delay: JitterRange,
    pub settle_delay: JitterRange,
    pub submit_delay: JitterRange,
    /// Navigation quota per supplier
    pub navigations_per_minute: u32,
    /// Random scrolling between actions
    pub human_scrolls: bool,
    pub locale: String,
    pub timezone: String,
    pub accept_language: String,
    /// Screenshots of failed pages go here; disabled when unset
    pub diagnostics_dir: Option<PathBuf>,
}

impl BrowserSettings {
    pub const fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub const fn price_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.price_wait_timeout_ms)
    }

    pub const fn second_factor_timeout(&self) -> Duration {
        Duration::from_millis(self.second_factor_timeout_ms)
    }

    /// Settings for tests and scripted browsers: no waiting anywhere
    pub fn without_delays() -> Self {
        let zero = JitterRange::new(0, 0);
        Self {
            action_delay: zero,
            settle_delay: zero,
            submit_delay: zero,
            human_scrolls: false,
            navigations_per_minute: 6_000,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Products processed concurrently; output order is preserved regardless
    pub workers: usize,
}

/// Column letters as configured by the user, e.g. `"A"`, `"AB"`
///
/// Environment overrides arrive with lowercased keys, hence the aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnLetters {
    pub brand: Option<String>,
    #[serde(alias = "productname")]
    pub product_name: Option<String>,
    #[serde(alias = "currentlink")]
    pub current_link: Option<String>,
    #[serde(alias = "currentprice")]
    pub current_price: Option<String>,
    #[serde(alias = "lcalink")]
    pub lca_link: Option<String>,
    #[serde(alias = "kmlslink")]
    pub kmls_link: Option<String>,
    #[serde(alias = "estimatedsaleprice")]
    pub estimated_sale_price: Option<String>,
    #[serde(alias = "actualsaleprice")]
    pub actual_sale_price: Option<String>,
    #[serde(alias = "lcaprice")]
    pub lca_price: Option<String>,
    #[serde(alias = "kmlsprice")]
    pub kmls_price: Option<String>,
}

impl Default for ColumnLetters {
    fn default() -> Self {
        let letter = |l: &str| Some(l.to_string());
        Self {
            brand: letter("A"),
            product_name: letter("B"),
            current_link: letter("C"),
            current_price: letter("D"),
            lca_link: letter("E"),
            kmls_link: letter("F"),
            estimated_sale_price: letter("G"),
            actual_sale_price: letter("H"),
            lca_price: letter("I"),
            kmls_price: letter("J"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub sheet_name: String,
    /// 1-based row of the first product; rows above are headers
    pub first_data_row: u32,
    pub columns: ColumnLetters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    pub file_name: String,
    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,
    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,
    /// Module-specific log level filters (e.g., "chromiumoxide": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            directory: app_data_dir().join("vault"),
            key: None,
            key_env: DEFAULT_VAULT_KEY_ENV.to_string(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        let (action_min, action_max) = defaults::ACTION_DELAY_MS;
        let (settle_min, settle_max) = defaults::SETTLE_DELAY_MS;
        let (submit_min, submit_max) = defaults::SUBMIT_DELAY_MS;
        Self {
            headless: defaults::HEADLESS,
            executable: None,
            navigation_timeout_ms: defaults::NAVIGATION_TIMEOUT_MS,
            price_wait_timeout_ms: defaults::PRICE_WAIT_TIMEOUT_MS,
            second_factor_timeout_ms: defaults::SECOND_FACTOR_TIMEOUT_MS,
            action_delay: JitterRange::new(action_min, action_max),
            settle_delay: JitterRange::new(settle_min, settle_max),
            submit_delay: JitterRange::new(submit_min, submit_max),
            navigations_per_minute: defaults::NAVIGATIONS_PER_MINUTE,
            human_scrolls: defaults::HUMAN_SCROLLS,
            locale: defaults::LOCALE.to_string(),
            timezone: defaults::TIMEZONE.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            diagnostics_dir: None,
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            workers: defaults::WORKERS,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            sheet_name: defaults::SHEET_NAME.to_string(),
            first_data_row: defaults::FIRST_DATA_ROW,
            columns: ColumnLetters::default(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        let output_dir = dirs::download_dir().unwrap_or_else(|| app_data_dir().join("reports"));
        Self { output_dir }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let module_filters = [
            ("chromiumoxide", "warn"),
            ("tungstenite", "warn"),
            ("hyper", "warn"),
            ("tokio", "info"),
            ("price_sentinel_lib", defaults::LOG_LEVEL),
        ]
        .into_iter()
        .map(|(module, level)| (module.to_string(), level.to_string()))
        .collect();

        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            module_filters,
        }
    }
}

/// Per-user data directory of the application
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("price-sentinel")
}

/// Default location of the optional configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("price-sentinel").join("config.toml"))
}

impl AppConfig {
    /// Merge defaults, an optional file and environment overrides, then validate.
    ///
    /// An explicit `path` must exist; without one the default location is used
    /// when present.
    pub fn load(path: Option<&Path>) -> PriceWatchResult<Self> {
        Self::load_with_environment(path, environment_source())
    }

    fn load_with_environment(path: Option<&Path>, environment: config::Environment) -> PriceWatchResult<Self> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(default_path) = default_config_path().filter(|p| p.exists()) {
                    info!("Loading configuration from {}", default_path.display());
                    builder = builder.add_source(config::File::from(default_path).required(false));
                }
            }
        }

        let settings = builder
            .add_source(environment)
            .build()
            .map_err(|e| PriceWatchError::configuration("config", e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| PriceWatchError::configuration("config", e.to_string()))?;
        config.validate()?;
        debug!("Configuration loaded: {} worker(s)", config.scraping.workers);
        Ok(config)
    }

    /// Reject settings that would make a run misbehave
    pub fn validate(&self) -> PriceWatchResult<()> {
        if self.scraping.workers == 0 || self.scraping.workers > defaults::MAX_WORKERS {
            return Err(PriceWatchError::configuration(
                "scraping.workers",
                format!("must be between 1 and {}", defaults::MAX_WORKERS),
            ));
        }

        let browser = &self.browser;
        if browser.navigation_timeout_ms == 0 {
            return Err(PriceWatchError::configuration(
                "browser.navigation_timeout_ms",
                "must be greater than 0",
            ));
        }
        if browser.navigations_per_minute == 0 {
            return Err(PriceWatchError::configuration(
                "browser.navigations_per_minute",
                "must be greater than 0",
            ));
        }
        for (field, range) in [
            ("browser.action_delay", browser.action_delay),
            ("browser.settle_delay", browser.settle_delay),
            ("browser.submit_delay", browser.submit_delay),
        ] {
            if !range.is_valid() {
                return Err(PriceWatchError::configuration(field, "min_ms cannot be greater than max_ms"));
            }
        }

        if self.catalog.first_data_row == 0 {
            return Err(PriceWatchError::configuration("catalog.first_data_row", "rows are 1-based"));
        }

        if self.vault.key.is_none() && self.vault.key_env.trim().is_empty() {
            return Err(PriceWatchError::configuration(
                "vault.key_env",
                "no vault key and no key environment variable configured",
            ));
        }

        Ok(())
    }

    /// Key material for the credential vault.
    ///
    /// There is no built-in fallback key.
    pub fn resolve_vault_key(&self) -> PriceWatchResult<String> {
        let key = match &self.vault.key {
            Some(key) => key.clone(),
            None => std::env::var(&self.vault.key_env).map_err(|_| {
                PriceWatchError::configuration(
                    "vault.key",
                    format!("set the {} environment variable", self.vault.key_env),
                )
            })?,
        };

        if key.trim().len() < MIN_VAULT_KEY_LEN {
            return Err(PriceWatchError::configuration(
                "vault.key",
                format!("key must be at least {MIN_VAULT_KEY_LEN} characters"),
            ));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.browser.locale, "fr-FR");
        assert_eq!(config.browser.timezone, "Europe/Paris");
        assert_eq!(config.catalog.columns.lca_price.as_deref(), Some("I"));
        assert_eq!(config.catalog.columns.kmls_price.as_deref(), Some("J"));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = AppConfig::default();
        config.scraping.workers = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PriceWatchError::ConfigurationError { ref field, .. } if field == "scraping.workers"));
    }

    #[test]
    fn inverted_jitter_is_rejected() {
        let mut config = AppConfig::default();
        config.browser.settle_delay = JitterRange::new(3_000, 1_000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn jitter_samples_stay_in_bounds() {
        let range = JitterRange::new(500, 1_000);
        for _ in 0..200 {
            let ms = range.sample().as_millis();
            assert!((500..=1_000).contains(&ms));
        }
        assert_eq!(JitterRange::new(0, 0).sample(), Duration::ZERO);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[scraping]\nworkers = 3\n\n[vault]\nkey = \"0123456789abcdef0123\"\n\n[catalog.columns]\nbrand = \"K\""
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.scraping.workers, 3);
        assert_eq!(config.catalog.columns.brand.as_deref(), Some("K"));
        assert_eq!(config.catalog.columns.product_name.as_deref(), Some("B"));
        assert_eq!(config.resolve_vault_key().unwrap(), "0123456789abcdef0123");
    }

    #[test]
    fn environment_overrides_reach_camel_case_columns() {
        let vars: config::Map<String, String> = [
            ("PRICE_SENTINEL__CATALOG__COLUMNS__PRODUCTNAME", "K"),
            ("PRICE_SENTINEL__CATALOG__COLUMNS__KMLSPRICE", "AB"),
            ("PRICE_SENTINEL__SCRAPING__WORKERS", "4"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "[vault]\nkey = \"0123456789abcdef0123\"\n").unwrap();

        let config = AppConfig::load_with_environment(Some(&file), environment_source().source(Some(vars))).unwrap();

        assert_eq!(config.catalog.columns.product_name.as_deref(), Some("K"));
        assert_eq!(config.catalog.columns.kmls_price.as_deref(), Some("AB"));
        assert_eq!(config.catalog.columns.lca_price.as_deref(), Some("I"));
        assert_eq!(config.scraping.workers, 4);
    }

    #[test]
    fn missing_vault_key_is_a_configuration_error() {
        let mut config = AppConfig::default();
        config.vault.key = None;
        config.vault.key_env = "PRICE_SENTINEL_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        let err = config.resolve_vault_key().unwrap_err();
        assert!(matches!(err, PriceWatchError::ConfigurationError { ref field, .. } if field == "vault.key"));
    }

    #[test]
    fn short_vault_key_is_rejected() {
        let mut config = AppConfig::default();
        config.vault.key = Some("short".to_string());
        assert!(config.resolve_vault_key().is_err());
    }
}
