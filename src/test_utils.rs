//! Test utilities for Price Sentinel
//!
//! A scripted in-memory browser ([`FakeSite`], [`FakeLauncher`]) that serves
//! fixed HTML per URL and follows simple form rules, so the login protocol,
//! extraction and orchestration can be exercised without Chromium.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::application::orchestrator::Orchestrator;
use crate::application::session_manager::SessionManager;
use crate::domain::{PriceWatchError, PriceWatchResult, Supplier};
use crate::infrastructure::browser::{BrowserContext, BrowserLauncher, NavigationError, PageHandle, StoredCookie};
use crate::infrastructure::config::{AppConfig, BrowserSettings};
use crate::infrastructure::portals;
use crate::infrastructure::vault::CredentialVault;

pub const TEST_VAULT_KEY: &str = "test-vault-key-0123456789";

pub const LCA_SECOND_FACTOR_URL: &str = "https://www.lca-distribution.com/module/twofactor/verify";
pub const KMLS_SECOND_FACTOR_URL: &str = "https://www.kmls.fr/fr/connexion?etape=code";

/// Submitting `submit` on `page_url` navigates to `on_match` when the field
/// holds the expected value, `otherwise` if not
#[derive(Debug, Clone)]
pub struct FormRule {
    pub page_url: String,
    pub submit: String,
    pub expected: Vec<(String, String)>,
    pub on_match: String,
    pub otherwise: String,
}

#[derive(Default)]
struct SiteState {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    forms: Vec<FormRule>,
    failures: HashMap<String, NavigationError>,
    latency: HashMap<String, Duration>,
    cancel_on_visit: HashMap<String, CancellationToken>,
    visits: Vec<String>,
    launches: Vec<Supplier>,
    open_contexts: usize,
    open_pages: usize,
    hydrated: HashMap<Supplier, Vec<StoredCookie>>,
    screenshots: Vec<PathBuf>,
}

/// Scripted web: pages, redirects and form behaviour shared by every fake context
#[derive(Default)]
pub struct FakeSite {
    state: Mutex<SiteState>,
}

fn html_has(html: &str, selector: &str) -> bool {
    let Ok(selector) = Selector::parse(selector) else {
        return false;
    };
    Html::parse_document(html).select(&selector).next().is_some()
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn page(&self, url: &str, html: impl Into<String>) -> &Self {
        self.state().pages.insert(url.to_string(), html.into());
        self
    }

    pub fn redirect(&self, from: &str, to: &str) -> &Self {
        self.state().redirects.insert(from.to_string(), to.to_string());
        self
    }

    pub fn form(&self, rule: FormRule) -> &Self {
        self.state().forms.push(rule);
        self
    }

    pub fn fail_navigation(&self, url: &str, error: NavigationError) -> &Self {
        self.state().failures.insert(url.to_string(), error);
        self
    }

    pub fn latency(&self, url: &str, delay: Duration) -> &Self {
        self.state().latency.insert(url.to_string(), delay);
        self
    }

    /// Cancel `token` when `url` is visited
    pub fn cancel_on_visit(&self, url: &str, token: &CancellationToken) -> &Self {
        self.state().cancel_on_visit.insert(url.to_string(), token.clone());
        self
    }

    /// Script a supplier's login pages.
    ///
    /// Right credentials land on the home page, or on the code page when a
    /// second factor is given; wrong ones come back to the login form.
    pub fn portal_login(&self, supplier: Supplier, email: &str, password: &str, second_factor: Option<&str>) -> &Self {
        let portal = portals::profile(supplier);
        self.page(portal.login_url, login_form_html(supplier));
        self.page(portal.home_url, "<html><body><h1>Bienvenue</h1></body></html>");

        let after_password = match second_factor {
            Some(code) => {
                let code_page = second_factor_url(supplier);
                self.page(code_page, second_factor_html(supplier));
                self.form(FormRule {
                    page_url: code_page.to_string(),
                    submit: portal.code_submit_selector.to_string(),
                    expected: vec![(portal.code_input_selector.to_string(), code.to_string())],
                    on_match: portal.home_url.to_string(),
                    otherwise: code_page.to_string(),
                });
                code_page
            }
            None => portal.home_url,
        };

        self.form(FormRule {
            page_url: portal.login_url.to_string(),
            submit: portal.submit_selector.to_string(),
            expected: vec![
                (portal.email_selector.to_string(), email.to_string()),
                (portal.password_selector.to_string(), password.to_string()),
            ],
            on_match: after_password.to_string(),
            otherwise: portal.login_url.to_string(),
        })
    }

    pub fn visits(&self) -> Vec<String> {
        self.state().visits.clone()
    }

    pub fn launches(&self) -> Vec<Supplier> {
        self.state().launches.clone()
    }

    pub fn open_contexts(&self) -> usize {
        self.state().open_contexts
    }

    pub fn open_pages(&self) -> usize {
        self.state().open_pages
    }

    pub fn hydrated_cookies(&self, supplier: Supplier) -> Vec<StoredCookie> {
        self.state().hydrated.get(&supplier).cloned().unwrap_or_default()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state().screenshots.clone()
    }

    fn html(&self, url: &str) -> String {
        self.state()
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string())
    }

    /// Record a visit and resolve where it lands
    fn visit(&self, url: &str) -> (Result<String, NavigationError>, Option<Duration>) {
        let mut state = self.state();
        state.visits.push(url.to_string());
        if let Some(token) = state.cancel_on_visit.get(url) {
            token.cancel();
        }
        let latency = state.latency.get(url).copied();
        if let Some(error) = state.failures.get(url) {
            return (Err(error.clone()), latency);
        }
        let landed = state.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
        (Ok(landed), latency)
    }

    fn submit(&self, page_url: &str, submit: &str, filled: &HashMap<String, String>) -> Option<String> {
        let state = self.state();
        let rule = state
            .forms
            .iter()
            .find(|rule| rule.page_url == page_url && rule.submit == submit)?;
        let matches = rule
            .expected
            .iter()
            .all(|(field, value)| filled.get(field) == Some(value));
        Some(if matches { rule.on_match.clone() } else { rule.otherwise.clone() })
    }
}

pub const fn second_factor_url(supplier: Supplier) -> &'static str {
    match supplier {
        Supplier::Lca => LCA_SECOND_FACTOR_URL,
        Supplier::Kmls => KMLS_SECOND_FACTOR_URL,
    }
}

pub fn login_form_html(supplier: Supplier) -> String {
    match supplier {
        Supplier::Lca => r#"<form id="login_form"><input id="email"><input id="passwd" type="password"><button id="SubmitLogin">Connexion</button></form>"#.to_string(),
        Supplier::Kmls => r#"<form><input name="p_Login"><input name="p_Pass" type="password"><input name="p_Connexion" type="submit"></form>"#.to_string(),
    }
}

pub fn second_factor_html(supplier: Supplier) -> String {
    match supplier {
        Supplier::Lca => r#"<form><input name="code"><button type="submit">Valider</button></form>"#.to_string(),
        Supplier::Kmls => r#"<form><input name="p_Code"><input name="p_ValideCode" type="submit"></form>"#.to_string(),
    }
}

/// Product page showing `price_text` the way the supplier renders it
pub fn product_html(supplier: Supplier, price_text: &str) -> String {
    match supplier {
        Supplier::Lca => format!(r#"<div class="pb-center-column"><p><span id="our_price_display">{price_text}</span></p></div>"#),
        Supplier::Kmls => format!(r#"<div class="product-price"><span class="price">{price_text}</span></div>"#),
    }
}

pub fn session_cookie(supplier: Supplier) -> StoredCookie {
    let domain = portals::profile(supplier).host_suffix;
    StoredCookie {
        name: "session".to_string(),
        value: format!("{}-authenticated", supplier.slug()),
        domain: format!(".{domain}"),
        path: "/".to_string(),
        expires: None,
        http_only: true,
        secure: true,
        same_site: Some("Lax".to_string()),
    }
}

pub struct FakeLauncher {
    site: Arc<FakeSite>,
}

impl FakeLauncher {
    pub const fn new(site: Arc<FakeSite>) -> Self {
        Self { site }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, supplier: Supplier) -> PriceWatchResult<Arc<dyn BrowserContext>> {
        {
            let mut state = self.site.state();
            state.launches.push(supplier);
            state.open_contexts += 1;
        }
        Ok(Arc::new(FakeContext {
            site: Arc::clone(&self.site),
            supplier,
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct FakeContext {
    site: Arc<FakeSite>,
    supplier: Supplier,
    closed: AtomicBool,
}

impl FakeContext {
    fn ensure_open(&self) -> PriceWatchResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PriceWatchError::browser("context closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn new_page(&self) -> PriceWatchResult<Box<dyn PageHandle>> {
        self.ensure_open()?;
        self.site.state().open_pages += 1;
        Ok(Box::new(FakePage {
            site: Arc::clone(&self.site),
            url: Mutex::new("about:blank".to_string()),
            filled: Mutex::new(HashMap::new()),
            navigated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }

    async fn cookies(&self) -> PriceWatchResult<Vec<StoredCookie>> {
        self.ensure_open()?;
        Ok(vec![session_cookie(self.supplier)])
    }

    async fn add_cookies(&self, cookies: &[StoredCookie]) -> PriceWatchResult<()> {
        self.ensure_open()?;
        self.site
            .state()
            .hydrated
            .entry(self.supplier)
            .or_default()
            .extend_from_slice(cookies);
        Ok(())
    }

    async fn close(&self) -> PriceWatchResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.site.state().open_contexts -= 1;
        }
        Ok(())
    }
}

pub struct FakePage {
    site: Arc<FakeSite>,
    url: Mutex<String>,
    filled: Mutex<HashMap<String, String>>,
    navigated: AtomicBool,
    closed: AtomicBool,
}

impl FakePage {
    fn current(&self) -> String {
        self.url.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn land(&self, url: String) {
        *self.url.lock().unwrap_or_else(PoisonError::into_inner) = url;
        self.filled.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.navigated.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> PriceWatchResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PriceWatchError::browser("page closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), NavigationError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NavigationError::Failed("page closed".to_string()));
        }
        let (landed, latency) = self.site.visit(url);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        self.land(landed?);
        self.navigated.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_for_navigation(&self, _timeout: Duration) -> PriceWatchResult<bool> {
        self.ensure_open()?;
        Ok(self.navigated.swap(false, Ordering::SeqCst))
    }

    async fn current_url(&self) -> PriceWatchResult<String> {
        self.ensure_open()?;
        Ok(self.current())
    }

    async fn content(&self) -> PriceWatchResult<String> {
        self.ensure_open()?;
        Ok(self.site.html(&self.current()))
    }

    async fn evaluate(&self, _script: &str) -> PriceWatchResult<serde_json::Value> {
        self.ensure_open()?;
        Ok(serde_json::Value::Null)
    }

    async fn fill(&self, selector: &str, text: &str) -> PriceWatchResult<()> {
        self.ensure_open()?;
        self.filled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(selector.to_string(), text.to_string());
        Ok(())
    }

    async fn click(&self, selector: &str) -> PriceWatchResult<()> {
        self.ensure_open()?;
        let filled = self.filled.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(target) = self.site.submit(&self.current(), selector, &filled) {
            let (landed, _) = self.site.visit(&target);
            self.land(landed.map_err(PriceWatchError::from)?);
        }
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> PriceWatchResult<bool> {
        self.has_element(selector).await
    }

    async fn has_element(&self, selector: &str) -> PriceWatchResult<bool> {
        self.ensure_open()?;
        Ok(html_has(&self.site.html(&self.current()), selector))
    }

    async fn screenshot(&self, path: &Path) -> PriceWatchResult<()> {
        self.ensure_open()?;
        self.site.state().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&self) -> PriceWatchResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.site.state().open_pages -= 1;
        }
        Ok(())
    }
}

/// Configuration pointing every directory into `dir`, with no delays
pub fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.vault.directory = dir.join("vault");
    config.vault.key = Some(TEST_VAULT_KEY.to_string());
    config.browser = BrowserSettings::without_delays();
    config.report.output_dir = dir.join("reports");
    config
}

/// Complete test context: scripted site, vault, session manager and orchestrator
pub struct TestContext {
    pub site: Arc<FakeSite>,
    pub vault: Arc<CredentialVault>,
    pub sessions: Arc<SessionManager>,
    pub orchestrator: Orchestrator,
    pub settings: BrowserSettings,
    pub dir: TempDir,
}

impl TestContext {
    pub fn new(workers: usize) -> PriceWatchResult<Self> {
        Self::with_settings(workers, BrowserSettings::without_delays())
    }

    pub fn with_settings(workers: usize, settings: BrowserSettings) -> PriceWatchResult<Self> {
        let dir = TempDir::new()?;
        let site = FakeSite::new();
        let vault = Arc::new(CredentialVault::new(dir.path().join("vault"), TEST_VAULT_KEY));
        let launcher = Arc::new(FakeLauncher::new(Arc::clone(&site)));
        let sessions = Arc::new(SessionManager::new(launcher, Arc::clone(&vault), settings.clone()));
        let orchestrator = Orchestrator::new(Arc::clone(&sessions), &settings, workers)?;
        Ok(Self {
            site,
            vault,
            sessions,
            orchestrator,
            settings,
            dir,
        })
    }

    /// Store a session bundle so the next context request hydrates from it
    pub async fn seed_session(&self, supplier: Supplier) -> PriceWatchResult<()> {
        self.vault.store(supplier, &[session_cookie(supplier)]).await
    }

    pub async fn seed_all_sessions(&self) -> PriceWatchResult<()> {
        for supplier in Supplier::ALL {
            self.seed_session(supplier).await?;
        }
        Ok(())
    }
}
