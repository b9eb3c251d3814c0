//! Chromium implementation of the browser adapter
//!
//! Every supplier gets its own Chromium process with its own profile directory,
//! so cookie jars never mix.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::stealth::{FingerprintProfile, LAUNCH_ARGS, STEALTH_SCRIPT};
use super::{BrowserContext, BrowserLauncher, NavigationError, PageHandle, StoredCookie};
use crate::domain::{PriceWatchError, PriceWatchResult, Supplier};
use crate::infrastructure::config::BrowserSettings;

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct ChromiumLauncher {
    settings: BrowserSettings,
}

impl ChromiumLauncher {
    pub const fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, supplier: Supplier) -> PriceWatchResult<Arc<dyn BrowserContext>> {
        let profile = FingerprintProfile::random(&self.settings);
        let (width, height) = profile.viewport;
        let user_data_dir = std::env::temp_dir().join(format!(
            "price-sentinel-{}-{}",
            supplier.slug(),
            uuid::Uuid::new_v4()
        ));

        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Viewport::default()
            })
            .user_data_dir(&user_data_dir)
            .request_timeout(self.settings.navigation_timeout())
            .args(LAUNCH_ARGS.iter().copied())
            .arg(format!("--lang={}", profile.locale));
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder
            .build()
            .map_err(|e| PriceWatchError::browser(format!("Failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| PriceWatchError::browser(format!("Failed to launch browser: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        info!(
            "🌐 Launched isolated browser for {} ({}x{}, {})",
            supplier, width, height, profile.locale
        );

        Ok(Arc::new(ChromiumContext {
            supplier,
            browser: Mutex::new(Some(browser)),
            handler_task,
            profile,
            user_data_dir,
        }))
    }
}

pub struct ChromiumContext {
    supplier: Supplier,
    browser: Mutex<Option<Browser>>,
    handler_task: JoinHandle<()>,
    profile: FingerprintProfile,
    user_data_dir: PathBuf,
}

impl ChromiumContext {
    fn closed(&self) -> PriceWatchError {
        PriceWatchError::browser(format!("browser context for {} is closed", self.supplier))
    }

    /// Fingerprint overrides and the stealth script, applied to every new page
    async fn prepare_page(&self, page: &Page) -> PriceWatchResult<()> {
        let mut user_agent = SetUserAgentOverrideParams::new(self.profile.user_agent.clone());
        user_agent.accept_language = Some(self.profile.accept_language.clone());
        page.execute(user_agent).await.map_err(PriceWatchError::browser)?;

        page.execute(SetLocaleOverrideParams {
            locale: Some(self.profile.locale.clone()),
        })
        .await
        .map_err(PriceWatchError::browser)?;
        page.execute(SetTimezoneOverrideParams::new(self.profile.timezone.clone()))
            .await
            .map_err(PriceWatchError::browser)?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(PriceWatchError::browser)?;
        Ok(())
    }
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn new_page(&self) -> PriceWatchResult<Box<dyn PageHandle>> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or_else(|| self.closed())?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(PriceWatchError::browser)?;
        drop(guard);

        self.prepare_page(&page).await?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn cookies(&self) -> PriceWatchResult<Vec<StoredCookie>> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or_else(|| self.closed())?;
        let cookies = browser.get_cookies().await.map_err(PriceWatchError::browser)?;
        Ok(cookies.into_iter().map(stored_from_cdp).collect())
    }

    async fn add_cookies(&self, cookies: &[StoredCookie]) -> PriceWatchResult<()> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or_else(|| self.closed())?;
        let params = cookies.iter().map(cdp_from_stored).collect();
        browser.set_cookies(params).await.map_err(PriceWatchError::browser)?;
        Ok(())
    }

    async fn close(&self) -> PriceWatchResult<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser for {}: {}", self.supplier, e);
        }
        if let Err(e) = browser.wait().await {
            debug!("Browser process for {} did not exit cleanly: {}", self.supplier, e);
        }
        self.handler_task.abort();

        if let Err(e) = tokio::fs::remove_dir_all(&self.user_data_dir).await {
            debug!("Could not remove profile directory {:?}: {}", self.user_data_dir, e);
        }
        info!("Closed browser context for {}", self.supplier);
        Ok(())
    }
}

fn stored_from_cdp(cookie: Cookie) -> StoredCookie {
    let same_site = cookie.same_site.map(|site| {
        match site {
            CookieSameSite::Strict => "Strict",
            CookieSameSite::Lax => "Lax",
            CookieSameSite::None => "None",
        }
        .to_string()
    });
    StoredCookie {
        name: cookie.name,
        value: cookie.value,
        domain: cookie.domain,
        path: cookie.path,
        expires: (!cookie.session).then_some(cookie.expires),
        http_only: cookie.http_only,
        secure: cookie.secure,
        same_site,
    }
}

fn cdp_from_stored(cookie: &StoredCookie) -> CookieParam {
    let mut param = CookieParam::new(cookie.name.clone(), cookie.value.clone());
    param.domain = Some(cookie.domain.clone());
    param.path = Some(cookie.path.clone());
    param.secure = Some(cookie.secure);
    param.http_only = Some(cookie.http_only);
    param.expires = cookie.expires.map(TimeSinceEpoch::new);
    param.same_site = match cookie.same_site.as_deref() {
        Some("Strict") => Some(CookieSameSite::Strict),
        Some("Lax") => Some(CookieSameSite::Lax),
        Some("None") => Some(CookieSameSite::None),
        _ => None,
    };
    param
}

pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn query_exists(&self, selector: &str) -> PriceWatchResult<bool> {
        let quoted = serde_json::to_string(selector)?;
        let value = self.evaluate(&format!("document.querySelector({quoted}) !== null")).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), NavigationError> {
        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };
        match tokio::time::timeout(timeout, navigation).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(NavigationError::Failed(e.to_string())),
            Err(_) => Err(NavigationError::timeout(timeout)),
        }
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> PriceWatchResult<bool> {
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => Err(PriceWatchError::browser(e)),
            Err(_) => Ok(false),
        }
    }

    async fn current_url(&self) -> PriceWatchResult<String> {
        let url = self.page.url().await.map_err(PriceWatchError::browser)?;
        Ok(url.unwrap_or_default())
    }

    async fn content(&self) -> PriceWatchResult<String> {
        self.page.content().await.map_err(PriceWatchError::browser)
    }

    async fn evaluate(&self, script: &str) -> PriceWatchResult<serde_json::Value> {
        let result = self.page.evaluate(script).await.map_err(PriceWatchError::browser)?;
        Ok(result.into_value().unwrap_or(serde_json::Value::Null))
    }

    async fn fill(&self, selector: &str, text: &str) -> PriceWatchResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(PriceWatchError::browser)?;
        element.click().await.map_err(PriceWatchError::browser)?;
        element.type_str(text).await.map_err(PriceWatchError::browser)?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> PriceWatchResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(PriceWatchError::browser)?;
        element.click().await.map_err(PriceWatchError::browser)?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> PriceWatchResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.query_exists(selector).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn has_element(&self, selector: &str) -> PriceWatchResult<bool> {
        self.query_exists(selector).await
    }

    async fn screenshot(&self, path: &Path) -> PriceWatchResult<()> {
        let png = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(PriceWatchError::browser)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, png).await?;
        Ok(())
    }

    async fn close(&self) -> PriceWatchResult<()> {
        self.page.clone().close().await.map_err(PriceWatchError::browser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_conversion_keeps_attributes() {
        let stored = StoredCookie {
            name: "PrestaShop-abc".into(),
            value: "token".into(),
            domain: ".lca-distribution.com".into(),
            path: "/".into(),
            expires: Some(1_900_000_000.0),
            http_only: true,
            secure: true,
            same_site: Some("Lax".into()),
        };

        let param = cdp_from_stored(&stored);
        assert_eq!(param.name, "PrestaShop-abc");
        assert_eq!(param.domain.as_deref(), Some(".lca-distribution.com"));
        assert_eq!(param.http_only, Some(true));
        assert_eq!(param.same_site, Some(CookieSameSite::Lax));
        assert!(param.expires.is_some());
    }
}
