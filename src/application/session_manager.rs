//! Session manager: owns one authentication state machine and one browser
//! context per supplier, and drives the login / second-factor protocol.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{
    LoginOutcome, PriceWatchError, PriceWatchResult, SessionEvent, SessionState, Supplier,
};
use crate::infrastructure::browser::{BrowserContext, BrowserLauncher, HumanPacer, PageHandle};
use crate::infrastructure::config::BrowserSettings;
use crate::infrastructure::portals::{self, LoginClassification, PortalProfile};
use crate::infrastructure::vault::CredentialVault;

/// A second-factor challenge waiting for its code. The login page stays open.
struct PendingChallenge {
    ticket: Uuid,
    issued_at: DateTime<Utc>,
    page: Box<dyn PageHandle>,
}

struct SupplierSession {
    supplier: Supplier,
    state: SessionState,
    context: Option<Arc<dyn BrowserContext>>,
    pending: Option<PendingChallenge>,
}

impl SupplierSession {
    const fn new(supplier: Supplier) -> Self {
        Self {
            supplier,
            state: SessionState::Unauthenticated,
            context: None,
            pending: None,
        }
    }

    fn apply(&mut self, event: SessionEvent) -> PriceWatchResult<SessionState> {
        let next = self
            .state
            .apply(event)
            .map_err(|source| PriceWatchError::SessionTransition {
                supplier: self.supplier,
                source,
            })?;
        if next != self.state {
            debug!("{} session: {} -> {} ({:?})", self.supplier, self.state, next, event);
        }
        self.state = next;
        Ok(next)
    }

    /// Close the pending challenge page and the live context, if any
    async fn release(&mut self) {
        if let Some(pending) = self.pending.take() {
            if let Err(e) = pending.page.close().await {
                warn!("Failed to close {} challenge page: {}", self.supplier, e);
            }
        }
        if let Some(context) = self.context.take() {
            if let Err(e) = context.close().await {
                warn!("Failed to close {} browser context: {}", self.supplier, e);
            }
        }
    }
}

pub struct SessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    vault: Arc<CredentialVault>,
    settings: BrowserSettings,
    pacer: HumanPacer,
    sessions: HashMap<Supplier, Mutex<SupplierSession>>,
    scrape_turns: HashMap<Supplier, Mutex<()>>,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, vault: Arc<CredentialVault>, settings: BrowserSettings) -> Self {
        let sessions = Supplier::ALL
            .iter()
            .map(|s| (*s, Mutex::new(SupplierSession::new(*s))))
            .collect();
        let scrape_turns = Supplier::ALL.iter().map(|s| (*s, Mutex::new(()))).collect();
        Self {
            launcher,
            pacer: HumanPacer::new(&settings),
            vault,
            settings,
            sessions,
            scrape_turns,
        }
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    async fn session(&self, supplier: Supplier) -> PriceWatchResult<MutexGuard<'_, SupplierSession>> {
        let session = self
            .sessions
            .get(&supplier)
            .ok_or_else(|| PriceWatchError::configuration("supplier", format!("{supplier} is not managed")))?;
        Ok(session.lock().await)
    }

    /// Exclusive turn on a supplier's context. Scrapes against one context run one at a time.
    pub async fn scrape_turn(&self, supplier: Supplier) -> PriceWatchResult<MutexGuard<'_, ()>> {
        let turn = self
            .scrape_turns
            .get(&supplier)
            .ok_or_else(|| PriceWatchError::configuration("supplier", format!("{supplier} is not managed")))?;
        Ok(turn.lock().await)
    }

    pub async fn state(&self, supplier: Supplier) -> PriceWatchResult<SessionState> {
        Ok(self.session(supplier).await?.state)
    }

    /// Ticket of the pending second-factor challenge, if one is open
    pub async fn pending_challenge(&self, supplier: Supplier) -> Option<Uuid> {
        let session = self.session(supplier).await.ok()?;
        session.pending.as_ref().map(|p| p.ticket)
    }

    /// Password step of the login protocol.
    ///
    /// Any previous context for the supplier is closed first. On
    /// `awaiting2FA` the login page stays open for [`Self::submit_second_factor`].
    pub async fn start_login(&self, supplier: Supplier, email: &str, password: &str) -> PriceWatchResult<LoginOutcome> {
        let mut session = self.session(supplier).await?;
        session.release().await;
        session.apply(SessionEvent::LoginStarted)?;

        info!("🔐 Starting {} login", supplier);
        let context = self.launcher.launch(supplier).await?;
        let page = match context.new_page().await {
            Ok(page) => page,
            Err(e) => {
                close_context(supplier, context.as_ref()).await;
                return Err(e);
            }
        };

        let portal = portals::profile(supplier);
        let classification = match self.submit_password(portal, page.as_ref(), email, password).await {
            Ok(classification) => classification,
            Err(e) => {
                error!("{} login flow failed: {}", supplier, e);
                close_page(supplier, page.as_ref()).await;
                close_context(supplier, context.as_ref()).await;
                return Err(e);
            }
        };

        match classification {
            LoginClassification::Authenticated => {
                close_page(supplier, page.as_ref()).await;
                session.context = Some(context);
                if let Err(e) = self.persist(&mut session).await {
                    session.release().await;
                    return Err(e);
                }
                session.apply(SessionEvent::LoginAccepted)?;
                info!("✅ {} authenticated without second factor", supplier);
                Ok(LoginOutcome::AUTHENTICATED)
            }
            LoginClassification::SecondFactorRequired => {
                let ticket = Uuid::new_v4();
                session.context = Some(context);
                session.pending = Some(PendingChallenge {
                    ticket,
                    issued_at: Utc::now(),
                    page,
                });
                session.apply(SessionEvent::SecondFactorChallenged)?;
                info!("📨 {} requested a second-factor code (challenge {})", supplier, ticket);
                Ok(LoginOutcome::AWAITING_SECOND_FACTOR)
            }
            LoginClassification::Rejected => {
                close_page(supplier, page.as_ref()).await;
                close_context(supplier, context.as_ref()).await;
                session.apply(SessionEvent::LoginRejected)?;
                warn!("❌ {} rejected the credentials", supplier);
                Err(PriceWatchError::AuthenticationFailed {
                    supplier,
                    reason: "the portal kept the login form after submission".to_string(),
                })
            }
        }
    }

    async fn submit_password(
        &self,
        portal: &PortalProfile,
        page: &dyn PageHandle,
        email: &str,
        password: &str,
    ) -> PriceWatchResult<LoginClassification> {
        page.goto(portal.login_url, self.settings.navigation_timeout()).await?;
        self.pacer.settle().await;

        if !page
            .wait_for_selector(portal.email_selector, self.settings.navigation_timeout())
            .await?
        {
            return Err(PriceWatchError::AuthenticationFailed {
                supplier: portal.supplier,
                reason: "login form not found".to_string(),
            });
        }

        page.fill(portal.email_selector, email).await?;
        self.pacer.between_actions().await;
        page.fill(portal.password_selector, password).await?;
        self.pacer.between_actions().await;
        page.click(portal.submit_selector).await?;

        if !page.wait_for_navigation(self.settings.navigation_timeout()).await? {
            debug!("{} login submit did not navigate", portal.supplier);
        }
        self.pacer.after_submit().await;

        let landed = page.current_url().await?;
        if portal.is_authenticated_destination(&landed) {
            return Ok(LoginClassification::Authenticated);
        }

        let code_prompt = page
            .wait_for_selector(portal.code_input_selector, self.settings.second_factor_timeout())
            .await?;
        let password_field = page.has_element(portal.password_selector).await?;
        let final_url = page.current_url().await?;
        Ok(portal.classify_login(&final_url, code_prompt, password_field))
    }

    /// Second-factor step. A rejected code leaves the challenge open for another try.
    pub async fn submit_second_factor(&self, supplier: Supplier, code: &str) -> PriceWatchResult<LoginOutcome> {
        let mut session = self.session(supplier).await?;
        if session.state != SessionState::AwaitingSecondFactor || session.pending.is_none() {
            return Err(PriceWatchError::NoPendingChallenge { supplier });
        }

        let code = code.trim();
        if code.is_empty() {
            session.apply(SessionEvent::CodeRejected)?;
            return Err(PriceWatchError::InvalidSecondFactor { supplier });
        }

        let portal = portals::profile(supplier);
        let accepted = match &session.pending {
            Some(pending) => {
                debug!(
                    "Submitting {} code for challenge {} (issued {})",
                    supplier, pending.ticket, pending.issued_at
                );
                self.submit_code(portal, pending.page.as_ref(), code).await?
            }
            None => return Err(PriceWatchError::NoPendingChallenge { supplier }),
        };

        if !accepted {
            session.apply(SessionEvent::CodeRejected)?;
            warn!("❌ {} rejected the second-factor code", supplier);
            return Err(PriceWatchError::InvalidSecondFactor { supplier });
        }

        if let Some(pending) = session.pending.take() {
            close_page(supplier, pending.page.as_ref()).await;
        }
        if let Err(e) = self.persist(&mut session).await {
            session.release().await;
            session.apply(SessionEvent::LoginStarted)?;
            return Err(e);
        }
        session.apply(SessionEvent::CodeAccepted)?;
        info!("✅ {} authenticated after second factor", supplier);
        Ok(LoginOutcome::AUTHENTICATED)
    }

    async fn submit_code(&self, portal: &PortalProfile, page: &dyn PageHandle, code: &str) -> PriceWatchResult<bool> {
        page.fill(portal.code_input_selector, code).await?;
        self.pacer.between_actions().await;
        page.click(portal.code_submit_selector).await?;
        page.wait_for_navigation(self.settings.navigation_timeout()).await?;
        self.pacer.after_submit().await;

        let landed = page.current_url().await?;
        Ok(portal.is_authenticated_destination(&landed))
    }

    /// Save the live context's cookies to the vault
    async fn persist(&self, session: &mut SupplierSession) -> PriceWatchResult<()> {
        let Some(context) = &session.context else {
            return Err(PriceWatchError::NotAuthenticated(session.supplier));
        };
        let cookies = context.cookies().await?;
        self.vault.store(session.supplier, &cookies).await
    }

    /// Authenticated browser context for a supplier.
    ///
    /// Without a live context the stored bundle is replayed into a fresh one and
    /// the session is marked authenticated; the first scrape verifies it.
    pub async fn context(&self, supplier: Supplier) -> PriceWatchResult<Arc<dyn BrowserContext>> {
        let mut session = self.session(supplier).await?;
        match session.state {
            SessionState::Authenticated => {
                if let Some(context) = &session.context {
                    return Ok(Arc::clone(context));
                }
                // Authenticated without a context: rebuild from the vault
                session.apply(SessionEvent::LoginStarted)?;
            }
            SessionState::AwaitingSecondFactor => return Err(PriceWatchError::NotAuthenticated(supplier)),
            SessionState::Unauthenticated | SessionState::Expired => {}
        }

        let cookies = match self.vault.load(supplier).await {
            Ok(cookies) => cookies,
            Err(PriceWatchError::CredentialNotFound(_)) => return Err(PriceWatchError::NotAuthenticated(supplier)),
            Err(e) => return Err(e),
        };

        let context = self.launcher.launch(supplier).await?;
        if let Err(e) = context.add_cookies(&cookies).await {
            close_context(supplier, context.as_ref()).await;
            return Err(e);
        }
        session.context = Some(Arc::clone(&context));
        session.apply(SessionEvent::Hydrated)?;
        info!("♻️ Restored {} session from the vault ({} cookies)", supplier, cookies.len());
        Ok(context)
    }

    /// A scrape saw the login form: expire the session and drop its stored bundle
    pub async fn report_logged_out(&self, supplier: Supplier) -> PriceWatchResult<()> {
        let mut session = self.session(supplier).await?;
        if session.state == SessionState::Authenticated {
            session.apply(SessionEvent::LoggedOutDetected)?;
            session.release().await;
            warn!("🔒 {} session expired, log in again", supplier);
        }
        self.vault.invalidate(supplier).await
    }

    /// Forget a supplier's session entirely
    pub async fn logout(&self, supplier: Supplier) -> PriceWatchResult<()> {
        let mut session = self.session(supplier).await?;
        session.release().await;
        session.apply(SessionEvent::LoginStarted)?;
        self.vault.invalidate(supplier).await?;
        info!("👋 Logged out of {}", supplier);
        Ok(())
    }

    /// Close every live context and pending challenge page
    pub async fn shutdown(&self) {
        for supplier in Supplier::ALL {
            if let Ok(mut session) = self.session(supplier).await {
                session.release().await;
                // A later context() call re-hydrates from the vault
                if let Err(e) = session.apply(SessionEvent::LoginStarted) {
                    warn!("{}", e);
                }
            }
        }
        debug!("Session manager shut down");
    }
}

async fn close_page(supplier: Supplier, page: &dyn PageHandle) {
    if let Err(e) = page.close().await {
        warn!("Failed to close {} login page: {}", supplier, e);
    }
}

async fn close_context(supplier: Supplier, context: &dyn BrowserContext) {
    if let Err(e) = context.close().await {
        warn!("Failed to close {} browser context: {}", supplier, e);
    }
}
