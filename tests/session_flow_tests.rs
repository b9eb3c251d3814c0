//! Tests for the login / second-factor protocol and vault hydration
use price_sentinel_lib::domain::{PriceWatchError, SessionState, Supplier};
use price_sentinel_lib::test_utils::{TestContext, session_cookie};

const EMAIL: &str = "achats@boutique.fr";
const PASSWORD: &str = "correct horse";

#[tokio::test]
async fn login_without_second_factor_stores_the_session() {
    let ctx = TestContext::new(1).unwrap();
    ctx.site.portal_login(Supplier::Kmls, EMAIL, PASSWORD, None);

    let outcome = ctx.sessions.start_login(Supplier::Kmls, EMAIL, PASSWORD).await.unwrap();

    assert!(outcome.authenticated);
    assert!(!outcome.awaiting_second_factor);
    assert_eq!(ctx.sessions.state(Supplier::Kmls).await.unwrap(), SessionState::Authenticated);
    assert!(ctx.vault.has_bundle(Supplier::Kmls).await);
    assert_eq!(ctx.vault.load(Supplier::Kmls).await.unwrap(), vec![session_cookie(Supplier::Kmls)]);
    assert_eq!(ctx.site.open_pages(), 0, "login page must be closed");
    assert_eq!(ctx.site.open_contexts(), 1, "authenticated context stays live");
}

#[tokio::test]
async fn second_factor_can_be_retried_after_a_wrong_code() {
    let ctx = TestContext::new(1).unwrap();
    ctx.site.portal_login(Supplier::Lca, EMAIL, PASSWORD, Some("482913"));

    let outcome = ctx.sessions.start_login(Supplier::Lca, EMAIL, PASSWORD).await.unwrap();
    assert!(!outcome.authenticated);
    assert!(outcome.awaiting_second_factor);
    assert_eq!(
        ctx.sessions.state(Supplier::Lca).await.unwrap(),
        SessionState::AwaitingSecondFactor
    );
    let ticket = ctx.sessions.pending_challenge(Supplier::Lca).await.unwrap();
    assert!(!ctx.vault.has_bundle(Supplier::Lca).await);

    let err = ctx.sessions.submit_second_factor(Supplier::Lca, "000000").await.unwrap_err();
    assert!(matches!(err, PriceWatchError::InvalidSecondFactor { supplier: Supplier::Lca }));
    assert!(err.is_retryable_by_caller());
    assert_eq!(
        ctx.sessions.state(Supplier::Lca).await.unwrap(),
        SessionState::AwaitingSecondFactor
    );
    assert_eq!(ctx.sessions.pending_challenge(Supplier::Lca).await, Some(ticket));

    let outcome = ctx.sessions.submit_second_factor(Supplier::Lca, " 482913 ").await.unwrap();
    assert!(outcome.authenticated);
    assert_eq!(ctx.sessions.state(Supplier::Lca).await.unwrap(), SessionState::Authenticated);
    assert_eq!(ctx.sessions.pending_challenge(Supplier::Lca).await, None);
    assert!(ctx.vault.has_bundle(Supplier::Lca).await);
    assert_eq!(ctx.site.open_pages(), 0);
}

#[tokio::test]
async fn kmls_second_factor_page_is_not_mistaken_for_success() {
    let ctx = TestContext::new(1).unwrap();
    ctx.site.portal_login(Supplier::Kmls, EMAIL, PASSWORD, Some("1234"));

    let outcome = ctx.sessions.start_login(Supplier::Kmls, EMAIL, PASSWORD).await.unwrap();
    assert!(outcome.awaiting_second_factor);

    let outcome = ctx.sessions.submit_second_factor(Supplier::Kmls, "1234").await.unwrap();
    assert!(outcome.authenticated);
    assert!(ctx.vault.has_bundle(Supplier::Kmls).await);
}

#[tokio::test]
async fn empty_code_is_rejected_without_touching_the_page() {
    let ctx = TestContext::new(1).unwrap();
    ctx.site.portal_login(Supplier::Lca, EMAIL, PASSWORD, Some("482913"));
    ctx.sessions.start_login(Supplier::Lca, EMAIL, PASSWORD).await.unwrap();
    let visits = ctx.site.visits().len();

    let err = ctx.sessions.submit_second_factor(Supplier::Lca, "   ").await.unwrap_err();

    assert!(matches!(err, PriceWatchError::InvalidSecondFactor { .. }));
    assert_eq!(ctx.site.visits().len(), visits);
    assert!(ctx.sessions.pending_challenge(Supplier::Lca).await.is_some());
}

#[tokio::test]
async fn wrong_password_is_an_authentication_failure() {
    let ctx = TestContext::new(1).unwrap();
    ctx.site.portal_login(Supplier::Lca, EMAIL, PASSWORD, None);

    let err = ctx.sessions.start_login(Supplier::Lca, EMAIL, "hunter2").await.unwrap_err();

    assert!(matches!(err, PriceWatchError::AuthenticationFailed { supplier: Supplier::Lca, .. }));
    assert_eq!(ctx.sessions.state(Supplier::Lca).await.unwrap(), SessionState::Unauthenticated);
    assert!(!ctx.vault.has_bundle(Supplier::Lca).await);
    assert_eq!(ctx.site.open_pages(), 0);
    assert_eq!(ctx.site.open_contexts(), 0);
}

#[tokio::test]
async fn code_without_pending_challenge_is_refused() {
    let ctx = TestContext::new(1).unwrap();

    let err = ctx.sessions.submit_second_factor(Supplier::Kmls, "1234").await.unwrap_err();

    assert!(matches!(err, PriceWatchError::NoPendingChallenge { supplier: Supplier::Kmls }));
}

#[tokio::test]
async fn restarting_login_discards_the_open_challenge() {
    let ctx = TestContext::new(1).unwrap();
    ctx.site.portal_login(Supplier::Lca, EMAIL, PASSWORD, Some("482913"));

    ctx.sessions.start_login(Supplier::Lca, EMAIL, PASSWORD).await.unwrap();
    let first = ctx.sessions.pending_challenge(Supplier::Lca).await.unwrap();
    ctx.sessions.start_login(Supplier::Lca, EMAIL, PASSWORD).await.unwrap();
    let second = ctx.sessions.pending_challenge(Supplier::Lca).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(ctx.site.open_pages(), 1);
    assert_eq!(ctx.site.open_contexts(), 1);
}

#[tokio::test]
async fn stored_bundle_hydrates_a_fresh_context_once() {
    let ctx = TestContext::new(1).unwrap();
    ctx.seed_session(Supplier::Lca).await.unwrap();

    ctx.sessions.context(Supplier::Lca).await.unwrap();
    ctx.sessions.context(Supplier::Lca).await.unwrap();

    assert_eq!(ctx.sessions.state(Supplier::Lca).await.unwrap(), SessionState::Authenticated);
    assert_eq!(ctx.site.launches(), vec![Supplier::Lca]);
    assert_eq!(ctx.site.hydrated_cookies(Supplier::Lca), vec![session_cookie(Supplier::Lca)]);
}

#[tokio::test]
async fn missing_bundle_means_not_authenticated() {
    let ctx = TestContext::new(1).unwrap();

    let err = ctx.sessions.context(Supplier::Kmls).await.err().unwrap();

    assert!(matches!(err, PriceWatchError::NotAuthenticated(Supplier::Kmls)));
    assert!(ctx.site.launches().is_empty());
}

#[tokio::test]
async fn awaiting_second_factor_is_not_usable_for_scraping() {
    let ctx = TestContext::new(1).unwrap();
    ctx.site.portal_login(Supplier::Kmls, EMAIL, PASSWORD, Some("1234"));
    ctx.sessions.start_login(Supplier::Kmls, EMAIL, PASSWORD).await.unwrap();

    let err = ctx.sessions.context(Supplier::Kmls).await.err().unwrap();

    assert!(err.is_session_loss());
}

#[tokio::test]
async fn logged_out_report_expires_and_invalidates() {
    let ctx = TestContext::new(1).unwrap();
    ctx.seed_session(Supplier::Kmls).await.unwrap();
    ctx.sessions.context(Supplier::Kmls).await.unwrap();

    ctx.sessions.report_logged_out(Supplier::Kmls).await.unwrap();

    assert_eq!(ctx.sessions.state(Supplier::Kmls).await.unwrap(), SessionState::Expired);
    assert!(!ctx.vault.has_bundle(Supplier::Kmls).await);
    assert_eq!(ctx.site.open_contexts(), 0);
    let err = ctx.sessions.context(Supplier::Kmls).await.err().unwrap();
    assert!(matches!(err, PriceWatchError::NotAuthenticated(Supplier::Kmls)));
}

#[tokio::test]
async fn logout_forgets_the_session() {
    let ctx = TestContext::new(1).unwrap();
    ctx.site.portal_login(Supplier::Kmls, EMAIL, PASSWORD, None);
    ctx.sessions.start_login(Supplier::Kmls, EMAIL, PASSWORD).await.unwrap();

    ctx.sessions.logout(Supplier::Kmls).await.unwrap();

    assert_eq!(ctx.sessions.state(Supplier::Kmls).await.unwrap(), SessionState::Unauthenticated);
    assert!(!ctx.vault.has_bundle(Supplier::Kmls).await);
    assert_eq!(ctx.site.open_contexts(), 0);
}

#[tokio::test]
async fn shutdown_closes_contexts_but_keeps_bundles() {
    let ctx = TestContext::new(1).unwrap();
    ctx.seed_all_sessions().await.unwrap();
    ctx.sessions.context(Supplier::Lca).await.unwrap();
    ctx.sessions.context(Supplier::Kmls).await.unwrap();

    ctx.sessions.shutdown().await;

    assert_eq!(ctx.site.open_contexts(), 0);
    assert!(ctx.vault.has_bundle(Supplier::Lca).await);
    assert!(ctx.vault.has_bundle(Supplier::Kmls).await);
    ctx.sessions.context(Supplier::Lca).await.unwrap();
    assert_eq!(ctx.site.launches().len(), 3);
}
