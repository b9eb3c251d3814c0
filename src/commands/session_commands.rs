//! Login, second-factor and session status commands

use tracing::{info, warn};

use crate::application::AppState;
use crate::application::dto::{SessionStatusDto, StartLoginDto, SubmitSecondFactorDto};
use crate::domain::{LoginOutcome, Supplier};

/// Password step. Returns `{authenticated, awaiting2FA}`.
pub async fn start_login(state: &AppState, request: StartLoginDto) -> Result<LoginOutcome, String> {
    info!("Login requested for {}", request.supplier);
    state
        .sessions
        .start_login(request.supplier, &request.email, &request.password)
        .await
        .map_err(|e| {
            warn!("Login for {} failed: {}", request.supplier, e);
            e.to_string()
        })
}

/// Second-factor step. A rejected code may be resubmitted.
pub async fn submit_second_factor(state: &AppState, request: SubmitSecondFactorDto) -> Result<LoginOutcome, String> {
    state
        .sessions
        .submit_second_factor(request.supplier, &request.code)
        .await
        .map_err(|e| e.to_string())
}

/// Which suppliers have a stored session bundle
pub async fn session_status(state: &AppState) -> Result<SessionStatusDto, String> {
    let vault = state.sessions.vault();
    let lca = vault.has_bundle(Supplier::Lca).await;
    let kmls = vault.has_bundle(Supplier::Kmls).await;
    Ok(SessionStatusDto::new(lca, kmls))
}

pub async fn logout(state: &AppState, supplier: Supplier) -> Result<(), String> {
    state.sessions.logout(supplier).await.map_err(|e| e.to_string())
}
