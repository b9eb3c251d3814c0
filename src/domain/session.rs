//! Per-supplier authentication state machine
//!
//! ```text
//! Unauthenticated --LoginAccepted----------> Authenticated
//! Unauthenticated --SecondFactorChallenged-> AwaitingSecondFactor
//! AwaitingSecondFactor --CodeAccepted------> Authenticated
//! AwaitingSecondFactor --CodeRejected------> AwaitingSecondFactor
//! Authenticated --LoggedOutDetected--------> Expired
//! Unauthenticated | Expired --Hydrated-----> Authenticated
//! any --LoginStarted-----------------------> Unauthenticated
//! ```
//!
//! The machine is pure; the session manager drives it and owns the side effects.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Unauthenticated,
    AwaitingSecondFactor,
    Authenticated,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A fresh login attempt begins, discarding whatever came before
    LoginStarted,
    /// The portal landed on its authenticated destination right after the password
    LoginAccepted,
    /// The portal asked for a one-time code
    SecondFactorChallenged,
    /// Credentials were refused
    LoginRejected,
    CodeAccepted,
    CodeRejected,
    /// A scrape saw the login form instead of product content
    LoggedOutDetected,
    /// A browser context was rebuilt from the stored credential bundle
    Hydrated,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid session transition: {event:?} while {from}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub event: SessionEvent,
}

impl SessionState {
    pub fn apply(self, event: SessionEvent) -> Result<Self, InvalidTransition> {
        use SessionEvent as E;
        use SessionState as S;

        let next = match (self, event) {
            (_, E::LoginStarted) => S::Unauthenticated,
            (S::Unauthenticated, E::LoginAccepted) => S::Authenticated,
            (S::Unauthenticated, E::SecondFactorChallenged) => S::AwaitingSecondFactor,
            (S::Unauthenticated, E::LoginRejected) => S::Unauthenticated,
            (S::AwaitingSecondFactor, E::CodeAccepted) => S::Authenticated,
            (S::AwaitingSecondFactor, E::CodeRejected) => S::AwaitingSecondFactor,
            (S::Authenticated, E::LoggedOutDetected) => S::Expired,
            (S::Unauthenticated | S::Expired, E::Hydrated) => S::Authenticated,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }

    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::AwaitingSecondFactor => "awaiting second factor",
            Self::Authenticated => "authenticated",
            Self::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Result of the password step, as seen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub authenticated: bool,
    #[serde(rename = "awaiting2FA")]
    pub awaiting_second_factor: bool,
}

impl LoginOutcome {
    pub const AUTHENTICATED: Self = Self {
        authenticated: true,
        awaiting_second_factor: false,
    };
    pub const AWAITING_SECOND_FACTOR: Self = Self {
        authenticated: false,
        awaiting_second_factor: true,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionEvent as E;
    use SessionState as S;

    #[test]
    fn password_step_branches_on_challenge() {
        assert_eq!(S::Unauthenticated.apply(E::LoginAccepted), Ok(S::Authenticated));
        assert_eq!(
            S::Unauthenticated.apply(E::SecondFactorChallenged),
            Ok(S::AwaitingSecondFactor)
        );
        assert_eq!(S::Unauthenticated.apply(E::LoginRejected), Ok(S::Unauthenticated));
    }

    #[test]
    fn rejected_code_keeps_waiting() {
        let state = S::AwaitingSecondFactor.apply(E::CodeRejected).unwrap();
        assert_eq!(state, S::AwaitingSecondFactor);
        assert_eq!(state.apply(E::CodeAccepted), Ok(S::Authenticated));
    }

    #[test]
    fn expiry_then_relogin_cycle() {
        let expired = S::Authenticated.apply(E::LoggedOutDetected).unwrap();
        assert_eq!(expired, S::Expired);
        assert_eq!(expired.apply(E::LoginStarted), Ok(S::Unauthenticated));
        assert_eq!(expired.apply(E::Hydrated), Ok(S::Authenticated));
    }

    #[test]
    fn impossible_transitions_are_rejected() {
        assert!(S::Unauthenticated.apply(E::CodeAccepted).is_err());
        assert!(S::Expired.apply(E::LoggedOutDetected).is_err());
        assert!(S::AwaitingSecondFactor.apply(E::Hydrated).is_err());
        let err = S::Authenticated.apply(E::SecondFactorChallenged).unwrap_err();
        assert_eq!(err.from, S::Authenticated);
    }

    #[test]
    fn login_outcome_serializes_for_the_ui() {
        let json = serde_json::to_value(LoginOutcome::AWAITING_SECOND_FACTOR).unwrap();
        assert_eq!(json["awaiting2FA"], true);
        assert_eq!(json["authenticated"], false);
    }
}
