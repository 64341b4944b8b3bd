//! Credential verification for login.
//!
//! Failures are distinguished internally (password factor vs. MFA factor vs.
//! corrupt state) but the API layer collapses each factor to one generic
//! message so responses never reveal whether a username exists or which
//! factor was wrong.

use thiserror::Error;

use crate::db::{Store, User};
use crate::services::mfa::{MfaError, MfaService};

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown username or wrong password; intentionally indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Password was right but the MFA code was absent or wrong.
    #[error("Two-factor authentication failure")]
    MfaFailed,

    /// mfa_registered set but no credential stored; fatal for the request.
    #[error("Corrupt MFA state")]
    CorruptState,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<MfaError> for AuthError {
    fn from(err: MfaError) -> Self {
        match err {
            MfaError::CorruptState => Self::CorruptState,
            other => Self::Internal(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    store: Store,
    mfa: MfaService,
}

impl AuthService {
    #[must_use]
    pub fn new(store: Store, mfa: MfaService) -> Self {
        Self { store, mfa }
    }

    /// Verify both factors. The MFA code is only consulted when the user is
    /// enrolled; non-digit characters in the submitted code are stripped
    /// before comparison. No session or audit state is touched here.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        code: Option<&str>,
    ) -> Result<User, AuthError> {
        let password_ok = self.store.verify_user_password(username, password).await?;
        if !password_ok {
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .store
            .get_user_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if user.mfa_registered {
            // Corrupt storage (flag set, no credential) must surface before
            // the submitted code is judged, never as a code failure.
            self.mfa.state(&user).await?;

            let digits: String = code
                .unwrap_or("")
                .chars()
                .filter(char::is_ascii_digit)
                .collect();

            if digits.is_empty() {
                return Err(AuthError::MfaFailed);
            }

            if !self.mfa.verify_code(&user, &digits).await? {
                return Err(AuthError::MfaFailed);
            }
        }

        Ok(user)
    }
}
