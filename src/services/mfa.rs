//! TOTP enrollment state machine and code verification.
//!
//! Enrollment state is derived from two pieces of storage: the
//! `mfa_registered` flag on the user row and the presence of a credential
//! row. The flag flips to true only on confirmed setup, so a credential row
//! without the flag is a pending enrollment.

use thiserror::Error;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::db::{Store, User};

/// RFC 6238 defaults: SHA1, 6 digits, 30 second step.
const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;

/// Accepted clock-skew window: one step either side of now (±30 s).
const TOTP_SKEW_STEPS: u8 = 1;

#[derive(Debug, Error)]
pub enum MfaError {
    #[error("MFA is already enrolled")]
    AlreadyEnrolled,

    #[error("No MFA setup is pending")]
    NoPendingSetup,

    #[error("MFA is not enrolled")]
    NotEnrolled,

    /// Enrollment flag set but no credential row stored. Must never be
    /// treated as either "wrong code" or "not enrolled".
    #[error("Corrupt MFA state: enrollment flag set but no credential stored")]
    CorruptState,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MfaState {
    Unenrolled,
    PendingSetup,
    Enrolled,
}

#[derive(Clone)]
pub struct MfaService {
    store: Store,
    issuer: String,
}

impl MfaService {
    #[must_use]
    pub fn new(store: Store, issuer: String) -> Self {
        Self { store, issuer }
    }

    pub async fn state(&self, user: &User) -> Result<MfaState, MfaError> {
        let secret = self.store.get_mfa_secret(&user.username).await?;

        match (user.mfa_registered, secret) {
            (false, None) => Ok(MfaState::Unenrolled),
            (false, Some(_)) => Ok(MfaState::PendingSetup),
            (true, Some(_)) => Ok(MfaState::Enrolled),
            (true, None) => Err(MfaError::CorruptState),
        }
    }

    /// Start (or restart) enrollment: generate a fresh random secret and
    /// persist it as the pending credential. Re-invocation while pending
    /// replaces the secret rather than accumulating stale ones. Returns the
    /// base32 secret for the provisioning aid.
    pub async fn begin_setup(&self, user: &User) -> Result<String, MfaError> {
        match self.state(user).await? {
            MfaState::Enrolled => return Err(MfaError::AlreadyEnrolled),
            MfaState::Unenrolled | MfaState::PendingSetup => {}
        }

        // 160-bit secret; totp-rs refuses anything under 128 bits.
        let secret = Secret::generate_secret().to_encoded().to_string();
        self.store
            .replace_mfa_secret(&user.username, &secret)
            .await?;

        Ok(secret)
    }

    /// Finish enrollment. Confirmed flips the user flag; declined discards
    /// the pending credential entirely. Returns whether the user ended up
    /// enrolled.
    pub async fn confirm_setup(&self, user: &User, confirmed: bool) -> Result<bool, MfaError> {
        match self.state(user).await? {
            MfaState::PendingSetup => {}
            MfaState::Enrolled => return Err(MfaError::AlreadyEnrolled),
            MfaState::Unenrolled => return Err(MfaError::NoPendingSetup),
        }

        if confirmed {
            self.store.set_mfa_registered(&user.username, true).await?;
            Ok(true)
        } else {
            self.store.delete_mfa_secret(&user.username).await?;
            Ok(false)
        }
    }

    /// Disable MFA: clear the flag, then delete the credential. The flag is
    /// cleared first so a failure between the two writes leaves pending
    /// state (flag down, row present), never the corrupt flag-up/no-row
    /// combination. Re-enabling later generates a new secret, so previously
    /// issued codes stay dead.
    pub async fn disable(&self, user: &User) -> Result<(), MfaError> {
        match self.state(user).await? {
            MfaState::Enrolled => {}
            MfaState::Unenrolled | MfaState::PendingSetup => return Err(MfaError::NotEnrolled),
        }

        self.store.set_mfa_registered(&user.username, false).await?;
        self.store.delete_mfa_secret(&user.username).await?;

        Ok(())
    }

    /// Check a submitted code against the enrolled credential, tolerating
    /// ±1 time step of clock skew.
    pub async fn verify_code(&self, user: &User, code: &str) -> Result<bool, MfaError> {
        if !user.mfa_registered {
            return Err(MfaError::NotEnrolled);
        }

        let secret = self
            .store
            .get_mfa_secret(&user.username)
            .await?
            .ok_or(MfaError::CorruptState)?;

        let totp = self.totp_for(&user.username, &secret)?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    /// The `otpauth://totp/...` enrollment URI. Only available while setup is
    /// pending; after enrollment the secret is never disclosed again.
    pub async fn provisioning_uri(&self, user: &User) -> Result<String, MfaError> {
        let secret = self.pending_secret(user).await?;
        let totp = self.totp_for(&user.username, &secret)?;
        Ok(totp.get_url())
    }

    /// PNG-encoded QR of the provisioning URI, same availability rules.
    pub async fn qr_png(&self, user: &User) -> Result<Vec<u8>, MfaError> {
        let secret = self.pending_secret(user).await?;
        let totp = self.totp_for(&user.username, &secret)?;
        totp.get_qr_png()
            .map_err(|e| MfaError::Internal(anyhow::anyhow!("QR generation failed: {e}")))
    }

    async fn pending_secret(&self, user: &User) -> Result<String, MfaError> {
        match self.state(user).await? {
            MfaState::PendingSetup => {}
            MfaState::Enrolled => return Err(MfaError::AlreadyEnrolled),
            MfaState::Unenrolled => return Err(MfaError::NoPendingSetup),
        }

        self.store
            .get_mfa_secret(&user.username)
            .await?
            .ok_or(MfaError::CorruptState)
    }

    fn totp_for(&self, username: &str, secret_base32: &str) -> Result<TOTP, MfaError> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| anyhow::anyhow!("Invalid stored MFA secret: {e:?}"))?;

        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW_STEPS,
            TOTP_STEP_SECONDS,
            secret_bytes,
            Some(self.issuer.clone()),
            username.to_string(),
        )
        .map_err(|e| MfaError::Internal(anyhow::anyhow!("TOTP init error: {e}")))
    }
}
