pub mod auth;
pub use auth::{AuthError, AuthService};

pub mod checker;
pub use checker::{CommandSpellChecker, SpellChecker};

pub mod mfa;
pub use mfa::{MfaError, MfaService, MfaState};
