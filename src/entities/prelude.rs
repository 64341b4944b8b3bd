pub use super::auth_log::Entity as AuthLog;
pub use super::mfa_credentials::Entity as MfaCredentials;
pub use super::spell_checks::Entity as SpellChecks;
pub use super::users::Entity as Users;
