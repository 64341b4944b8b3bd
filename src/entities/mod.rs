pub mod prelude;

pub mod auth_log;
pub mod mfa_credentials;
pub mod spell_checks;
pub mod users;
