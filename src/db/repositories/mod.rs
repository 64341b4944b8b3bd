pub mod auth_log;
pub mod mfa;
pub mod spell_check;
pub mod user;
