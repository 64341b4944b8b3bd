use regex::Regex;
use std::sync::LazyLock;

use super::ApiError;

pub const MAX_SUBMISSION_CHARS: usize = 500;

static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._]{5,20}$").unwrap_or_else(|e| panic!("invalid username regex: {e}"))
});

static PASSWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._$%&*#@!]{8,20}$")
        .unwrap_or_else(|e| panic!("invalid password regex: {e}"))
});

pub fn validate_username(username: &str) -> Result<&str, ApiError> {
    if !USERNAME_RE.is_match(username) {
        return Err(ApiError::validation(
            "Username must be 5-20 characters from A-Za-z0-9._",
        ));
    }
    Ok(username)
}

pub fn validate_password(password: &str) -> Result<&str, ApiError> {
    if !PASSWORD_RE.is_match(password) {
        return Err(ApiError::validation(
            "Password must be 8-20 characters from A-Za-z0-9._$%&*#@!",
        ));
    }
    Ok(password)
}

pub fn validate_submission_text(text: &str) -> Result<&str, ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::validation("Text to check cannot be empty"));
    }

    if text.chars().count() > MAX_SUBMISSION_CHARS {
        return Err(ApiError::validation(format!(
            "Text to check must be {} characters or less",
            MAX_SUBMISSION_CHARS
        )));
    }

    Ok(text)
}
