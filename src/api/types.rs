use serde::{Deserialize, Serialize};

use crate::db::{AuthLogEntry, Submission};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthLogDto {
    pub id: i32,
    pub user_id: i32,
    pub username: String,
    pub login_time: String,
    pub logout_time: Option<String>,
}

impl From<AuthLogEntry> for AuthLogDto {
    fn from(entry: AuthLogEntry) -> Self {
        Self {
            id: entry.id,
            user_id: entry.user_id,
            username: entry.username,
            login_time: entry.login_time,
            logout_time: entry.logout_time,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmissionDto {
    pub id: i32,
    pub username: String,
    pub submitted_text: String,
    pub misspelled_words: String,
}

impl From<Submission> for SubmissionDto {
    fn from(submission: Submission) -> Self {
        Self {
            id: submission.id,
            username: submission.username,
            submitted_text: submission.submitted_text,
            misspelled_words: submission.misspelled_words,
        }
    }
}
