use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures of the credential authority.
///
/// Credential failures carry no detail on purpose: an unknown user and a wrong
/// password are the same [`AuthError::IncorrectCredentials`].
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user or wrong password.
    #[error("Incorrect username or password")]
    IncorrectCredentials,
    /// The user targeted by an operation does not exist.
    #[error("User not found")]
    NotFound,
    /// Signup with a username already in use.
    #[error("username '{0}' already exists")]
    UsernameTaken(String),
    /// Signup with an empty username.
    #[error("username must not be empty")]
    InvalidUsername,
    /// The account that receives deleted users' content cannot be deleted.
    #[error("this account cannot be deleted")]
    ProtectedAccount,
    /// The user or content store failed.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    /// The password hash function failed; usually bad work factor settings.
    #[error("password hashing failed: {0}")]
    Configuration(String),
}

impl AuthError {
    /// HTTP status the error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::IncorrectCredentials => StatusCode::UNAUTHORIZED,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::UsernameTaken(_) | AuthError::InvalidUsername => StatusCode::BAD_REQUEST,
            AuthError::ProtectedAccount => StatusCode::FORBIDDEN,
            AuthError::Storage(_) | AuthError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the client. Storage and hashing failures are
    /// logged here and reduced to a generic text.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Storage(e) => {
                tracing::error!("storage error: {}", e);
                "Server database error".to_string()
            }
            AuthError::Configuration(e) => {
                tracing::error!("password hashing failed: {}", e);
                "Server error".to_string()
            }
            e => e.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
