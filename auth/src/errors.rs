use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use strategyforge_config::ConfigError;
use strategyforge_database::StoreError;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid email address")]
    InvalidEmail,

    #[error("password does not meet requirements: {0}")]
    WeakPassword(String),

    #[error("name must be between 2 and 100 characters")]
    InvalidName,

    #[error("an account with this email already exists")]
    DuplicateAccount,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account not found")]
    AccountNotFound,

    #[error("invalid or expired magic link")]
    InvalidOrExpiredLink,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("missing or malformed bearer token")]
    MissingBearer,

    #[error("a Pro subscription is required")]
    ProRequired,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("secure random source unavailable")]
    RandomSource,

    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl AuthError {
    /// Short title used as the `error` field of the response body.
    fn title(&self) -> &'static str {
        match self {
            AuthError::InvalidEmail | AuthError::WeakPassword(_) | AuthError::InvalidName => "Validation error",
            AuthError::DuplicateAccount => "Duplicate account",
            AuthError::AccountNotFound => "Not found",
            AuthError::InvalidCredentials
            | AuthError::InvalidOrExpiredLink
            | AuthError::InvalidRefreshToken
            | AuthError::InvalidToken
            | AuthError::MissingBearer => "Unauthorized",
            AuthError::ProRequired => "Forbidden",
            AuthError::Config(_)
            | AuthError::Hashing(_)
            | AuthError::RandomSource
            | AuthError::Infrastructure(_) => "Internal server error",
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => AuthError::DuplicateAccount,
            StoreError::Database(e) => AuthError::Infrastructure(e.to_string()),
        }
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        AuthError::Config(err.to_string())
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidEmail
            | AuthError::WeakPassword(_)
            | AuthError::InvalidName
            | AuthError::DuplicateAccount
            | AuthError::AccountNotFound => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::InvalidOrExpiredLink
            | AuthError::InvalidRefreshToken
            | AuthError::InvalidToken
            | AuthError::MissingBearer => StatusCode::UNAUTHORIZED,
            AuthError::ProRequired => StatusCode::FORBIDDEN,
            AuthError::Config(_)
            | AuthError::Hashing(_)
            | AuthError::RandomSource
            | AuthError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Internal detail goes to the log, never to the client.
        let message = if self.is_internal() {
            tracing::error!(error = %self, "request failed with internal error");
            "An unexpected error occurred".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.title(),
            "message": message
        }))
    }
}
