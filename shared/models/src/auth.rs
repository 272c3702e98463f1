use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Issuer stamped on access tokens.
pub const ACCESS_TOKEN_ISSUER: &str = "strategyforge";
/// Issuer stamped on refresh tokens. Differs from the access issuer so one
/// kind can never be replayed as the other.
pub const REFRESH_TOKEN_ISSUER: &str = "strategyforge-refresh";

/// Persistent identity record, one row of the `users` table.
#[derive(Clone, FromRow)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub avatar: Option<String>,
    pub is_pro: bool,
    pub is_verified: bool,
    pub google_id: Option<String>,
    pub magic_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Where an account stands with respect to authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    RegisteredUnverified,
    RegisteredVerified,
    PendingMagicLink,
}

impl Account {
    /// A freshly registered password account: unverified, free tier.
    pub fn new_password_account(
        id: String,
        email: String,
        name: String,
        password_hash: String,
        refresh_token: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            name,
            password_hash: Some(password_hash),
            avatar: None,
            is_pro: false,
            is_verified: false,
            google_id: None,
            magic_token: None,
            token_expiry: None,
            refresh_token: Some(refresh_token),
            last_login_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// True while an unexpired magic link is outstanding.
    pub fn has_pending_magic_link(&self, now: DateTime<Utc>) -> bool {
        match (&self.magic_token, self.token_expiry) {
            (Some(_), Some(expiry)) => expiry > now,
            _ => false,
        }
    }

    pub fn auth_state(&self, now: DateTime<Utc>) -> AuthState {
        if self.has_pending_magic_link(now) {
            AuthState::PendingMagicLink
        } else if self.is_verified {
            AuthState::RegisteredVerified
        } else {
            AuthState::RegisteredUnverified
        }
    }

    pub fn public_view(&self) -> PublicUserView {
        PublicUserView::from(self)
    }
}

// Hashes and tokens stay out of debug output so accounts can be logged.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("password_hash", &self.password_hash.as_ref().map(|_| "<redacted>"))
            .field("is_pro", &self.is_pro)
            .field("is_verified", &self.is_verified)
            .field("magic_token", &self.magic_token.as_ref().map(|_| "<redacted>"))
            .field("token_expiry", &self.token_expiry)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("last_login_at", &self.last_login_at)
            .field("created_at", &self.created_at)
            .field("deleted_at", &self.deleted_at)
            .finish()
    }
}

/// Account data that is safe to hand to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUserView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub is_pro: bool,
    pub is_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for PublicUserView {
    fn from(account: &Account) -> Self {
        PublicUserView {
            id: account.id.clone(),
            email: account.email.clone(),
            name: account.name.clone(),
            avatar: account.avatar.clone(),
            is_pro: account.is_pro,
            is_verified: account.is_verified,
            last_login_at: account.last_login_at,
            created_at: account.created_at,
        }
    }
}

impl From<Account> for PublicUserView {
    fn from(account: Account) -> Self {
        PublicUserView::from(&account)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyMagicLinkRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: PublicUserView,
    pub token: String,
    pub refresh_token: String,
}

impl AuthResponse {
    pub fn new(account: &Account, token: String, refresh_token: String) -> Self {
        Self {
            user: PublicUserView::from(account),
            token,
            refresh_token,
        }
    }
}

/// Payload of a short-lived access token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub user_id: String,
    pub email: String,
    pub is_pro: bool,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
}

/// Payload of a refresh token: subject only, so profile changes never force
/// a reissue.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RefreshClaims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}
