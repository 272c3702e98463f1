//! Process-wide configuration for the auth core.
//!
//! Everything is read once at startup into an [`AuthConfig`] which is then
//! passed explicitly to the services that need it.

pub mod duration;

pub use duration::parse_duration;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Magic links are valid for a fixed fifteen minutes.
pub const MAGIC_LINK_TTL: Duration = Duration::from_secs(15 * 60);

const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(168 * 3600);
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
const MIN_PRODUCTION_SECRET_LEN: usize = 32;
/// Upper bound on either token lifetime.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("JWT_SECRET is not configured")]
    MissingSecret,

    #[error("JWT_SECRET must be at least {0} bytes in production")]
    WeakSecret(usize),

    #[error("{0} exceeds the maximum token lifetime of 365 days")]
    TokenLifetimeTooLong(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC signing secret. `None` leaves the service unable to mint or
    /// check tokens.
    pub jwt_secret: Option<String>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Base URL the magic link points at (`<base>/verify?token=...`).
    pub frontend_url: String,
    /// Upper bound on any single account-store call.
    pub store_timeout: Duration,
    /// Upper bound on a magic-link dispatch.
    pub notification_timeout: Duration,
    /// Check a refresh token's signature and expiry before trusting the
    /// stored copy.
    pub strict_refresh_validation: bool,
    /// Answer `send_magic_link` for unknown emails with silent success
    /// instead of `AccountNotFound`.
    pub conceal_unknown_magic_link_accounts: bool,
    pub environment: Environment,
}

impl AuthConfig {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_source<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = get("JWT_SECRET").filter(|s| !s.trim().is_empty());

        Self {
            jwt_secret,
            access_token_ttl: duration_or(&get, "JWT_EXPIRY", DEFAULT_ACCESS_TOKEN_TTL),
            refresh_token_ttl: duration_or(&get, "REFRESH_TOKEN_EXPIRY", DEFAULT_REFRESH_TOKEN_TTL),
            frontend_url: get("FRONTEND_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            store_timeout: duration_or(&get, "AUTH_STORE_TIMEOUT", DEFAULT_STORE_TIMEOUT),
            notification_timeout: duration_or(&get, "AUTH_NOTIFY_TIMEOUT", DEFAULT_NOTIFICATION_TIMEOUT),
            strict_refresh_validation: flag_or(&get, "STRICT_REFRESH_VALIDATION", true),
            conceal_unknown_magic_link_accounts: flag_or(&get, "MAGIC_LINK_CONCEAL_UNKNOWN", false),
            environment: get("ENVIRONMENT")
                .map(|v| Environment::parse(&v))
                .unwrap_or(Environment::Development),
        }
    }

    /// Defaults with an explicit secret.
    pub fn for_secret(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: Some(secret.into()),
            ..Self::from_source(|_| None)
        }
    }

    pub fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    pub fn with_refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    pub fn with_frontend_url(mut self, url: impl Into<String>) -> Self {
        self.frontend_url = url.into();
        self
    }

    pub fn with_strict_refresh_validation(mut self, strict: bool) -> Self {
        self.strict_refresh_validation = strict;
        self
    }

    pub fn with_conceal_unknown_magic_link_accounts(mut self, conceal: bool) -> Self {
        self.conceal_unknown_magic_link_accounts = conceal;
        self
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Startup gate: a service must not start without a usable secret.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secret = self.jwt_secret.as_deref().ok_or(ConfigError::MissingSecret)?;
        if self.is_production() && secret.len() < MIN_PRODUCTION_SECRET_LEN {
            return Err(ConfigError::WeakSecret(MIN_PRODUCTION_SECRET_LEN));
        }
        if self.access_token_ttl > MAX_TOKEN_TTL {
            return Err(ConfigError::TokenLifetimeTooLong("JWT_EXPIRY"));
        }
        if self.refresh_token_ttl > MAX_TOKEN_TTL {
            return Err(ConfigError::TokenLifetimeTooLong("REFRESH_TOKEN_EXPIRY"));
        }
        Ok(())
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("frontend_url", &self.frontend_url)
            .field("store_timeout", &self.store_timeout)
            .field("notification_timeout", &self.notification_timeout)
            .field("strict_refresh_validation", &self.strict_refresh_validation)
            .field("conceal_unknown_magic_link_accounts", &self.conceal_unknown_magic_link_accounts)
            .field("environment", &self.environment)
            .finish()
    }
}

fn duration_or<F>(get: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match parse_duration(&raw) {
            Some(parsed) if !parsed.is_zero() => parsed,
            _ => {
                tracing::warn!(key, value = %raw, "invalid duration, falling back to default");
                default
            }
        },
        None => default,
    }
}

fn flag_or<F>(get: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}
