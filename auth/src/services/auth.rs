use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use strategyforge_config::{AuthConfig, MAGIC_LINK_TTL};
use strategyforge_database::{generate_account_id, AccountRepository, StoreError};
use strategyforge_models::{Account, AuthResponse, LoginRequest, PublicUserView, RegisterRequest};
use strategyforge_observability::{log_auth_event, log_notification_event, log_security};

use super::magic_link::{magic_link_url, MagicLinkNotifier};
use super::security::SecurityService;
use super::tokens::TokenService;
use crate::errors::{AuthError, AuthResult};

const SERVICE_NAME: &str = "auth-service";

/// Registration, login, magic links and refresh-token rotation over an
/// account store.
///
/// Shared across request tasks behind an `Arc`; the store is the only
/// mutable state it touches.
pub struct AuthService {
    config: AuthConfig,
    accounts: Arc<dyn AccountRepository>,
    notifier: Arc<dyn MagicLinkNotifier>,
    security: SecurityService,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(
        config: AuthConfig,
        accounts: Arc<dyn AccountRepository>,
        notifier: Arc<dyn MagicLinkNotifier>,
    ) -> AuthResult<Self> {
        let security = SecurityService::new()?;
        let tokens = TokenService::new(&config);

        Ok(Self {
            config,
            accounts,
            notifier,
            security,
            tokens,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn security(&self) -> &SecurityService {
        &self.security
    }

    /// Run one store call under the configured timeout.
    async fn store<T, F>(&self, operation: &'static str, call: F) -> AuthResult<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let err = AuthError::from(e);
                if err.is_internal() {
                    tracing::error!(operation, error = %err, "account store call failed");
                }
                Err(err)
            }
            Err(_) => {
                tracing::error!(operation, timeout = ?self.config.store_timeout, "account store call timed out");
                Err(AuthError::Infrastructure(format!("account store timed out during {}", operation)))
            }
        }
    }

    fn fail(&self, event: &str, account_id: Option<&str>, err: AuthError) -> AuthError {
        log_auth_event(SERVICE_NAME, event, account_id, false, Some(err.to_string().as_str()));
        err
    }

    fn issue_pair(&self, account: &Account) -> AuthResult<(String, String)> {
        let token = self.tokens.issue_access_token(&account.id, &account.email, account.is_pro)?;
        let refresh_token = self.tokens.issue_refresh_token(&account.id)?;
        Ok((token, refresh_token))
    }

    pub async fn register(&self, request: RegisterRequest) -> AuthResult<AuthResponse> {
        let email = self.security.normalize_email(&request.email);
        let name = self.security.sanitize_input(&request.name);

        self.security.validate_email(&email)?;
        self.security
            .validate_password_strength(&request.password)
            .map_err(AuthError::WeakPassword)?;
        self.security.validate_name(&name)?;

        if self.store("find_by_email", self.accounts.find_by_email(&email)).await?.is_some() {
            return Err(self.fail("register", None, AuthError::DuplicateAccount));
        }

        let password_hash = self.security.hash_password(&request.password)?;
        let id = generate_account_id();
        let token = self.tokens.issue_access_token(&id, &email, false)?;
        let refresh_token = self.tokens.issue_refresh_token(&id)?;

        let account = Account::new_password_account(id, email, name, password_hash, refresh_token.clone(), Utc::now());

        // A concurrent registration for the same email loses here.
        let account = self
            .store("insert", self.accounts.insert(&account))
            .await
            .map_err(|e| self.fail("register", None, e))?;

        log_auth_event(SERVICE_NAME, "register", Some(&account.id), true, None);
        Ok(AuthResponse::new(&account, token, refresh_token))
    }

    pub async fn login(&self, request: LoginRequest) -> AuthResult<AuthResponse> {
        let email = self.security.normalize_email(&request.email);
        self.security.validate_email(&email)?;

        let account = self.store("find_by_email", self.accounts.find_by_email(&email)).await?;

        // Unknown account, passwordless account and wrong password must be
        // indistinguishable, including in how long they take.
        let account = match account {
            Some(account) => account,
            None => {
                self.security.burn_verification(&request.password);
                log_security!("login_failed", reason = "unknown_account");
                return Err(self.fail("login", None, AuthError::InvalidCredentials));
            }
        };

        let verified = match account.password_hash.as_deref() {
            Some(hash) => self.security.verify_password(&request.password, hash)?,
            None => {
                self.security.burn_verification(&request.password);
                false
            }
        };

        if !verified {
            log_security!("login_failed", account_id = account.id);
            return Err(self.fail("login", Some(&account.id), AuthError::InvalidCredentials));
        }

        let (token, refresh_token) = self.issue_pair(&account)?;
        let account = self
            .store("record_login", self.accounts.record_login(&account.id, &refresh_token, Utc::now()))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        log_auth_event(SERVICE_NAME, "login", Some(&account.id), true, None);
        Ok(AuthResponse::new(&account, token, refresh_token))
    }

    /// Persist a fresh magic-link token and dispatch the link.
    ///
    /// Dispatch is best-effort: the token stays valid even if the notifier
    /// fails or times out.
    pub async fn send_magic_link(&self, email: &str) -> AuthResult<()> {
        let email = self.security.normalize_email(email);
        self.security.validate_email(&email)?;

        let account = match self.store("find_by_email", self.accounts.find_by_email(&email)).await? {
            Some(account) => account,
            None if self.config.conceal_unknown_magic_link_accounts => {
                log_auth_event(SERVICE_NAME, "magic_link_requested", None, false, Some("unknown account (concealed)"));
                return Ok(());
            }
            None => return Err(self.fail("magic_link_requested", None, AuthError::AccountNotFound)),
        };

        let token = self.tokens.issue_magic_link_token()?;
        let expires_at = Utc::now() + chrono::Duration::seconds(MAGIC_LINK_TTL.as_secs() as i64);

        self.store("set_magic_token", self.accounts.set_magic_token(&account.id, &token, expires_at))
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        log_auth_event(SERVICE_NAME, "magic_link_requested", Some(&account.id), true, None);

        let link = magic_link_url(&self.config.frontend_url, &token);
        self.dispatch_magic_link(&account, &link).await;
        Ok(())
    }

    async fn dispatch_magic_link(&self, account: &Account, link: &str) {
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.config.notification_timeout,
            self.notifier.send_magic_link(&account.email, link),
        )
        .await;
        let elapsed = started.elapsed().as_millis() as u64;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("notification timed out".to_string()),
        };

        log_notification_event(SERVICE_NAME, self.notifier.channel(), &account.id, elapsed, error.as_deref());
    }

    /// Redeem a magic link. Unknown, already used and expired tokens all
    /// yield `InvalidOrExpiredLink`.
    pub async fn verify_magic_link(&self, token: &str) -> AuthResult<AuthResponse> {
        if token.is_empty() {
            return Err(AuthError::InvalidOrExpiredLink);
        }

        let account = self
            .store("consume_magic_token", self.accounts.consume_magic_token(token, Utc::now()))
            .await?
            .ok_or_else(|| {
                log_security!("magic_link_rejected");
                self.fail("magic_link_verified", None, AuthError::InvalidOrExpiredLink)
            })?;

        let (access_token, refresh_token) = self.issue_pair(&account)?;
        let account = self
            .store("set_refresh_token", self.accounts.set_refresh_token(&account.id, Some(&refresh_token)))
            .await?
            .ok_or(AuthError::InvalidOrExpiredLink)?;

        log_auth_event(SERVICE_NAME, "magic_link_verified", Some(&account.id), true, None);
        Ok(AuthResponse::new(&account, access_token, refresh_token))
    }

    /// Exchange a refresh token for a new access/refresh pair.
    ///
    /// The presented token is swapped out atomically, so of several
    /// concurrent calls with the same token exactly one succeeds.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> AuthResult<AuthResponse> {
        let claims = if self.config.strict_refresh_validation {
            match self.tokens.validate_refresh_token(refresh_token) {
                Ok(claims) => Some(claims),
                Err(AuthError::InvalidToken) => {
                    return Err(self.fail("token_refreshed", None, AuthError::InvalidRefreshToken))
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let account = self
            .store("find_by_refresh_token", self.accounts.find_by_refresh_token(refresh_token))
            .await?
            .ok_or_else(|| {
                log_security!("refresh_rejected", reason = "not_current");
                self.fail("token_refreshed", None, AuthError::InvalidRefreshToken)
            })?;

        if let Some(claims) = &claims {
            if claims.sub != account.id {
                log_security!("refresh_rejected", account_id = account.id, reason = "subject_mismatch");
                return Err(self.fail("token_refreshed", Some(&account.id), AuthError::InvalidRefreshToken));
            }
        }

        let (token, next_refresh_token) = self.issue_pair(&account)?;
        let account = self
            .store("rotate_refresh_token", self.accounts.rotate_refresh_token(refresh_token, &next_refresh_token))
            .await?
            .ok_or_else(|| {
                log_security!("refresh_rejected", account_id = account.id, reason = "lost_rotation");
                self.fail("token_refreshed", Some(&account.id), AuthError::InvalidRefreshToken)
            })?;

        log_auth_event(SERVICE_NAME, "token_refreshed", Some(&account.id), true, None);
        Ok(AuthResponse::new(&account, token, next_refresh_token))
    }

    /// Revoke the account's refresh token.
    pub async fn logout(&self, account_id: &str) -> AuthResult<()> {
        self.store("set_refresh_token", self.accounts.set_refresh_token(account_id, None))
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        log_auth_event(SERVICE_NAME, "logout", Some(account_id), true, None);
        Ok(())
    }

    pub async fn current_user(&self, account_id: &str) -> AuthResult<PublicUserView> {
        self.store("find_by_id", self.accounts.find_by_id(account_id))
            .await?
            .map(PublicUserView::from)
            .ok_or(AuthError::AccountNotFound)
    }
}
