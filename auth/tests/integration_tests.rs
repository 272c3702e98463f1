mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::{harness, harness_with, register_request, test_config, NotifierMode, PASSWORD};
use strategyforge_auth::models::{Account, LoginRequest, RegisterRequest};
use strategyforge_auth::{AccountRepository, AuthError, AuthService, InMemoryAccountRepository, MagicLinkNotifier};
use strategyforge_config::parse_duration;
use strategyforge_database::StoreError;

fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn test_register_creates_unverified_free_account() {
    let h = harness();
    let response = h.service.register(register_request("  New.Trader@Example.com ")).await.unwrap();

    assert_eq!(response.user.email, "new.trader@example.com");
    assert_eq!(response.user.name, "Test Trader");
    assert!(!response.user.is_pro);
    assert!(!response.user.is_verified);
    assert!(!response.token.is_empty());
    assert!(!response.refresh_token.is_empty());
    assert_ne!(response.token, response.refresh_token);

    let stored = h.accounts.find_by_email("new.trader@example.com").await.unwrap().unwrap();
    assert_eq!(stored.id, response.user.id);
    assert_eq!(stored.refresh_token.as_deref(), Some(response.refresh_token.as_str()));
    assert!(stored.password_hash.unwrap().starts_with("$argon2id$"));

    let claims = h.service.tokens().validate_access_token(&response.token).unwrap();
    assert_eq!(claims.user_id, response.user.id);
    assert!(!claims.is_pro);
}

#[tokio::test]
async fn test_register_then_login_end_to_end() {
    let h = harness();
    let registered = h
        .service
        .register(RegisterRequest {
            email: "a@x.com".to_string(),
            password: "Abcd1234".to_string(),
            name: "Ann".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(registered.user.name, "Ann");

    let logged_in = h.service.login(login_request("a@x.com", "Abcd1234")).await.unwrap();
    assert_eq!(logged_in.user.id, registered.user.id);
    assert_ne!(logged_in.token, registered.token);
    assert_ne!(logged_in.refresh_token, registered.refresh_token);
    assert!(h.service.tokens().validate_access_token(&logged_in.token).is_ok());

    let result = h.service.login(login_request("a@x.com", "wrong")).await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn test_register_with_overflowing_token_lifetime_is_config_error() {
    let config = test_config().with_access_token_ttl(parse_duration("2562047788015215h").unwrap());
    let h = harness_with(config, NotifierMode::Deliver);

    let result = h.service.register(register_request("ttl@example.com")).await;

    assert!(matches!(result, Err(AuthError::Config(_))));
    assert!(h.accounts.is_empty());
}

#[tokio::test]
async fn test_register_validation_errors() {
    let h = harness();

    let mut request = register_request("not-an-email");
    assert!(matches!(h.service.register(request.clone()).await, Err(AuthError::InvalidEmail)));

    request = register_request("weak@example.com");
    request.password = "short".to_string();
    assert!(matches!(h.service.register(request.clone()).await, Err(AuthError::WeakPassword(_))));

    request = register_request("name@example.com");
    request.name = " A ".to_string();
    assert!(matches!(h.service.register(request).await, Err(AuthError::InvalidName)));

    assert!(h.accounts.is_empty());
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let h = harness();
    h.service.register(register_request("dup@example.com")).await.unwrap();

    let result = h.service.register(register_request("DUP@example.com")).await;
    assert!(matches!(result, Err(AuthError::DuplicateAccount)));
    assert_eq!(h.accounts.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_create_one_account() {
    let h = harness();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let service = Arc::clone(&h.service);
            tokio::spawn(async move { service.register(register_request("race@example.com")).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(AuthError::DuplicateAccount) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(h.accounts.len(), 1);
}

#[tokio::test]
async fn test_login_rotates_refresh_token() {
    let h = harness();
    let registered = h.service.register(register_request("login@example.com")).await.unwrap();

    let logged_in = h.service.login(login_request("Login@Example.com", PASSWORD)).await.unwrap();
    assert_eq!(logged_in.user.id, registered.user.id);
    assert_ne!(logged_in.refresh_token, registered.refresh_token);
    assert!(logged_in.user.last_login_at.is_some());

    let stored = h.accounts.find_by_id(&registered.user.id).await.unwrap().unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some(logged_in.refresh_token.as_str()));

    // The registration refresh token is no longer current.
    assert!(matches!(
        h.service.refresh_access_token(&registered.refresh_token).await,
        Err(AuthError::InvalidRefreshToken)
    ));
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let h = harness();
    h.service.register(register_request("known@example.com")).await.unwrap();

    // Passwordless account, as created through a social login.
    let mut passwordless = h.accounts.find_by_email("known@example.com").await.unwrap().unwrap();
    passwordless.id = "social-1".to_string();
    passwordless.email = "social@example.com".to_string();
    passwordless.password_hash = None;
    passwordless.refresh_token = None;
    h.accounts.insert(&passwordless).await.unwrap();

    let wrong_password = h.service.login(login_request("known@example.com", "Wrong1234")).await;
    let unknown = h.service.login(login_request("nobody@example.com", PASSWORD)).await;
    let no_password = h.service.login(login_request("social@example.com", PASSWORD)).await;

    for result in [wrong_password, unknown, no_password] {
        let err = result.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(err.to_string(), "invalid email or password");
    }
}

#[tokio::test]
async fn test_login_rejects_invalid_email_before_lookup() {
    let h = harness();
    let result = h.service.login(login_request("bad-email", PASSWORD)).await;
    assert!(matches!(result, Err(AuthError::InvalidEmail)));
}

#[tokio::test]
async fn test_magic_link_flow() {
    let h = harness();
    let registered = h.service.register(register_request("magic@example.com")).await.unwrap();

    h.service.send_magic_link("Magic@Example.com").await.unwrap();

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "magic@example.com");
    assert!(sent[0].1.starts_with("http://localhost:5173/verify?token="));

    let token = h.notifier.last_token().unwrap();
    let stored = h.accounts.find_by_id(&registered.user.id).await.unwrap().unwrap();
    assert_eq!(stored.magic_token.as_deref(), Some(token.as_str()));
    let ttl = stored.token_expiry.unwrap() - Utc::now();
    assert!(ttl <= chrono::Duration::minutes(15) && ttl > chrono::Duration::minutes(14));

    let verified = h.service.verify_magic_link(&token).await.unwrap();
    assert_eq!(verified.user.id, registered.user.id);
    assert!(verified.user.is_verified);
    assert!(verified.user.last_login_at.is_some());

    let stored = h.accounts.find_by_id(&registered.user.id).await.unwrap().unwrap();
    assert!(stored.magic_token.is_none());
    assert!(stored.token_expiry.is_none());
    assert_eq!(stored.refresh_token.as_deref(), Some(verified.refresh_token.as_str()));

    // Single use.
    assert!(matches!(
        h.service.verify_magic_link(&token).await,
        Err(AuthError::InvalidOrExpiredLink)
    ));
}

#[tokio::test]
async fn test_new_magic_link_replaces_previous() {
    let h = harness();
    h.service.register(register_request("twice@example.com")).await.unwrap();

    h.service.send_magic_link("twice@example.com").await.unwrap();
    let first = h.notifier.last_token().unwrap();
    h.service.send_magic_link("twice@example.com").await.unwrap();
    let second = h.notifier.last_token().unwrap();

    assert_ne!(first, second);
    assert!(matches!(
        h.service.verify_magic_link(&first).await,
        Err(AuthError::InvalidOrExpiredLink)
    ));
    assert!(h.service.verify_magic_link(&second).await.is_ok());
}

#[tokio::test]
async fn test_expired_magic_link_is_rejected() {
    let h = harness();
    let registered = h.service.register(register_request("expired@example.com")).await.unwrap();

    let past = Utc::now() - chrono::Duration::seconds(1);
    h.accounts
        .set_magic_token(&registered.user.id, "stale-token", past)
        .await
        .unwrap();

    assert!(matches!(
        h.service.verify_magic_link("stale-token").await,
        Err(AuthError::InvalidOrExpiredLink)
    ));
    assert!(matches!(
        h.service.verify_magic_link("never-issued").await,
        Err(AuthError::InvalidOrExpiredLink)
    ));
    assert!(matches!(h.service.verify_magic_link("").await, Err(AuthError::InvalidOrExpiredLink)));

    let stored = h.accounts.find_by_id(&registered.user.id).await.unwrap().unwrap();
    assert!(!stored.is_verified);
}

#[tokio::test]
async fn test_magic_link_for_unknown_account() {
    let h = harness();
    assert!(matches!(
        h.service.send_magic_link("ghost@example.com").await,
        Err(AuthError::AccountNotFound)
    ));
    assert!(matches!(
        h.service.send_magic_link("not an email").await,
        Err(AuthError::InvalidEmail)
    ));
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_magic_link_for_unknown_account_can_be_concealed() {
    let config = test_config().with_conceal_unknown_magic_link_accounts(true);
    let h = harness_with(config, NotifierMode::Deliver);

    h.service.send_magic_link("ghost@example.com").await.unwrap();
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_notifier_failure_keeps_token_valid() {
    let h = harness_with(test_config(), NotifierMode::Fail);
    h.service.register(register_request("nomail@example.com")).await.unwrap();

    h.service.send_magic_link("nomail@example.com").await.unwrap();

    let token = h.notifier.last_token().unwrap();
    assert!(h.service.verify_magic_link(&token).await.is_ok());
}

#[tokio::test]
async fn test_notifier_timeout_is_not_fatal() {
    let config = test_config().with_notification_timeout(Duration::from_millis(50));
    let h = harness_with(config, NotifierMode::Hang);
    h.service.register(register_request("slowmail@example.com")).await.unwrap();

    let started = std::time::Instant::now();
    h.service.send_magic_link("slowmail@example.com").await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    let token = h.notifier.last_token().unwrap();
    assert!(h.service.verify_magic_link(&token).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_magic_link_verification_has_one_winner() {
    let h = harness();
    h.service.register(register_request("contest@example.com")).await.unwrap();
    h.service.send_magic_link("contest@example.com").await.unwrap();
    let token = h.notifier.last_token().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&h.service);
            let token = token.clone();
            tokio::spawn(async move { service.verify_magic_link(&token).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(AuthError::InvalidOrExpiredLink) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_refresh_rotates_and_invalidates_previous() {
    let h = harness();
    let registered = h.service.register(register_request("refresh@example.com")).await.unwrap();

    let refreshed = h.service.refresh_access_token(&registered.refresh_token).await.unwrap();
    assert_eq!(refreshed.user.id, registered.user.id);
    assert_ne!(refreshed.refresh_token, registered.refresh_token);
    assert_ne!(refreshed.token, registered.token);

    assert!(matches!(
        h.service.refresh_access_token(&registered.refresh_token).await,
        Err(AuthError::InvalidRefreshToken)
    ));
    assert!(h.service.refresh_access_token(&refreshed.refresh_token).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_has_one_winner() {
    let h = harness();
    let registered = h.service.register(register_request("refresh-race@example.com")).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&h.service);
            let token = registered.refresh_token.clone();
            tokio::spawn(async move { service.refresh_access_token(&token).await })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(response) => winners.push(response),
            Err(AuthError::InvalidRefreshToken) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1);

    let stored = h.accounts.find_by_id(&registered.user.id).await.unwrap().unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some(winners[0].refresh_token.as_str()));
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let h = harness();
    let registered = h.service.register(register_request("bye@example.com")).await.unwrap();

    h.service.logout(&registered.user.id).await.unwrap();
    assert!(matches!(
        h.service.refresh_access_token(&registered.refresh_token).await,
        Err(AuthError::InvalidRefreshToken)
    ));
    assert!(matches!(h.service.logout("missing").await, Err(AuthError::AccountNotFound)));
}

#[tokio::test]
async fn test_current_user() {
    let h = harness();
    let registered = h.service.register(register_request("me@example.com")).await.unwrap();

    let claims = h
        .service
        .tokens()
        .authenticate_bearer(&format!("Bearer {}", registered.token))
        .unwrap();
    let me = h.service.current_user(&claims.user_id).await.unwrap();

    assert_eq!(me, registered.user);
    assert!(matches!(h.service.current_user("missing").await, Err(AuthError::AccountNotFound)));
}

#[tokio::test]
async fn test_soft_deleted_account_cannot_authenticate() {
    let h = harness();
    let registered = h.service.register(register_request("deleted@example.com")).await.unwrap();
    assert!(h.accounts.soft_delete(&registered.user.id).await.unwrap());

    assert!(matches!(
        h.service.login(login_request("deleted@example.com", PASSWORD)).await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        h.service.refresh_access_token(&registered.refresh_token).await,
        Err(AuthError::InvalidRefreshToken)
    ));
    assert!(matches!(
        h.service.current_user(&registered.user.id).await,
        Err(AuthError::AccountNotFound)
    ));

    // The address can be registered again.
    assert!(h.service.register(register_request("deleted@example.com")).await.is_ok());
}

/// Delays every lookup past the configured store timeout.
struct SlowRepository {
    inner: InMemoryAccountRepository,
    delay: Duration,
}

#[async_trait]
impl AccountRepository for SlowRepository {
    async fn insert(&self, account: &Account) -> Result<Account, StoreError> {
        self.inner.insert(account).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_by_email(email).await
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> Result<Option<Account>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_by_refresh_token(refresh_token).await
    }

    async fn record_login(&self, id: &str, refresh_token: &str, at: DateTime<Utc>) -> Result<Option<Account>, StoreError> {
        self.inner.record_login(id, refresh_token, at).await
    }

    async fn set_refresh_token(&self, id: &str, refresh_token: Option<&str>) -> Result<Option<Account>, StoreError> {
        self.inner.set_refresh_token(id, refresh_token).await
    }

    async fn set_magic_token(&self, id: &str, token: &str, expires_at: DateTime<Utc>) -> Result<Option<Account>, StoreError> {
        self.inner.set_magic_token(id, token, expires_at).await
    }

    async fn consume_magic_token(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Account>, StoreError> {
        self.inner.consume_magic_token(token, now).await
    }

    async fn rotate_refresh_token(&self, current: &str, next: &str) -> Result<Option<Account>, StoreError> {
        self.inner.rotate_refresh_token(current, next).await
    }

    async fn soft_delete(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.soft_delete(id).await
    }
}

#[tokio::test]
async fn test_store_timeout_is_an_infrastructure_error() {
    let config = test_config().with_store_timeout(Duration::from_millis(50));
    let repository = Arc::new(SlowRepository {
        inner: InMemoryAccountRepository::new(),
        delay: Duration::from_secs(5),
    });
    let notifier = Arc::new(common::RecordingNotifier::new(NotifierMode::Deliver));
    let service = AuthService::new(
        config,
        repository as Arc<dyn AccountRepository>,
        notifier as Arc<dyn MagicLinkNotifier>,
    )
    .unwrap();

    let result = service.login(login_request("slow@example.com", PASSWORD)).await;
    match result {
        Err(err @ AuthError::Infrastructure(_)) => assert!(err.is_internal()),
        other => panic!("expected infrastructure error, got {other:?}"),
    }
}
