// Repository pattern for account persistence

pub mod account;
pub mod memory;

pub use account::PgAccountRepository;
pub use memory::InMemoryAccountRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use strategyforge_models::Account;

use crate::errors::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage contract for accounts.
///
/// Lookups never return soft-deleted rows. Every method that checks a token
/// and then mutates the row does both in one step, so concurrent callers
/// presenting the same token cannot both succeed.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Persist a new account. `StoreError::Duplicate` if the email is taken.
    async fn insert(&self, account: &Account) -> StoreResult<Account>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Account>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    async fn find_by_refresh_token(&self, refresh_token: &str) -> StoreResult<Option<Account>>;

    /// Stamp `last_login_at` and replace the refresh token in one write.
    async fn record_login(&self, id: &str, refresh_token: &str, at: DateTime<Utc>) -> StoreResult<Option<Account>>;

    /// Replace (or clear, with `None`) the stored refresh token.
    async fn set_refresh_token(&self, id: &str, refresh_token: Option<&str>) -> StoreResult<Option<Account>>;

    async fn set_magic_token(&self, id: &str, token: &str, expires_at: DateTime<Utc>) -> StoreResult<Option<Account>>;

    /// Redeem a magic-link token: if it matches and expires after `now`,
    /// clear it, mark the account verified and stamp the login.
    async fn consume_magic_token(&self, token: &str, now: DateTime<Utc>) -> StoreResult<Option<Account>>;

    /// Compare-and-swap the refresh token from `current` to `next`.
    async fn rotate_refresh_token(&self, current: &str, next: &str) -> StoreResult<Option<Account>>;

    /// Mark the account deleted. Returns false if there was nothing to delete.
    async fn soft_delete(&self, id: &str) -> StoreResult<bool>;
}
