use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use strategyforge_models::Account;

use super::{AccountRepository, StoreResult};
use crate::errors::StoreError;

/// Process-local account store for tests and single-node development.
///
/// Each operation takes the write lock for its whole check-then-act, which
/// gives the same single-winner behaviour as the conditional updates in
/// [`super::PgAccountRepository`].
#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (not soft-deleted) accounts.
    pub fn len(&self) -> usize {
        self.accounts.read().values().filter(|a| !a.is_deleted()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_live<F>(&self, predicate: F) -> Option<Account>
    where
        F: Fn(&Account) -> bool,
    {
        self.accounts
            .read()
            .values()
            .find(|a| !a.is_deleted() && predicate(a))
            .cloned()
    }

    fn update_live<F>(&self, id: &str, apply: F) -> Option<Account>
    where
        F: FnOnce(&mut Account),
    {
        let mut accounts = self.accounts.write();
        let account = accounts.get_mut(id).filter(|a| !a.is_deleted())?;
        apply(account);
        account.updated_at = Utc::now();
        Some(account.clone())
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn insert(&self, account: &Account) -> StoreResult<Account> {
        let mut accounts = self.accounts.write();

        let email_taken = accounts
            .values()
            .any(|a| !a.is_deleted() && a.email == account.email);
        if email_taken || accounts.contains_key(&account.id) {
            return Err(StoreError::Duplicate);
        }

        accounts.insert(account.id.clone(), account.clone());
        Ok(account.clone())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .get(id)
            .filter(|a| !a.is_deleted())
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        Ok(self.find_live(|a| a.email == email))
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> StoreResult<Option<Account>> {
        Ok(self.find_live(|a| a.refresh_token.as_deref() == Some(refresh_token)))
    }

    async fn record_login(&self, id: &str, refresh_token: &str, at: DateTime<Utc>) -> StoreResult<Option<Account>> {
        Ok(self.update_live(id, |account| {
            account.last_login_at = Some(at);
            account.refresh_token = Some(refresh_token.to_string());
        }))
    }

    async fn set_refresh_token(&self, id: &str, refresh_token: Option<&str>) -> StoreResult<Option<Account>> {
        Ok(self.update_live(id, |account| {
            account.refresh_token = refresh_token.map(str::to_string);
        }))
    }

    async fn set_magic_token(&self, id: &str, token: &str, expires_at: DateTime<Utc>) -> StoreResult<Option<Account>> {
        Ok(self.update_live(id, |account| {
            account.magic_token = Some(token.to_string());
            account.token_expiry = Some(expires_at);
        }))
    }

    async fn consume_magic_token(&self, token: &str, now: DateTime<Utc>) -> StoreResult<Option<Account>> {
        let mut accounts = self.accounts.write();

        let account = accounts.values_mut().find(|a| {
            !a.is_deleted()
                && a.magic_token.as_deref() == Some(token)
                && a.token_expiry.map_or(false, |expiry| expiry > now)
        });

        Ok(account.map(|account| {
            account.magic_token = None;
            account.token_expiry = None;
            account.is_verified = true;
            account.last_login_at = Some(now);
            account.updated_at = now;
            account.clone()
        }))
    }

    async fn rotate_refresh_token(&self, current: &str, next: &str) -> StoreResult<Option<Account>> {
        let mut accounts = self.accounts.write();

        let account = accounts
            .values_mut()
            .find(|a| !a.is_deleted() && a.refresh_token.as_deref() == Some(current));

        Ok(account.map(|account| {
            account.refresh_token = Some(next.to_string());
            account.updated_at = Utc::now();
            account.clone()
        }))
    }

    async fn soft_delete(&self, id: &str) -> StoreResult<bool> {
        let deleted = self.update_live(id, |account| {
            account.deleted_at = Some(Utc::now());
            account.refresh_token = None;
            account.magic_token = None;
            account.token_expiry = None;
        });
        Ok(deleted.is_some())
    }
}
