use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use strategyforge_models::Account;
use strategyforge_observability::log_db;

use super::{AccountRepository, StoreResult};
use crate::errors::StoreError;

macro_rules! account_columns {
    () => {
        "id, email, name, password_hash, avatar, is_pro, is_verified, google_id, \
         magic_token, token_expiry, refresh_token, last_login_at, created_at, updated_at, deleted_at"
    };
}

const INSERT_ACCOUNT: &str = concat!(
    "INSERT INTO users (",
    account_columns!(),
    ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) RETURNING ",
    account_columns!()
);

const SELECT_BY_ID: &str = concat!(
    "SELECT ", account_columns!(), " FROM users WHERE id = $1 AND deleted_at IS NULL"
);

const SELECT_BY_EMAIL: &str = concat!(
    "SELECT ", account_columns!(), " FROM users WHERE email = $1 AND deleted_at IS NULL"
);

const SELECT_BY_REFRESH_TOKEN: &str = concat!(
    "SELECT ", account_columns!(), " FROM users WHERE refresh_token = $1 AND deleted_at IS NULL"
);

const RECORD_LOGIN: &str = concat!(
    "UPDATE users SET last_login_at = $2, refresh_token = $3, updated_at = $2 \
     WHERE id = $1 AND deleted_at IS NULL RETURNING ",
    account_columns!()
);

const SET_REFRESH_TOKEN: &str = concat!(
    "UPDATE users SET refresh_token = $2, updated_at = $3 \
     WHERE id = $1 AND deleted_at IS NULL RETURNING ",
    account_columns!()
);

const SET_MAGIC_TOKEN: &str = concat!(
    "UPDATE users SET magic_token = $2, token_expiry = $3, updated_at = $4 \
     WHERE id = $1 AND deleted_at IS NULL RETURNING ",
    account_columns!()
);

const CONSUME_MAGIC_TOKEN: &str = concat!(
    "UPDATE users SET magic_token = NULL, token_expiry = NULL, is_verified = TRUE, \
     last_login_at = $2, updated_at = $2 \
     WHERE magic_token = $1 AND token_expiry IS NOT NULL AND token_expiry > $2 \
     AND deleted_at IS NULL RETURNING ",
    account_columns!()
);

const ROTATE_REFRESH_TOKEN: &str = concat!(
    "UPDATE users SET refresh_token = $2, updated_at = $3 \
     WHERE refresh_token = $1 AND deleted_at IS NULL RETURNING ",
    account_columns!()
);

const SOFT_DELETE: &str =
    "UPDATE users SET deleted_at = $2, updated_at = $2, refresh_token = NULL, magic_token = NULL, token_expiry = NULL \
     WHERE id = $1 AND deleted_at IS NULL";

/// PostgreSQL account store.
///
/// Expects a `users` table shaped like:
///
/// ```sql
/// CREATE TABLE users (
///     id            TEXT PRIMARY KEY,
///     email         TEXT NOT NULL,
///     name          TEXT NOT NULL,
///     password_hash TEXT,
///     avatar        TEXT,
///     is_pro        BOOLEAN NOT NULL DEFAULT FALSE,
///     is_verified   BOOLEAN NOT NULL DEFAULT FALSE,
///     google_id     TEXT,
///     magic_token   TEXT,
///     token_expiry  TIMESTAMPTZ,
///     refresh_token TEXT,
///     last_login_at TIMESTAMPTZ,
///     created_at    TIMESTAMPTZ NOT NULL,
///     updated_at    TIMESTAMPTZ NOT NULL,
///     deleted_at    TIMESTAMPTZ,
///     CHECK (magic_token IS NULL OR token_expiry IS NOT NULL)
/// );
/// CREATE UNIQUE INDEX users_email_active ON users (email) WHERE deleted_at IS NULL;
/// CREATE UNIQUE INDEX users_magic_token ON users (magic_token) WHERE magic_token IS NOT NULL;
/// CREATE UNIQUE INDEX users_refresh_token ON users (refresh_token) WHERE refresh_token IS NOT NULL;
/// CREATE UNIQUE INDEX users_google_id ON users (google_id) WHERE google_id IS NOT NULL;
/// ```
///
/// Single-use semantics rely on each conditional `UPDATE ... RETURNING`
/// taking the row lock: a second writer re-evaluates its `WHERE` against the
/// committed row and matches nothing.
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, query: &'static str, value: &str) -> StoreResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn insert(&self, account: &Account) -> StoreResult<Account> {
        log_db!("INSERT", "users", &account.id);

        sqlx::query_as::<_, Account>(INSERT_ACCOUNT)
            .bind(&account.id)
            .bind(&account.email)
            .bind(&account.name)
            .bind(&account.password_hash)
            .bind(&account.avatar)
            .bind(account.is_pro)
            .bind(account.is_verified)
            .bind(&account.google_id)
            .bind(&account.magic_token)
            .bind(account.token_expiry)
            .bind(&account.refresh_token)
            .bind(account.last_login_at)
            .bind(account.created_at)
            .bind(account.updated_at)
            .bind(account.deleted_at)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_insert)
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Account>> {
        log_db!("SELECT", "users", id);
        self.fetch_one_by(SELECT_BY_ID, id).await
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        log_db!("SELECT", "users");
        self.fetch_one_by(SELECT_BY_EMAIL, email).await
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> StoreResult<Option<Account>> {
        log_db!("SELECT", "users");
        self.fetch_one_by(SELECT_BY_REFRESH_TOKEN, refresh_token).await
    }

    async fn record_login(&self, id: &str, refresh_token: &str, at: DateTime<Utc>) -> StoreResult<Option<Account>> {
        log_db!("UPDATE", "users", id);

        let account = sqlx::query_as::<_, Account>(RECORD_LOGIN)
            .bind(id)
            .bind(at)
            .bind(refresh_token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn set_refresh_token(&self, id: &str, refresh_token: Option<&str>) -> StoreResult<Option<Account>> {
        log_db!("UPDATE", "users", id);

        let account = sqlx::query_as::<_, Account>(SET_REFRESH_TOKEN)
            .bind(id)
            .bind(refresh_token)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn set_magic_token(&self, id: &str, token: &str, expires_at: DateTime<Utc>) -> StoreResult<Option<Account>> {
        log_db!("UPDATE", "users", id);

        let account = sqlx::query_as::<_, Account>(SET_MAGIC_TOKEN)
            .bind(id)
            .bind(token)
            .bind(expires_at)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn consume_magic_token(&self, token: &str, now: DateTime<Utc>) -> StoreResult<Option<Account>> {
        log_db!("UPDATE", "users");

        let account = sqlx::query_as::<_, Account>(CONSUME_MAGIC_TOKEN)
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn rotate_refresh_token(&self, current: &str, next: &str) -> StoreResult<Option<Account>> {
        log_db!("UPDATE", "users");

        let account = sqlx::query_as::<_, Account>(ROTATE_REFRESH_TOKEN)
            .bind(current)
            .bind(next)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn soft_delete(&self, id: &str) -> StoreResult<bool> {
        log_db!("UPDATE", "users", id);

        let result = sqlx::query(SOFT_DELETE)
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
