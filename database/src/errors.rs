use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write (email already registered).
    #[error("account already exists")]
    Duplicate,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Map an insert failure, singling out unique-constraint violations.
    pub(crate) fn from_insert(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Database(err),
        }
    }
}
