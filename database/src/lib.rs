// Account persistence for StrategyForge.
// Repository-pattern interface over the `users` table, with a PostgreSQL
// implementation and an in-memory one for tests and local runs.

pub mod errors;
pub mod repositories;
pub mod utils;

// Re-export commonly used items
pub use sqlx;
pub use errors::StoreError;
pub use repositories::{AccountRepository, InMemoryAccountRepository, PgAccountRepository};
pub use utils::generate_account_id;
