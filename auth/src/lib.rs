// Authentication core for StrategyForge - library only (no HTTP server)
//
// - Email/password registration and login (Argon2id)
// - Passwordless login through single-use magic links
// - HS256 access and refresh tokens with refresh-token rotation
// - Error taxonomy that maps onto HTTP responses for the API layer

pub mod errors;
pub mod services;

pub use errors::{AuthError, AuthResult};
pub use services::*;

pub use strategyforge_config::AuthConfig;
pub use strategyforge_database::{AccountRepository, InMemoryAccountRepository, PgAccountRepository};
pub use strategyforge_models as models;
