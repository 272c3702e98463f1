pub mod auth;
pub mod magic_link;
pub mod security;
pub mod tokens;

pub use auth::AuthService;
pub use magic_link::{magic_link_url, EmailConfig, LogNotifier, MagicLinkNotifier, NotificationError, SmtpNotifier};
pub use security::SecurityService;
pub use tokens::TokenService;
