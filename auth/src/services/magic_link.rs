use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("invalid mail configuration: {0}")]
    Config(String),

    #[error("invalid address: {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Delivers a magic link to its owner.
#[async_trait]
pub trait MagicLinkNotifier: Send + Sync {
    async fn send_magic_link(&self, email: &str, link: &str) -> Result<(), NotificationError>;

    /// Channel name used in logs.
    fn channel(&self) -> &'static str;
}

/// `<base>/verify?token=<token>`. The token is base64url, so it needs no
/// further escaping.
pub fn magic_link_url(base_url: &str, token: &str) -> String {
    format!("{}/verify?token={}", base_url.trim_end_matches('/'), token)
}

/// Writes the link to the log instead of sending it. Development only.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl MagicLinkNotifier for LogNotifier {
    async fn send_magic_link(&self, email: &str, link: &str) -> Result<(), NotificationError> {
        tracing::info!(to = %email, link = %link, "magic link (not sent, log notifier)");
        Ok(())
    }

    fn channel(&self) -> &'static str {
        "log"
    }
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
}

impl EmailConfig {
    pub fn from_env() -> Result<Self, NotificationError> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    pub fn from_source<F>(get: F) -> Result<Self, NotificationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let smtp_host = get("SMTP_HOST").ok_or_else(|| NotificationError::Config("SMTP_HOST is not set".into()))?;
        let smtp_port = match get("SMTP_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| NotificationError::Config(format!("invalid SMTP_PORT: {}", raw)))?,
            None => 587,
        };

        Ok(EmailConfig {
            smtp_host,
            smtp_port,
            smtp_username: get("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: get("SMTP_PASSWORD").unwrap_or_default(),
            from_email: get("FROM_EMAIL").unwrap_or_else(|| "noreply@strategyforge.app".to_string()),
            from_name: get("FROM_NAME").unwrap_or_else(|| "StrategyForge".to_string()),
        })
    }
}

/// Sends magic links as multipart mail over async SMTP.
pub struct SmtpNotifier {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, NotificationError> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| NotificationError::Address(format!("from: {}", e)))?;

        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| NotificationError::Config(e.to_string()))?
            .credentials(creds)
            .port(config.smtp_port)
            .build();

        Ok(Self { from, mailer })
    }

    pub fn from_env() -> Result<Self, NotificationError> {
        Self::new(&EmailConfig::from_env()?)
    }
}

fn render_bodies(link: &str) -> (String, String) {
    let text = format!(
        "Sign in to StrategyForge\n\n\
         Use the link below to sign in. It expires in 15 minutes and works once.\n\n\
         {}\n\n\
         If you did not ask for this, you can ignore this email.\n",
        link
    );

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;">
  <h2>Sign in to StrategyForge</h2>
  <p>Use the button below to sign in. It expires in 15 minutes and works once.</p>
  <p><a href="{link}" style="display:inline-block;padding:12px 24px;background:#4f46e5;color:#fff;border-radius:6px;text-decoration:none;">Sign in</a></p>
  <p>If you did not ask for this, you can ignore this email.</p>
</body>
</html>"#
    );

    (text, html)
}

#[async_trait]
impl MagicLinkNotifier for SmtpNotifier {
    async fn send_magic_link(&self, email: &str, link: &str) -> Result<(), NotificationError> {
        let to: Mailbox = email
            .parse()
            .map_err(|e| NotificationError::Address(format!("to: {}", e)))?;
        let (text_body, html_body) = render_bodies(link);

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Your StrategyForge sign-in link")
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(text_body))
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(html_body)),
            )
            .map_err(|e| NotificationError::Message(e.to_string()))?;

        self.mailer
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| NotificationError::Delivery(e.to_string()))
    }

    fn channel(&self) -> &'static str {
        "smtp"
    }
}
