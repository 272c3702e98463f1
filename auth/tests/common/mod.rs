#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use strategyforge_auth::models::RegisterRequest;
use strategyforge_auth::{
    AccountRepository, AuthConfig, AuthService, InMemoryAccountRepository, MagicLinkNotifier, NotificationError,
};

pub const TEST_SECRET: &str = "strategyforge-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "Abcd1234";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NotifierMode {
    Deliver,
    Fail,
    Hang,
}

/// Captures every link instead of sending it.
pub struct RecordingNotifier {
    mode: NotifierMode,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new(mode: NotifierMode) -> Self {
        Self {
            mode,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Token carried by the most recent link.
    pub fn last_token(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .and_then(|(_, link)| link.split("token=").nth(1).map(str::to_string))
    }
}

#[async_trait]
impl MagicLinkNotifier for RecordingNotifier {
    async fn send_magic_link(&self, email: &str, link: &str) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push((email.to_string(), link.to_string()));
        match self.mode {
            NotifierMode::Deliver => Ok(()),
            NotifierMode::Fail => Err(NotificationError::Delivery("smtp unavailable".to_string())),
            NotifierMode::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
        }
    }

    fn channel(&self) -> &'static str {
        "recording"
    }
}

pub struct TestHarness {
    pub service: Arc<AuthService>,
    pub accounts: Arc<InMemoryAccountRepository>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn test_config() -> AuthConfig {
    AuthConfig::for_secret(TEST_SECRET).with_frontend_url("http://localhost:5173")
}

pub fn harness() -> TestHarness {
    harness_with(test_config(), NotifierMode::Deliver)
}

pub fn harness_with(config: AuthConfig, mode: NotifierMode) -> TestHarness {
    strategyforge_observability::init_test_tracing();

    let accounts = Arc::new(InMemoryAccountRepository::new());
    let notifier = Arc::new(RecordingNotifier::new(mode));
    let service = AuthService::new(
        config,
        accounts.clone() as Arc<dyn AccountRepository>,
        notifier.clone() as Arc<dyn MagicLinkNotifier>,
    )
    .expect("auth service should build");

    TestHarness {
        service: Arc::new(service),
        accounts,
        notifier,
    }
}

pub fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: PASSWORD.to_string(),
        name: "Test Trader".to_string(),
    }
}
