#![allow(dead_code)]

use std::sync::Arc;

use auth::ManualClock;
use auth::TokenCodec;
use identity_service::config::AuthConfig;
use identity_service::domain::account::authentication::AuthenticationService;
use identity_service::domain::account::gate::PermissionGate;
use identity_service::domain::account::models::Account;
use identity_service::domain::account::models::RegisterAccount;
use identity_service::domain::account::service::AccountService;
use identity_service::outbound::repositories::InMemoryRepository;

pub const SECRET: &str = "test-secret-key-for-token-signing-at-least-32-bytes";

pub type Repository = InMemoryRepository<Account>;

/// Fully wired services over the in-memory repository and a manual clock.
pub struct TestApp {
    pub clock: Arc<ManualClock>,
    pub repository: Arc<Repository>,
    pub codec: Arc<TokenCodec>,
    pub authentication: Arc<AuthenticationService<Repository>>,
    pub gate: PermissionGate<Repository>,
    pub accounts: AccountService<Repository>,
}

impl TestApp {
    pub fn spawn() -> Self {
        let mut config = AuthConfig::with_secret(SECRET);
        // Keep Argon2 cheap; tests hash a lot.
        config.hashing_cost = 1;
        config.hashing_memory_kib = 1024;
        Self::with_config(config)
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let settings = config.validate().expect("Invalid test configuration");

        let clock = Arc::new(ManualClock::default());
        let repository = Arc::new(InMemoryRepository::with_clock(clock.clone()));
        let codec = Arc::new(
            settings
                .codec(clock.clone())
                .expect("Failed to create token codec"),
        );
        let denylist = Arc::new(settings.denylist(&codec, clock.clone()));

        let authentication = Arc::new(AuthenticationService::new(
            Arc::clone(&repository),
            settings.authenticator(Arc::clone(&codec)),
        ));
        let gate = PermissionGate::new(Arc::clone(&repository), Arc::clone(&codec))
            .with_denylist(denylist);
        let accounts = AccountService::new(Arc::clone(&repository), settings.hashing_pool());

        Self {
            clock,
            repository,
            codec,
            authentication,
            gate,
            accounts,
        }
    }

    /// Register a regular account with a derived email address.
    pub async fn register(&self, username: &str, password: &str) -> Account {
        self.authentication
            .register(command(username, password))
            .await
            .expect("Failed to register account")
    }

    pub async fn register_admin(&self, username: &str, password: &str) -> Account {
        self.authentication
            .register_privileged(command(username, password))
            .await
            .expect("Failed to register privileged account")
    }

    /// Authenticate and return the bearer token.
    pub async fn login(&self, identifier: &str, password: &str) -> String {
        self.authentication
            .authenticate(identifier, password)
            .await
            .expect("Failed to authenticate")
            .access_token
    }
}

pub fn command(username: &str, password: &str) -> RegisterAccount {
    RegisterAccount::new(
        username.to_string(),
        format!("{}@example.com", username),
        password.to_string(),
        None,
    )
    .expect("Invalid registration input")
}
