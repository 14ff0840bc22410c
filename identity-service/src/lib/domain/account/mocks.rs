use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auth::HashingPool;
use auth::PasswordHasher;
use auth::TokenCodec;
use chrono::Utc;
use mockall::mock;

use crate::domain::account::models::Account;
use crate::domain::account::models::AccountId;
use crate::domain::account::models::AccountPatch;
use crate::domain::account::models::EmailAddress;
use crate::domain::account::models::NewAccount;
use crate::domain::account::models::Username;
use crate::domain::account::ports::AccountRepository;
use crate::domain::repository::Page;
use crate::domain::repository::Repository;
use crate::domain::repository::RepositoryError;

pub const SECRET: &[u8] = b"test-secret-key-for-token-signing-32+";

mock! {
    pub TestAccountRepository {}

    #[async_trait]
    impl Repository<Account> for TestAccountRepository {
        async fn get(&self, id: &AccountId) -> Result<Option<Account>, RepositoryError>;
        async fn list(&self, page: Page) -> Result<Vec<Account>, RepositoryError>;
        async fn count(&self) -> Result<u64, RepositoryError>;
        async fn create(&self, draft: NewAccount) -> Result<Account, RepositoryError>;
        async fn update(&self, id: &AccountId, patch: AccountPatch) -> Result<Account, RepositoryError>;
        async fn delete(&self, id: &AccountId) -> Result<bool, RepositoryError>;
    }

    #[async_trait]
    impl AccountRepository for TestAccountRepository {
        async fn find_by_username(&self, username: &str) -> Result<Option<Account>, RepositoryError>;
        async fn find_by_email(&self, email: &str) -> Result<Option<Account>, RepositoryError>;
    }
}

pub fn account(username: &str) -> Account {
    let now = Utc::now();
    Account {
        id: AccountId::new(),
        username: Username::new(username.to_string()).unwrap(),
        email: EmailAddress::new(format!("{}@example.com", username)).unwrap(),
        full_name: None,
        password_hash: String::new(),
        active: true,
        privileged: false,
        created_at: now,
        updated_at: now,
    }
}

pub fn fast_hasher() -> PasswordHasher {
    PasswordHasher::with_cost(1, 1024).unwrap()
}

pub fn hashing_pool() -> HashingPool {
    HashingPool::new(fast_hasher(), 2, Duration::from_secs(10))
}

pub fn codec() -> Arc<TokenCodec> {
    Arc::new(TokenCodec::with_secret(SECRET).unwrap())
}
