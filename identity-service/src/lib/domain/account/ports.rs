use async_trait::async_trait;

use crate::domain::account::models::Account;
use crate::domain::repository::Repository;
use crate::domain::repository::RepositoryError;

/// Account persistence: the generic repository plus identifier lookups.
#[async_trait]
pub trait AccountRepository: Repository<Account> {
    /// Retrieve account by exact username.
    ///
    /// # Errors
    /// * `Storage` - Backend failure
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, RepositoryError>;

    /// Retrieve account by exact email address.
    ///
    /// # Errors
    /// * `Storage` - Backend failure
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, RepositoryError>;

    /// Retrieve account by login identifier: username first, then email.
    ///
    /// # Errors
    /// * `Storage` - Backend failure
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, RepositoryError> {
        if let Some(account) = self.find_by_username(identifier).await? {
            return Ok(Some(account));
        }
        self.find_by_email(identifier).await
    }
}
