use std::sync::Arc;

use auth::HashingPool;

use crate::domain::account::capability::is_privileged;
use crate::domain::account::capability::is_self_or_privileged;
use crate::domain::account::errors::AuthError;
use crate::domain::account::errors::ValidationError;
use crate::domain::account::models::Account;
use crate::domain::account::models::AccountId;
use crate::domain::account::models::AccountPage;
use crate::domain::account::models::AccountPatch;
use crate::domain::account::models::UpdateAccount;
use crate::domain::account::ports::AccountRepository;
use crate::domain::repository::Page;
use crate::domain::repository::Patch;
use crate::domain::repository::RepositoryError;

/// Account management on behalf of an already authorized actor.
///
/// Every operation re-checks what the actor may do with the target, so
/// callers only need to resolve the actor through the permission gate.
pub struct AccountService<R>
where
    R: AccountRepository,
{
    repository: Arc<R>,
    hashing: HashingPool,
}

impl<R> AccountService<R>
where
    R: AccountRepository,
{
    pub fn new(repository: Arc<R>, hashing: HashingPool) -> Self {
        Self {
            repository,
            hashing,
        }
    }

    /// List accounts in creation order.
    ///
    /// # Errors
    /// * `Forbidden` - Actor is not privileged
    /// * `Internal` - Storage failure
    pub async fn list_accounts(&self, actor: &Account, page: Page) -> Result<AccountPage, AuthError> {
        if !is_privileged(actor) {
            return Err(AuthError::Forbidden);
        }

        let page = Page::new(page.offset, page.limit);
        let items = self.repository.list(page).await?;
        let total = self.repository.count().await?;

        Ok(AccountPage { items, total, page })
    }

    /// Retrieve one account.
    ///
    /// # Errors
    /// * `Forbidden` - Actor is neither the target nor privileged
    /// * `NotFound` - No such account
    /// * `Internal` - Storage failure
    pub async fn get_account(&self, actor: &Account, id: &AccountId) -> Result<Account, AuthError> {
        if !is_self_or_privileged(actor, id) {
            return Err(AuthError::Forbidden);
        }

        self.repository
            .get(id)
            .await?
            .ok_or_else(|| AuthError::NotFound(id.to_string()))
    }

    /// Apply a partial update.
    ///
    /// # Errors
    /// * `Forbidden` - Actor is neither the target nor privileged, or changes
    ///   `active`/`privileged` without being privileged
    /// * `Conflict` - New username or email is taken
    /// * `NotFound` - No such account
    /// * `Internal` - Hashing or storage failure
    pub async fn update_account(
        &self,
        actor: &Account,
        id: &AccountId,
        command: UpdateAccount,
    ) -> Result<Account, AuthError> {
        if !is_self_or_privileged(actor, id) {
            return Err(AuthError::Forbidden);
        }

        if command.touches_privileges() && !is_privileged(actor) {
            tracing::warn!(
                account_id = %actor.id,
                target = %id,
                "Non-privileged account tried to change account flags"
            );
            return Err(AuthError::Forbidden);
        }

        if let Patch::Set(username) = &command.username {
            self.ensure_unclaimed(
                Account::USERNAME_KEY,
                username.as_str(),
                self.repository.find_by_username(username.as_str()).await?,
                id,
            )?;
        }

        if let Patch::Set(email) = &command.email {
            self.ensure_unclaimed(
                Account::EMAIL_KEY,
                email.as_str(),
                self.repository.find_by_email(email.as_str()).await?,
                id,
            )?;
        }

        let password_hash = match &command.password {
            Patch::Set(password) => Patch::Set(
                self.hashing.hash(password.expose()).await.map_err(|e| {
                    tracing::error!(error = %e, "Password hashing failed");
                    AuthError::Internal(e.to_string())
                })?,
            ),
            Patch::Keep => Patch::Keep,
        };

        let patch = AccountPatch {
            username: command.username,
            email: command.email,
            full_name: command.full_name,
            password_hash,
            active: command.active,
            privileged: command.privileged,
        };

        let account = self.repository.update(id, patch).await?;

        tracing::info!(account_id = %account.id, actor = %actor.id, "Account updated");
        Ok(account)
    }

    /// Delete an account. Returns whether it existed.
    ///
    /// # Errors
    /// * `Forbidden` - Actor is not privileged
    /// * `Validation` - Actor tried to delete itself
    /// * `Internal` - Storage failure
    pub async fn delete_account(&self, actor: &Account, id: &AccountId) -> Result<bool, AuthError> {
        if !is_privileged(actor) {
            return Err(AuthError::Forbidden);
        }

        if actor.id == *id {
            return Err(ValidationError::SelfDeletion.into());
        }

        let deleted = self.repository.delete(id).await?;

        if deleted {
            tracing::info!(account_id = %id, actor = %actor.id, "Account deleted");
        }
        Ok(deleted)
    }

    fn ensure_unclaimed(
        &self,
        field: &'static str,
        value: &str,
        holder: Option<Account>,
        id: &AccountId,
    ) -> Result<(), AuthError> {
        match holder {
            Some(holder) if holder.id != *id => Err(RepositoryError::Conflict {
                field,
                value: value.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }
}
