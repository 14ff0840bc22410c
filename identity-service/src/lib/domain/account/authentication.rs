use std::sync::Arc;

use auth::AuthenticationError;
use auth::Authenticator;
use auth::IssuedToken;
use auth::PasswordError;

use crate::domain::account::errors::AuthError;
use crate::domain::account::models::Account;
use crate::domain::account::models::NewAccount;
use crate::domain::account::models::RegisterAccount;
use crate::domain::account::ports::AccountRepository;
use crate::domain::repository::RepositoryError;

/// Turns credentials into session tokens and registers new accounts.
pub struct AuthenticationService<R>
where
    R: AccountRepository,
{
    repository: Arc<R>,
    authenticator: Authenticator,
}

impl<R> AuthenticationService<R>
where
    R: AccountRepository,
{
    /// Create a new authentication service with injected dependencies.
    ///
    /// # Arguments
    /// * `repository` - Account persistence implementation
    /// * `authenticator` - Password verification and token issuance
    pub fn new(repository: Arc<R>, authenticator: Authenticator) -> Self {
        Self {
            repository,
            authenticator,
        }
    }

    /// Exchange a username or email plus password for a token.
    ///
    /// Unknown identifiers and inactive accounts cost the same hashing work as
    /// a wrong password.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Unknown identifier or wrong password
    /// * `InactiveAccount` - The account is deactivated
    /// * `Internal` - Corrupt stored digest, hashing or storage failure
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<IssuedToken, AuthError> {
        let account = self
            .repository
            .find_by_identifier(identifier)
            .await
            .map_err(storage_failure)?;

        let Some(account) = account else {
            self.authenticator.equalize_timing(password).await;
            tracing::warn!(identifier = %identifier, "Authentication failed: unknown identifier");
            return Err(AuthError::InvalidCredentials);
        };

        if !account.active {
            // Same hashing cost as the other failure paths.
            self.authenticator.equalize_timing(password).await;
            tracing::warn!(account_id = %account.id, "Authentication failed: inactive account");
            return Err(AuthError::InactiveAccount);
        }

        let issued = self
            .authenticator
            .authenticate(password, &account.password_hash, &account.id.to_string())
            .await
            .map_err(|e| match e {
                AuthenticationError::InvalidCredentials => {
                    tracing::warn!(account_id = %account.id, "Authentication failed: wrong password");
                    AuthError::InvalidCredentials
                }
                AuthenticationError::PasswordError(PasswordError::CorruptDigest(detail)) => {
                    tracing::error!(
                        account_id = %account.id,
                        error = %detail,
                        "Stored password digest is corrupt"
                    );
                    AuthError::Internal(detail)
                }
                other => {
                    tracing::error!(account_id = %account.id, error = %other, "Authentication error");
                    AuthError::Internal(other.to_string())
                }
            })?;

        tracing::info!(account_id = %account.id, "Account authenticated");
        Ok(issued)
    }

    /// Register a regular account.
    ///
    /// # Errors
    /// * `Conflict` - Username or email already exists
    /// * `Internal` - Hashing or storage failure
    pub async fn register(&self, command: RegisterAccount) -> Result<Account, AuthError> {
        self.create_account(command, false).await
    }

    /// Register an account with the privileged flag set.
    ///
    /// # Errors
    /// * `Conflict` - Username or email already exists
    /// * `Internal` - Hashing or storage failure
    pub async fn register_privileged(&self, command: RegisterAccount) -> Result<Account, AuthError> {
        self.create_account(command, true).await
    }

    async fn create_account(
        &self,
        command: RegisterAccount,
        privileged: bool,
    ) -> Result<Account, AuthError> {
        // The repository enforces uniqueness again atomically; this only
        // saves the hashing work for the common case.
        if self
            .repository
            .find_by_username(command.username.as_str())
            .await
            .map_err(storage_failure)?
            .is_some()
        {
            return Err(RepositoryError::Conflict {
                field: Account::USERNAME_KEY,
                value: command.username.to_string(),
            }
            .into());
        }

        if self
            .repository
            .find_by_email(command.email.as_str())
            .await
            .map_err(storage_failure)?
            .is_some()
        {
            return Err(RepositoryError::Conflict {
                field: Account::EMAIL_KEY,
                value: command.email.to_string(),
            }
            .into());
        }

        let password_hash = self
            .authenticator
            .hash_password(command.password.expose())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Password hashing failed");
                AuthError::Internal(e.to_string())
            })?;

        let account = self
            .repository
            .create(NewAccount {
                username: command.username,
                email: command.email,
                full_name: command.full_name,
                password_hash,
                privileged,
            })
            .await?;

        tracing::info!(
            account_id = %account.id,
            username = %account.username,
            privileged = account.privileged,
            "Account registered"
        );

        Ok(account)
    }
}

fn storage_failure(err: RepositoryError) -> AuthError {
    tracing::error!(error = %err, "Account lookup failed");
    AuthError::Internal(err.to_string())
}
