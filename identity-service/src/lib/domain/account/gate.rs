use std::sync::Arc;

use auth::Claims;
use auth::Denylist;
use auth::TokenCodec;

use crate::domain::account::capability::Capability;
use crate::domain::account::errors::AuthError;
use crate::domain::account::models::Account;
use crate::domain::account::models::AccountId;
use crate::domain::account::ports::AccountRepository;

const BEARER_SCHEME: &str = "Bearer";

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// The scheme is case-insensitive; anything but a single non-empty token
/// after it is rejected.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim_start();

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME)
        || token.is_empty()
        || token.contains(char::is_whitespace)
    {
        return None;
    }

    Some(token)
}

/// Resolves a bearer token to an active account and enforces a capability.
///
/// The account is re-read on every call, so deactivation and privilege
/// changes take effect immediately, even for tokens already issued.
pub struct PermissionGate<R>
where
    R: AccountRepository,
{
    repository: Arc<R>,
    codec: Arc<TokenCodec>,
    denylist: Option<Arc<Denylist>>,
}

impl<R> PermissionGate<R>
where
    R: AccountRepository,
{
    pub fn new(repository: Arc<R>, codec: Arc<TokenCodec>) -> Self {
        Self {
            repository,
            codec,
            denylist: None,
        }
    }

    /// Also reject tokens recorded in `denylist`.
    pub fn with_denylist(mut self, denylist: Arc<Denylist>) -> Self {
        self.denylist = Some(denylist);
        self
    }

    /// Authorize `token` for `capability`.
    ///
    /// # Errors
    /// * `Unauthorized` - Token invalid, revoked, or its account missing or inactive
    /// * `Forbidden` - The account lacks the capability
    /// * `Internal` - Repository failure
    pub async fn authorize(
        &self,
        token: &str,
        capability: &Capability,
    ) -> Result<Account, AuthError> {
        self.authorize_with(token, capability.name(), |actor| capability.permits(actor))
            .await
    }

    /// Authorize `token` against an arbitrary predicate.
    ///
    /// `name` only appears in logs.
    pub async fn authorize_with<F>(
        &self,
        token: &str,
        name: &str,
        predicate: F,
    ) -> Result<Account, AuthError>
    where
        F: Fn(&Account) -> bool + Send + Sync,
    {
        let actor = self.resolve(token).await?;

        if !predicate(&actor) {
            tracing::warn!(account_id = %actor.id, capability = name, "Capability denied");
            return Err(AuthError::Forbidden);
        }

        Ok(actor)
    }

    /// Authorize the raw value of an `Authorization` header.
    ///
    /// # Errors
    /// * `Unauthorized` - Header missing or not a bearer token, plus everything
    ///   [`authorize`](Self::authorize) returns
    pub async fn authorize_header(
        &self,
        header: Option<&str>,
        capability: &Capability,
    ) -> Result<Account, AuthError> {
        let token = header.and_then(bearer_token).ok_or_else(|| {
            tracing::warn!("Missing or malformed authorization header");
            AuthError::Unauthorized
        })?;

        self.authorize(token, capability).await
    }

    /// The active account behind `token`.
    pub async fn current_account(&self, token: &str) -> Result<Account, AuthError> {
        self.authorize(token, &Capability::Authenticated).await
    }

    /// Revoke `token` until it expires (logout).
    ///
    /// Returns `false` when no denylist is attached and nothing was recorded.
    ///
    /// # Errors
    /// * `Unauthorized` - Token is not valid in the first place
    pub fn revoke(&self, token: &str) -> Result<bool, AuthError> {
        let claims = self.validate(token)?;

        let Some(denylist) = &self.denylist else {
            tracing::warn!(subject = %claims.sub, "Revocation requested without a denylist");
            return Ok(false);
        };

        denylist.revoke(&claims);
        tracing::info!(subject = %claims.sub, "Token revoked");
        Ok(true)
    }

    fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        self.codec.validate(token).map_err(|e| {
            tracing::warn!(error = %e, "Token rejected");
            AuthError::Unauthorized
        })
    }

    async fn resolve(&self, token: &str) -> Result<Account, AuthError> {
        let claims = self.validate(token)?;

        if let Some(denylist) = &self.denylist {
            if denylist.is_revoked(&claims.jti) {
                tracing::warn!(subject = %claims.sub, "Revoked token presented");
                return Err(AuthError::Unauthorized);
            }
        }

        let account_id = AccountId::from_string(&claims.sub).map_err(|e| {
            tracing::warn!(error = %e, "Token subject is not an account ID");
            AuthError::Unauthorized
        })?;

        let account = self
            .repository
            .get(&account_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Account lookup failed");
                AuthError::Internal(e.to_string())
            })?
            .ok_or_else(|| {
                tracing::warn!(account_id = %account_id, "Token subject no longer exists");
                AuthError::Unauthorized
            })?;

        if !account.active {
            tracing::warn!(account_id = %account_id, "Token subject is inactive");
            return Err(AuthError::Unauthorized);
        }

        Ok(account)
    }
}
