use std::sync::Arc;

use chrono::Duration;

use crate::jwt::Claims;
use crate::jwt::IssuedToken;
use crate::jwt::TokenCodec;
use crate::jwt::TokenError;
use crate::password::HashingPool;
use crate::password::PasswordError;

/// Authentication coordinator combining password verification and token issuance.
///
/// Password work goes through the bounded [`HashingPool`]; tokens come from a
/// shared [`TokenCodec`] so that rotation is visible to every holder.
#[derive(Clone)]
pub struct Authenticator {
    hashing: HashingPool,
    codec: Arc<TokenCodec>,
    token_ttl: Duration,
}

/// Authentication operation errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Password error: {0}")]
    PasswordError(#[from] PasswordError),

    #[error("Token error: {0}")]
    TokenError(#[from] TokenError),
}

impl Authenticator {
    /// Create a new authenticator.
    ///
    /// # Arguments
    /// * `hashing` - Pool that runs password hashing and verification
    /// * `codec` - Token codec, shared with whoever validates tokens
    /// * `token_ttl` - Lifetime of issued tokens
    pub fn new(hashing: HashingPool, codec: Arc<TokenCodec>, token_ttl: Duration) -> Self {
        Self {
            hashing,
            codec,
            token_ttl,
        }
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Hash a password for storage.
    ///
    /// # Errors
    /// * `PasswordError` - Hashing failed or timed out
    pub async fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        self.hashing.hash(password).await
    }

    /// Check a password against a stored digest.
    ///
    /// # Errors
    /// * `PasswordError` - Digest is corrupt or verification timed out
    pub async fn verify_password(
        &self,
        password: &str,
        stored_hash: &str,
    ) -> Result<bool, PasswordError> {
        self.hashing.verify(password, stored_hash).await
    }

    /// Verify credentials and issue a token for `subject`.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Password does not match
    /// * `PasswordError` - Verification failed
    /// * `TokenError` - Token issuance failed
    pub async fn authenticate(
        &self,
        password: &str,
        stored_hash: &str,
        subject: &str,
    ) -> Result<IssuedToken, AuthenticationError> {
        let is_valid = self.verify_password(password, stored_hash).await?;

        if !is_valid {
            return Err(AuthenticationError::InvalidCredentials);
        }

        Ok(self.issue_token(subject)?)
    }

    /// Spend roughly the time of a verification without checking anything.
    ///
    /// Used on the unknown-identifier and inactive-account paths so that they
    /// cannot be told apart from a wrong password by timing. A failing pool
    /// is logged, never surfaced.
    pub async fn equalize_timing(&self, password: &str) {
        if let Err(e) = self.hashing.hash(password).await {
            tracing::warn!(error = %e, "Timing-equalization hash failed");
        }
    }

    /// Issue a token without password verification.
    ///
    /// # Errors
    /// * `TokenError` - Token issuance failed
    pub fn issue_token(&self, subject: &str) -> Result<IssuedToken, TokenError> {
        self.codec.issue(subject, self.token_ttl)
    }

    /// Validate a token and return its claims.
    ///
    /// # Errors
    /// * `TokenError` - Token is malformed, forged or expired
    pub fn validate_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.codec.validate(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::PasswordHasher;

    const SECRET: &[u8] = b"test_secret_key_at_least_32_bytes!";

    fn authenticator() -> Authenticator {
        let hasher = PasswordHasher::with_cost(1, 1024).unwrap();
        let hashing = HashingPool::new(hasher, 2, std::time::Duration::from_secs(10));
        let codec = Arc::new(TokenCodec::with_secret(SECRET).unwrap());

        Authenticator::new(hashing, codec, Duration::minutes(30))
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let authenticator = authenticator();

        let password = "my_password";
        let hash = authenticator
            .hash_password(password)
            .await
            .expect("Failed to hash password");

        let issued = authenticator
            .authenticate(password, &hash, "user123")
            .await
            .expect("Authentication failed");

        assert!(!issued.access_token.is_empty());
        assert_eq!(issued.claims.exp - issued.claims.iat, 30 * 60);

        let decoded = authenticator
            .validate_token(&issued.access_token)
            .expect("Token validation failed");
        assert_eq!(decoded.sub, "user123");
    }

    #[tokio::test]
    async fn test_authenticate_invalid_password() {
        let authenticator = authenticator();

        let hash = authenticator.hash_password("my_password").await.unwrap();

        let result = authenticator
            .authenticate("wrong_password", &hash, "user123")
            .await;
        assert!(matches!(
            result,
            Err(AuthenticationError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_authenticate_corrupt_digest() {
        let authenticator = authenticator();

        let result = authenticator
            .authenticate("my_password", "not-a-digest", "user123")
            .await;
        assert!(matches!(
            result,
            Err(AuthenticationError::PasswordError(PasswordError::CorruptDigest(_)))
        ));
    }

    #[tokio::test]
    async fn test_equalize_timing_returns() {
        let authenticator = authenticator();
        authenticator.equalize_timing("whatever").await;
    }

    #[tokio::test]
    async fn test_equalize_timing_survives_pool_failure() {
        let hasher = PasswordHasher::with_cost(1, 1024).unwrap();
        let hashing = HashingPool::new(hasher, 1, std::time::Duration::ZERO);
        let codec = Arc::new(TokenCodec::with_secret(SECRET).unwrap());
        let authenticator = Authenticator::new(hashing, codec, Duration::minutes(30));

        assert!(authenticator.hash_password("whatever").await.is_err());
        authenticator.equalize_timing("whatever").await;
    }

    #[test]
    fn test_validate_invalid_token() {
        let authenticator = authenticator();

        let result = authenticator.validate_token("invalid.token.here");
        assert!(matches!(result, Err(TokenError::Malformed(_))));
    }
}
