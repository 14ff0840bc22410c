//! Authentication primitives
//!
//! Reusable building blocks for account services:
//! - Password hashing (Argon2id) with a bounded worker pool
//! - Signed, time-bounded session tokens with key rotation
//! - Token revocation
//! - Authentication coordination
//!
//! Services define their own domain ports and adapt these implementations.
//!
//! # Examples
//!
//! ## Password Hashing
//! ```
//! use auth::PasswordHasher;
//!
//! let hasher = PasswordHasher::with_cost(1, 1024).unwrap();
//! let hash = hasher.hash("my_password").unwrap();
//! let is_valid = hasher.verify("my_password", &hash).unwrap();
//! assert!(is_valid);
//! ```
//!
//! ## Session Tokens
//! ```
//! use auth::TokenCodec;
//! use chrono::Duration;
//!
//! let codec = TokenCodec::with_secret(b"secret_key_at_least_32_bytes_long!").unwrap();
//! let issued = codec.issue("user123", Duration::minutes(30)).unwrap();
//! let claims = codec.validate(&issued.access_token).unwrap();
//! assert_eq!(claims.sub, "user123");
//! ```

pub mod authenticator;
pub mod clock;
pub mod jwt;
pub mod password;

// Re-export commonly used items
pub use authenticator::AuthenticationError;
pub use authenticator::Authenticator;
pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use jwt::Claims;
pub use jwt::Denylist;
pub use jwt::IssuedToken;
pub use jwt::TokenCodec;
pub use jwt::TokenError;
pub use password::HashingPool;
pub use password::PasswordError;
pub use password::PasswordHasher;
