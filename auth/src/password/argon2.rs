use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::Error as PasswordHashError;
use argon2::password_hash::PasswordHash;
use argon2::password_hash::PasswordHasher as Argon2PasswordHasher;
use argon2::password_hash::PasswordVerifier;
use argon2::password_hash::SaltString;
use argon2::Algorithm;
use argon2::Argon2;
use argon2::Params;
use argon2::Version;

use super::errors::PasswordError;

/// Password hashing implementation.
///
/// Argon2id with a random salt per hash. The cost factor is the number of
/// Argon2 passes over memory; the memory size is tunable separately.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub const MIN_COST: u32 = 1;
    pub const MAX_COST: u32 = 10;
    pub const DEFAULT_COST: u32 = Params::DEFAULT_T_COST;

    pub const MIN_MEMORY_KIB: u32 = 1024;
    pub const MAX_MEMORY_KIB: u32 = 1024 * 1024;
    pub const DEFAULT_MEMORY_KIB: u32 = Params::DEFAULT_M_COST;

    /// Create a new password hasher with secure defaults.
    pub fn new() -> Self {
        Self {
            params: Params::default(),
        }
    }

    /// Create a hasher with an explicit cost factor and memory size.
    ///
    /// # Arguments
    /// * `cost` - Argon2 iterations, within `MIN_COST..=MAX_COST`
    /// * `memory_kib` - Argon2 memory in KiB, within `MIN_MEMORY_KIB..=MAX_MEMORY_KIB`
    ///
    /// # Errors
    /// * `InvalidCost` - A parameter is out of range
    pub fn with_cost(cost: u32, memory_kib: u32) -> Result<Self, PasswordError> {
        if !(Self::MIN_COST..=Self::MAX_COST).contains(&cost) {
            return Err(PasswordError::InvalidCost(format!(
                "cost must be between {} and {}, got {}",
                Self::MIN_COST,
                Self::MAX_COST,
                cost
            )));
        }

        if !(Self::MIN_MEMORY_KIB..=Self::MAX_MEMORY_KIB).contains(&memory_kib) {
            return Err(PasswordError::InvalidCost(format!(
                "memory must be between {} and {} KiB, got {}",
                Self::MIN_MEMORY_KIB,
                Self::MAX_MEMORY_KIB,
                memory_kib
            )));
        }

        let params = Params::new(memory_kib, cost, Params::DEFAULT_P_COST, None)
            .map_err(|e| PasswordError::InvalidCost(e.to_string()))?;

        Ok(Self { params })
    }

    /// Argon2 iterations used for new hashes.
    pub fn cost(&self) -> u32 {
        self.params.t_cost()
    }

    /// Hash a plaintext password.
    ///
    /// # Returns
    /// PHC string format hash (includes algorithm, parameters, salt, and hash)
    ///
    /// # Errors
    /// * `HashingFailed` - Password hashing operation failed
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }

    /// Verify a password against a stored hash.
    ///
    /// The salt and parameters are taken from the digest, so hashes made
    /// with an older cost keep verifying. The output comparison is
    /// constant-time.
    ///
    /// # Returns
    /// True if password matches, false otherwise
    ///
    /// # Errors
    /// * `CorruptDigest` - Hash is not a parseable, supported PHC string
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| PasswordError::CorruptDigest(e.to_string()))?;

        match self.argon2().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(PasswordHashError::Password) => Ok(false),
            Err(e) => Err(PasswordError::CorruptDigest(e.to_string())),
        }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}
